//! Prometheus-style durations.
//!
//! Accepts `y`, `w`, `d`, `h`, `m`, `s` and `ms` units in descending order,
//! each at most once (`1w2d`, `90s`, `1h30m`). A year is 365 days.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: u64 = 7 * MS_PER_DAY;
const MS_PER_YEAR: u64 = 365 * MS_PER_DAY;

/// Units in the order they are written, with their size in milliseconds.
const UNITS: [(&str, u64); 7] = [
    ("y", MS_PER_YEAR),
    ("w", MS_PER_WEEK),
    ("d", MS_PER_DAY),
    ("h", MS_PER_HOUR),
    ("m", MS_PER_MINUTE),
    ("s", MS_PER_SECOND),
    ("ms", 1),
];

#[allow(clippy::expect_used)]
static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(\d+)y)?(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?(?:(\d+)ms)?$",
    )
    .expect("duration pattern must compile")
});

/// A duration with millisecond precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromDuration(u64);

/// Error returned when a duration string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDurationError(String);

impl fmt::Display for ParseDurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a valid duration string: {:?}", self.0)
    }
}

impl std::error::Error for ParseDurationError {}

impl PromDuration {
    /// Creates a duration from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Converts into a standard library duration.
    #[must_use]
    pub const fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }
}

impl FromStr for PromDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "0" {
            return Ok(Self(0));
        }
        if s.is_empty() {
            return Err(ParseDurationError(s.to_string()));
        }
        let caps = DURATION
            .captures(s)
            .ok_or_else(|| ParseDurationError(s.to_string()))?;

        let mut total: u64 = 0;
        for (i, (_, unit_ms)) in UNITS.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                let n: u64 = m
                    .as_str()
                    .parse()
                    .map_err(|_| ParseDurationError(s.to_string()))?;
                let part = n
                    .checked_mul(*unit_ms)
                    .ok_or_else(|| ParseDurationError(s.to_string()))?;
                total = total
                    .checked_add(part)
                    .ok_or_else(|| ParseDurationError(s.to_string()))?;
            }
        }
        Ok(Self(total))
    }
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0s");
        }
        let mut rest = self.0;
        for (unit, unit_ms) in UNITS {
            let n = rest / unit_ms;
            if n > 0 {
                write!(f, "{n}{unit}")?;
                rest -= n * unit_ms;
            }
        }
        Ok(())
    }
}

impl Serialize for PromDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PromDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Checks that a string is a valid duration.
///
/// # Errors
///
/// Returns a field error naming the offending value.
pub fn validate_duration(field: &str, value: &str) -> Result<(), ConfigError> {
    value
        .parse::<PromDuration>()
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidDuration {
            field: field.to_string(),
            value: value.to_string(),
        })
}

/// Re-serializes a duration to its canonical form (`60s` becomes `1m`).
///
/// # Errors
///
/// Returns a field error if the value does not parse.
pub fn format_duration(field: &str, value: &str) -> Result<String, ConfigError> {
    value
        .parse::<PromDuration>()
        .map(|d| d.to_string())
        .map_err(|_| ConfigError::InvalidDuration {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("5m".parse::<PromDuration>().unwrap().as_millis(), 300_000);
        assert_eq!("1h30m".parse::<PromDuration>().unwrap().as_millis(), 5_400_000);
        assert_eq!("2d".parse::<PromDuration>().unwrap().as_millis(), 2 * MS_PER_DAY);
        assert_eq!("1y".parse::<PromDuration>().unwrap().as_millis(), MS_PER_YEAR);
        assert_eq!("250ms".parse::<PromDuration>().unwrap().as_millis(), 250);
        assert_eq!("0".parse::<PromDuration>().unwrap().as_millis(), 0);
    }

    #[test]
    fn test_parse_rejects() {
        for bad in ["", "5", "m5", "1m1h", "5 m", "1.5h", "-1m", "5x"] {
            assert!(bad.parse::<PromDuration>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_canonical_format() {
        assert_eq!(format_duration("for", "60s").unwrap(), "1m");
        assert_eq!(format_duration("for", "90m").unwrap(), "1h30m");
        assert_eq!(format_duration("for", "14d").unwrap(), "2w");
        assert_eq!(format_duration("for", "0").unwrap(), "0s");
        assert_eq!(format_duration("for", "1500ms").unwrap(), "1s500ms");
    }

    #[test]
    fn test_format_is_idempotent() {
        for value in ["5m", "3600s", "1w2d", "400d", "0s", "1h0m", "61m"] {
            let once = format_duration("for", value).unwrap();
            let twice = format_duration("for", &once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_validate_names_field() {
        let err = validate_duration("rules[2].for", "soon").unwrap_err();
        assert!(err.to_string().contains("rules[2].for"));
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn test_serde_round_trip_uses_canonical_text() {
        let d: PromDuration = serde_yaml::from_str("120s").unwrap();
        assert_eq!(serde_yaml::to_string(&d).unwrap().trim(), "2m");
    }
}
