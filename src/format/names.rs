//! Regex-based name validators.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

/// Pattern for rule group names.
pub const GROUP_NAME_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9_.\-]*$";

/// Pattern for recording rule metric names.
pub const METRIC_NAME_PATTERN: &str = r"^[a-zA-Z_:][a-zA-Z0-9_:]*$";

/// Pattern for alert names.
pub const ALERT_NAME_PATTERN: &str = r"^[a-zA-Z_][a-zA-Z0-9_]*$";

/// Pattern for label and annotation keys.
pub const LABEL_NAME_PATTERN: &str = r"^[a-zA-Z_][a-zA-Z0-9_]*$";

static GROUP_NAME: LazyLock<Regex> = LazyLock::new(|| compile(GROUP_NAME_PATTERN));
static METRIC_NAME: LazyLock<Regex> = LazyLock::new(|| compile(METRIC_NAME_PATTERN));
static ALERT_NAME: LazyLock<Regex> = LazyLock::new(|| compile(ALERT_NAME_PATTERN));
static LABEL_NAME: LazyLock<Regex> = LazyLock::new(|| compile(LABEL_NAME_PATTERN));

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    // Patterns are compile-time constants covered by the tests below.
    Regex::new(pattern).expect("static name pattern must compile")
}

fn check(re: &Regex, pattern: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::PatternMismatch {
            field: field.to_string(),
            value: value.to_string(),
            pattern: pattern.to_string(),
        })
    }
}

/// Validates a rule group name.
///
/// # Errors
///
/// Returns an error naming the field, the value and the regex on mismatch.
pub fn validate_group_name(field: &str, value: &str) -> Result<(), ConfigError> {
    check(&GROUP_NAME, GROUP_NAME_PATTERN, field, value)
}

/// Validates a recording rule metric name.
///
/// # Errors
///
/// Returns an error naming the field, the value and the regex on mismatch.
pub fn validate_metric_name(field: &str, value: &str) -> Result<(), ConfigError> {
    check(&METRIC_NAME, METRIC_NAME_PATTERN, field, value)
}

/// Validates an alert name.
///
/// # Errors
///
/// Returns an error naming the field, the value and the regex on mismatch.
pub fn validate_alert_name(field: &str, value: &str) -> Result<(), ConfigError> {
    check(&ALERT_NAME, ALERT_NAME_PATTERN, field, value)
}

/// Validates every key of a label or annotation map.
///
/// # Errors
///
/// Returns an error for the first key that does not match.
pub fn validate_label_names<'a>(
    field: &str,
    keys: impl IntoIterator<Item = &'a String>,
) -> Result<(), ConfigError> {
    for key in keys {
        check(&LABEL_NAME, LABEL_NAME_PATTERN, field, key)?;
    }
    Ok(())
}

/// Validates a rule namespace.
///
/// Namespaces are free-form but end up as a URL path segment.
///
/// # Errors
///
/// Returns an error if the namespace is empty or contains a slash.
pub fn validate_namespace(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::validation("namespace cannot be empty", field));
    }
    if value.contains('/') {
        return Err(ConfigError::validation(
            format!("namespace '{value}' cannot contain '/'"),
            field,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_names_accepted() {
        for name in ["cpu", "HighCPU", "a-b_c.d", "x1", "Z"] {
            assert!(validate_group_name("name", name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_group_names_rejected() {
        for name in ["", "1abc", "has space", "mail@host", "-lead", "_lead", "a/b"] {
            assert!(validate_group_name("name", name).is_err(), "{name}");
        }
    }

    #[test]
    fn test_mismatch_message_names_field_value_and_regex() {
        let err = validate_group_name("rule_group.name", "9lives").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("rule_group.name"));
        assert!(text.contains("9lives"));
        assert!(text.contains(GROUP_NAME_PATTERN));
    }

    #[test]
    fn test_metric_names() {
        assert!(validate_metric_name("record", "instance:cpu:rate5m").is_ok());
        assert!(validate_metric_name("record", "_private").is_ok());
        assert!(validate_metric_name("record", "5xx_rate").is_err());
        assert!(validate_metric_name("record", "job-rate").is_err());
    }

    #[test]
    fn test_alert_and_label_names() {
        assert!(validate_alert_name("alert", "HighCPUUsage").is_ok());
        assert!(validate_alert_name("alert", "High CPU").is_err());

        let keys = [String::from("severity"), String::from("team")];
        assert!(validate_label_names("labels", keys.iter()).is_ok());
        let bad = [String::from("bad-key")];
        assert!(validate_label_names("labels", bad.iter()).is_err());
    }

    #[test]
    fn test_namespace() {
        assert!(validate_namespace("namespace", "infra").is_ok());
        assert!(validate_namespace("namespace", "").is_err());
        assert!(validate_namespace("namespace", "a/b").is_err());
    }
}
