//! Rule group wire types.
//!
//! These structs map one-to-one onto the YAML the Mimir ruler accepts on
//! `POST /config/v1/rules/{namespace}` and returns from `GET`.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ConfigError, Result};
use crate::format::{FormatOptions, format_duration};

/// A document holding many rule groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleGroups {
    /// Groups in document order.
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

/// A named set of rules evaluated together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleGroup {
    /// Group name, unique within a namespace.
    pub name: String,
    /// Evaluation interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Evaluation delay applied to queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_offset: Option<String>,
    /// Tenants queried by a federated group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_tenants: Vec<String>,
    /// Maximum number of alerts or series a rule may produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Rules in evaluation order.
    pub rules: Vec<Rule>,
}

/// Kind of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Alerting rule.
    Alerting,
    /// Recording rule.
    Recording,
}

/// A rule: exactly one of alerting or recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub enum Rule {
    /// Fires alerts while `expr` holds.
    Alerting(AlertingRule),
    /// Stores the result of `expr` as a new series.
    Recording(RecordingRule),
}

/// An alerting rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertingRule {
    /// Alert name.
    pub alert: String,
    /// PromQL condition.
    pub expr: String,
    /// How long the condition must hold before firing.
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,
    /// How long the alert keeps firing after the condition clears.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_firing_for: Option<String>,
    /// Labels attached to the alert.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations attached to the alert.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A recording rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordingRule {
    /// Name of the recorded series.
    pub record: String,
    /// PromQL expression to record.
    pub expr: String,
    /// Labels added to the recorded series.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Why a rule on the wire is not a valid alerting or recording rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleShapeError {
    /// Both `alert` and `record` were set.
    #[error("rule sets both alert '{alert}' and record '{record}'")]
    BothAlertAndRecord {
        /// Alert name.
        alert: String,
        /// Record name.
        record: String,
    },
    /// Neither `alert` nor `record` was set.
    #[error("rule must set one of alert or record")]
    Neither,
    /// A recording rule carried an alerting-only field.
    #[error("recording rule '{record}' cannot set '{field}'")]
    AlertingFieldOnRecord {
        /// Record name.
        record: String,
        /// Offending field.
        field: &'static str,
    },
    /// `expr` was missing or blank.
    #[error("rule '{name}' has no expr")]
    MissingExpr {
        /// Alert or record name.
        name: String,
    },
}

/// Flat wire shape of a rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    record: Option<String>,
    #[serde(default)]
    expr: String,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    for_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keep_firing_for: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<String, String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<RawRule> for Rule {
    type Error = RuleShapeError;

    fn try_from(raw: RawRule) -> std::result::Result<Self, Self::Error> {
        let rule = match (non_empty(raw.alert), non_empty(raw.record)) {
            (Some(alert), Some(record)) => {
                return Err(RuleShapeError::BothAlertAndRecord { alert, record });
            }
            (None, None) => return Err(RuleShapeError::Neither),
            (Some(alert), None) => Self::Alerting(AlertingRule {
                alert,
                expr: raw.expr,
                for_duration: non_empty(raw.for_duration),
                keep_firing_for: non_empty(raw.keep_firing_for),
                labels: raw.labels,
                annotations: raw.annotations,
            }),
            (None, Some(record)) => {
                if non_empty(raw.for_duration).is_some() {
                    return Err(RuleShapeError::AlertingFieldOnRecord { record, field: "for" });
                }
                if non_empty(raw.keep_firing_for).is_some() {
                    return Err(RuleShapeError::AlertingFieldOnRecord {
                        record,
                        field: "keep_firing_for",
                    });
                }
                if !raw.annotations.is_empty() {
                    return Err(RuleShapeError::AlertingFieldOnRecord {
                        record,
                        field: "annotations",
                    });
                }
                Self::Recording(RecordingRule {
                    record,
                    expr: raw.expr,
                    labels: raw.labels,
                })
            }
        };

        if rule.expr().trim().is_empty() {
            return Err(RuleShapeError::MissingExpr {
                name: rule.name().to_string(),
            });
        }
        Ok(rule)
    }
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        match rule {
            Rule::Alerting(a) => Self {
                alert: Some(a.alert),
                expr: a.expr,
                for_duration: a.for_duration,
                keep_firing_for: a.keep_firing_for,
                labels: a.labels,
                annotations: a.annotations,
                ..Self::default()
            },
            Rule::Recording(r) => Self {
                record: Some(r.record),
                expr: r.expr,
                labels: r.labels,
                ..Self::default()
            },
        }
    }
}

impl Rule {
    /// Returns the alert name or the recorded series name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Alerting(a) => &a.alert,
            Self::Recording(r) => &r.record,
        }
    }

    /// Returns the PromQL expression.
    #[must_use]
    pub fn expr(&self) -> &str {
        match self {
            Self::Alerting(a) => &a.expr,
            Self::Recording(r) => &r.expr,
        }
    }

    /// Returns the rule kind.
    #[must_use]
    pub const fn kind(&self) -> RuleKind {
        match self {
            Self::Alerting(_) => RuleKind::Alerting,
            Self::Recording(_) => RuleKind::Recording,
        }
    }

    /// Returns a copy with the expression and durations in canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration or (when formatting) the expression is invalid.
    pub fn normalized(&self, options: FormatOptions, field: &str) -> Result<Self> {
        Ok(match self {
            Self::Alerting(a) => Self::Alerting(AlertingRule {
                expr: options.expr(&format!("{field}.expr"), &a.expr)?,
                for_duration: canonical(&format!("{field}.for"), a.for_duration.as_deref())?,
                keep_firing_for: canonical(
                    &format!("{field}.keep_firing_for"),
                    a.keep_firing_for.as_deref(),
                )?,
                ..a.clone()
            }),
            Self::Recording(r) => Self::Recording(RecordingRule {
                expr: options.expr(&format!("{field}.expr"), &r.expr)?,
                ..r.clone()
            }),
        })
    }
}

fn canonical(field: &str, value: Option<&str>) -> std::result::Result<Option<String>, ConfigError> {
    value.map(|v| format_duration(field, v)).transpose()
}

impl RuleGroup {
    /// Counts rules of the given kind.
    #[must_use]
    pub fn count(&self, kind: RuleKind) -> usize {
        self.rules.iter().filter(|r| r.kind() == kind).count()
    }

    /// Returns a copy with every rule and duration in canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if any duration or (when formatting) expression is invalid.
    pub fn normalized(&self, options: FormatOptions) -> Result<Self> {
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| rule.normalized(options, &format!("{}.rules[{i}]", self.name)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            interval: canonical(&format!("{}.interval", self.name), self.interval.as_deref())?,
            query_offset: canonical(
                &format!("{}.query_offset", self.name),
                self.query_offset.as_deref(),
            )?,
            rules,
            ..self.clone()
        })
    }

    /// Serializes the group as the YAML body the ruler expects.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| crate::error::MimirError::yaml(format!("rule group '{}'", self.name), &e))
    }
}

/// A rule type that can make up a single-kind rule group.
pub trait GroupRule:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The kind every rule of this type has.
    const KIND: RuleKind;

    /// Wraps into the tagged rule.
    fn into_rule(self) -> Rule;

    /// Unwraps from the tagged rule, or `None` if it is of the other kind.
    fn from_rule(rule: Rule) -> Option<Self>;
}

impl GroupRule for AlertingRule {
    const KIND: RuleKind = RuleKind::Alerting;

    fn into_rule(self) -> Rule {
        Rule::Alerting(self)
    }

    fn from_rule(rule: Rule) -> Option<Self> {
        match rule {
            Rule::Alerting(a) => Some(a),
            Rule::Recording(_) => None,
        }
    }
}

impl GroupRule for RecordingRule {
    const KIND: RuleKind = RuleKind::Recording;

    fn into_rule(self) -> Rule {
        Rule::Recording(self)
    }

    fn from_rule(rule: Rule) -> Option<Self> {
        match rule {
            Rule::Recording(r) => Some(r),
            Rule::Alerting(_) => None,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alerting => write!(f, "alerting"),
            Self::Recording => write!(f, "recording"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> std::result::Result<Rule, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn test_alerting_rule_parses() {
        let rule = parse("alert: HighCPU\nexpr: cpu > 80\nfor: 5m\nlabels:\n  severity: page\n")
            .unwrap();
        assert_eq!(rule.kind(), RuleKind::Alerting);
        assert_eq!(rule.name(), "HighCPU");
        let Rule::Alerting(a) = rule else { panic!("expected alerting rule") };
        assert_eq!(a.for_duration.as_deref(), Some("5m"));
        assert_eq!(a.labels.get("severity").map(String::as_str), Some("page"));
    }

    #[test]
    fn test_recording_rule_parses() {
        let rule = parse("record: instance:cpu:rate5m\nexpr: rate(cpu[5m])\n").unwrap();
        assert_eq!(rule.kind(), RuleKind::Recording);
        assert_eq!(rule.expr(), "rate(cpu[5m])");
    }

    #[test]
    fn test_both_alert_and_record_rejected() {
        let err = parse("alert: A\nrecord: b\nexpr: up\n").unwrap_err();
        assert!(err.to_string().contains("both alert"));
    }

    #[test]
    fn test_neither_rejected() {
        assert!(parse("expr: up\n").is_err());
        assert!(parse("alert: ''\nrecord: ''\nexpr: up\n").is_err());
    }

    #[test]
    fn test_record_with_for_rejected() {
        let err = parse("record: r\nexpr: up\nfor: 5m\n").unwrap_err();
        assert!(err.to_string().contains("cannot set 'for'"));
        assert!(parse("record: r\nexpr: up\nannotations:\n  a: b\n").is_err());
    }

    #[test]
    fn test_missing_expr_rejected() {
        assert!(parse("alert: A\n").is_err());
        assert!(parse("alert: A\nexpr: '  '\n").is_err());
    }

    #[test]
    fn test_serialization_keeps_wire_keys() {
        let rule = Rule::Alerting(AlertingRule {
            alert: String::from("A"),
            expr: String::from("up == 0"),
            for_duration: Some(String::from("1m")),
            keep_firing_for: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        });
        let yaml = serde_yaml::to_string(&rule).unwrap();
        assert!(yaml.contains("alert: A"));
        assert!(yaml.contains("for: 1m"));
        assert!(!yaml.contains("record"));
        assert!(!yaml.contains("labels"));
        assert_eq!(parse(&yaml).unwrap(), rule);
    }

    #[test]
    fn test_group_normalization() {
        let group: RuleGroup = serde_yaml::from_str(
            "name: g\ninterval: 60s\nrules:\n- alert: A\n  expr: up   ==   0\n  for: 300s\n",
        )
        .unwrap();
        let plain = group.normalized(FormatOptions::new(false)).unwrap();
        assert_eq!(plain.interval.as_deref(), Some("1m"));
        assert_eq!(plain.rules[0].expr(), "up   ==   0");

        let pretty = group.normalized(FormatOptions::new(true)).unwrap();
        assert_eq!(pretty.rules[0].expr(), "up == 0");
        let Rule::Alerting(a) = &pretty.rules[0] else { panic!("expected alerting rule") };
        assert_eq!(a.for_duration.as_deref(), Some("5m"));
    }

    #[test]
    fn test_group_rule_conversion() {
        let rule = parse("record: r\nexpr: up\n").unwrap();
        assert!(AlertingRule::from_rule(rule.clone()).is_none());
        let record = RecordingRule::from_rule(rule.clone()).unwrap();
        assert_eq!(record.into_rule(), rule);
    }
}
