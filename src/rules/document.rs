//! Multi-group rule documents.
//!
//! A document is decomposed into the ruler's native unit, one group per
//! request. Convergence is set reconciliation over group names, so this
//! module supplies the pieces the bulk controller composes: parse,
//! validate, filter, diff and summarise.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::types::{Rule, RuleGroup, RuleGroups, RuleKind};
use crate::config::hash::ConfigHasher;
use crate::error::{ConfigError, MimirError, Result};
use crate::format::{
    validate_alert_name, validate_duration, validate_group_name, validate_label_names,
    validate_metric_name, validate_promql_expr,
};

/// Parses a YAML document of rule groups.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or a rule has an invalid shape.
pub fn parse_rule_groups(content: &str) -> Result<RuleGroups> {
    serde_yaml::from_str(content).map_err(|e| MimirError::yaml("rule groups document", &e))
}

/// Validates a whole document.
///
/// Checks that there is at least one group, that group names are unique
/// and well formed, and that every rule is valid.
///
/// # Errors
///
/// Returns the first validation failure found.
pub fn validate_rule_groups(doc: &RuleGroups) -> std::result::Result<(), ConfigError> {
    if doc.groups.is_empty() {
        return Err(ConfigError::validation(
            "document must contain at least one rule group",
            "groups",
        ));
    }

    let mut seen = HashSet::new();
    for group in &doc.groups {
        if !seen.insert(group.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                resource_type: String::from("rule group"),
                name: group.name.clone(),
            });
        }
        validate_rule_group(group)?;
    }
    Ok(())
}

/// Validates a single group and its rules.
///
/// # Errors
///
/// Returns the first validation failure found.
pub fn validate_rule_group(group: &RuleGroup) -> std::result::Result<(), ConfigError> {
    let prefix = format!("groups.{}", group.name);
    validate_group_name(&format!("{prefix}.name"), &group.name)?;

    if let Some(interval) = &group.interval {
        validate_duration(&format!("{prefix}.interval"), interval)?;
    }
    if let Some(offset) = &group.query_offset {
        validate_duration(&format!("{prefix}.query_offset"), offset)?;
    }
    if group.rules.is_empty() {
        return Err(ConfigError::validation(
            "rule group must contain at least one rule",
            format!("{prefix}.rules"),
        ));
    }

    for (i, rule) in group.rules.iter().enumerate() {
        let field = format!("{prefix}.rules[{i}]");
        match rule {
            Rule::Alerting(a) => {
                validate_alert_name(&format!("{field}.alert"), &a.alert)?;
                if let Some(d) = &a.for_duration {
                    validate_duration(&format!("{field}.for"), d)?;
                }
                if let Some(d) = &a.keep_firing_for {
                    validate_duration(&format!("{field}.keep_firing_for"), d)?;
                }
                validate_label_names(&format!("{field}.labels"), a.labels.keys())?;
            }
            Rule::Recording(r) => {
                validate_metric_name(&format!("{field}.record"), &r.record)?;
                validate_label_names(&format!("{field}.labels"), r.labels.keys())?;
            }
        }
        validate_promql_expr(&format!("{field}.expr"), rule.expr())?;
    }
    Ok(())
}

/// Which groups of a document a resource manages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GroupFilter {
    /// Every group in the document.
    #[default]
    All,
    /// Only the named groups that are present.
    Only(BTreeSet<String>),
    /// Every present group except the named ones.
    Ignore(BTreeSet<String>),
}

impl GroupFilter {
    /// Builds a filter from the two optional lists.
    ///
    /// # Errors
    ///
    /// Returns an error if both lists are non-empty.
    pub fn from_lists(only: &[String], ignore: &[String]) -> std::result::Result<Self, ConfigError> {
        match (only.is_empty(), ignore.is_empty()) {
            (false, false) => Err(ConfigError::MutuallyExclusive {
                first: String::from("only_groups"),
                second: String::from("ignore_groups"),
            }),
            (false, true) => Ok(Self::Only(only.iter().cloned().collect())),
            (true, false) => Ok(Self::Ignore(ignore.iter().cloned().collect())),
            (true, true) => Ok(Self::All),
        }
    }

    /// Returns true if the named group is managed under this filter.
    #[must_use]
    pub fn manages(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(name),
            Self::Ignore(names) => !names.contains(name),
        }
    }
}

/// Returns the managed groups in document order.
#[must_use]
pub fn select_managed<'a>(doc: &'a RuleGroups, filter: &GroupFilter) -> Vec<&'a RuleGroup> {
    doc.groups.iter().filter(|g| filter.manages(&g.name)).collect()
}

/// Groups to remove and groups to upsert when moving between managed sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiff {
    /// Previously managed groups no longer managed.
    pub to_delete: Vec<String>,
    /// Every group in the new managed set.
    pub to_upsert: Vec<String>,
}

/// Diffs the previously recorded managed set against the new one.
///
/// Every new group is upserted since the ruler treats POST as
/// create-or-replace.
#[must_use]
pub fn diff_managed(previous: &[String], desired: &[String]) -> GroupDiff {
    let keep: HashSet<&str> = desired.iter().map(String::as_str).collect();
    GroupDiff {
        to_delete: previous
            .iter()
            .filter(|name| !keep.contains(name.as_str()))
            .cloned()
            .collect(),
        to_upsert: desired.to_vec(),
    }
}

/// Rule counts for one managed group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Group name.
    pub name: String,
    /// Number of alerting rules.
    pub alerting_rules: usize,
    /// Number of recording rules.
    pub recording_rules: usize,
}

/// Computed fields describing a managed set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesSummary {
    /// Managed group names in document order.
    pub managed_groups: Vec<String>,
    /// Number of managed groups.
    pub groups_count: usize,
    /// Number of rules across managed groups.
    pub total_rules: usize,
    /// Alert or record name of every rule, in document order.
    pub rule_names: Vec<String>,
    /// Per-group rule counts.
    pub groups: Vec<GroupSummary>,
    /// SHA-256 of the YAML-serialized managed subset.
    pub content_hash: String,
}

#[derive(Serialize)]
struct ManagedDocument<'a> {
    groups: &'a [&'a RuleGroup],
}

/// Computes the summary of a managed set.
///
/// The hash covers the same YAML a `RuleGroups` holding only the managed
/// groups would serialize to.
///
/// # Errors
///
/// Returns an error if the groups cannot be serialized.
pub fn summarize(managed: &[&RuleGroup]) -> Result<RulesSummary> {
    let content_hash = ConfigHasher::new().hash_yaml(&ManagedDocument { groups: managed })?;

    Ok(RulesSummary {
        managed_groups: managed.iter().map(|g| g.name.clone()).collect(),
        groups_count: managed.len(),
        total_rules: managed.iter().map(|g| g.rules.len()).sum(),
        rule_names: managed
            .iter()
            .flat_map(|g| g.rules.iter().map(|r| r.name().to_string()))
            .collect(),
        groups: managed
            .iter()
            .map(|g| GroupSummary {
                name: g.name.clone(),
                alerting_rules: g.count(RuleKind::Alerting),
                recording_rules: g.count(RuleKind::Recording),
            })
            .collect(),
        content_hash,
    })
}
