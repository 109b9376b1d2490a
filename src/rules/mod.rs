//! Rule group model and multi-group document handling.
//!
//! This module handles everything about rule groups that does not touch
//! the network:
//! - The wire types exchanged with the Mimir ruler
//! - Parsing and validating a document of many groups
//! - Selecting, diffing and summarising the managed subset

mod document;
mod types;

pub use document::{
    GroupDiff, GroupFilter, GroupSummary, RulesSummary, diff_managed, parse_rule_groups,
    select_managed, summarize, validate_rule_group, validate_rule_groups,
};
pub use types::{
    AlertingRule, GroupRule, RecordingRule, Rule, RuleGroup, RuleGroups, RuleKind, RuleShapeError,
};
