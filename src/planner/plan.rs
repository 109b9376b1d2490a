//! Execution plan types and construction.
//!
//! Deletes run first so a resource moved between labels frees its remote
//! object before the new label claims it. A replace becomes a delete of
//! the recorded object followed by a create that depends on it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ResourceAddress;
use crate::resources::{DesiredResource, ResourceKind};

use super::diff::{DiffResult, DiffType};

/// An ordered plan.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
    /// Addresses that need no change.
    pub unchanged: Vec<String>,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource address.
    pub address: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Desired spec, for creates and updates.
    #[serde(skip)]
    pub resource: Option<DesiredResource>,
    /// Why this action is planned.
    pub reason: String,
    /// Spec hash to record on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_hash: Option<String>,
    /// Indices of actions that must succeed first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<usize>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Create the remote object and record it.
    Create,
    /// Converge the recorded object to its spec.
    Update,
    /// Delete the recorded object and forget it.
    Delete,
}

impl Plan {
    /// Builds a plan from a diff.
    #[must_use]
    pub fn from_diff(diff: &DiffResult, desired: &[(ResourceAddress, DesiredResource)]) -> Self {
        let mut actions = Vec::new();
        let lookup = |address: &str| {
            desired
                .iter()
                .find(|(a, _)| a.to_string() == address)
                .map(|(_, r)| r.clone())
        };

        for d in diff.diffs.iter().filter(|d| d.diff_type == DiffType::Delete) {
            actions.push(PlannedAction {
                action_type: ActionType::Delete,
                address: d.address.clone(),
                kind: d.kind,
                resource: None,
                reason: d.reason.clone(),
                new_hash: None,
                dependencies: vec![],
            });
        }

        for d in diff.diffs.iter().filter(|d| d.diff_type == DiffType::Replace) {
            let delete_idx = actions.len();
            actions.push(PlannedAction {
                action_type: ActionType::Delete,
                address: d.address.clone(),
                kind: d.kind,
                resource: None,
                reason: format!("replace: {}", d.reason),
                new_hash: None,
                dependencies: vec![],
            });
            actions.push(PlannedAction {
                action_type: ActionType::Create,
                address: d.address.clone(),
                kind: d.kind,
                resource: lookup(&d.address),
                reason: format!("replace: {}", d.reason),
                new_hash: d.new_hash.clone(),
                dependencies: vec![delete_idx],
            });
        }

        for d in diff.diffs.iter().filter(|d| d.diff_type == DiffType::Create) {
            actions.push(PlannedAction {
                action_type: ActionType::Create,
                address: d.address.clone(),
                kind: d.kind,
                resource: lookup(&d.address),
                reason: d.reason.clone(),
                new_hash: d.new_hash.clone(),
                dependencies: vec![],
            });
        }

        for d in diff
            .diffs
            .iter()
            .filter(|d| matches!(d.diff_type, DiffType::Update | DiffType::Drift))
        {
            actions.push(PlannedAction {
                action_type: ActionType::Update,
                address: d.address.clone(),
                kind: d.kind,
                resource: lookup(&d.address),
                reason: d.reason.clone(),
                new_hash: d.new_hash.clone(),
                dependencies: vec![],
            });
        }

        let unchanged = diff
            .diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::NoChange)
            .map(|d| d.address.clone())
            .collect();

        Self {
            created_at: Utc::now(),
            actions,
            unchanged,
        }
    }

    /// Builds a plan deleting every recorded address.
    #[must_use]
    pub fn destroy<'a>(recorded: impl IntoIterator<Item = (&'a str, ResourceKind)>) -> Self {
        let actions = recorded
            .into_iter()
            .map(|(address, kind)| PlannedAction {
                action_type: ActionType::Delete,
                address: address.to_string(),
                kind,
                resource: None,
                reason: String::from("destroy"),
                new_hash: None,
                dependencies: vec![],
            })
            .collect();
        Self {
            created_at: Utc::now(),
            actions,
            unchanged: vec![],
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of one type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {}", self.address),
            ActionType::Update => format!("Update {}", self.address),
            ActionType::Delete => format!("Delete {}", self.address),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.address)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ResourceDiff;

    fn diff(address: &str, kind: ResourceKind, diff_type: DiffType) -> ResourceDiff {
        ResourceDiff {
            address: address.to_string(),
            kind,
            diff_type,
            reason: String::from("r"),
            old_hash: None,
            new_hash: Some(String::from("h")),
        }
    }

    #[test]
    fn test_ordering_and_replace() {
        let result = DiffResult {
            diffs: vec![
                diff("mimir_rules.a", ResourceKind::Rules, DiffType::Create),
                diff("mimir_rules.b", ResourceKind::Rules, DiffType::Replace),
                diff("mimir_rules.c", ResourceKind::Rules, DiffType::Drift),
                diff("mimir_rules.d", ResourceKind::Rules, DiffType::Delete),
                diff("mimir_rules.e", ResourceKind::Rules, DiffType::NoChange),
            ],
        };
        let plan = Plan::from_diff(&result, &[]);

        let steps: Vec<String> = plan.actions.iter().map(PlannedAction::description).collect();
        assert_eq!(
            steps,
            vec![
                "Delete mimir_rules.d",
                "Delete mimir_rules.b",
                "Create mimir_rules.b",
                "Create mimir_rules.a",
                "Update mimir_rules.c",
            ]
        );
        assert_eq!(plan.actions[2].dependencies, vec![1]);
        assert_eq!(plan.unchanged, vec![String::from("mimir_rules.e")]);
        assert_eq!(plan.count(ActionType::Delete), 2);
    }

    #[test]
    fn test_destroy_plan() {
        let plan = Plan::destroy([
            ("mimir_rules.a", ResourceKind::Rules),
            ("mimir_alertmanager_config.m", ResourceKind::AlertmanagerConfig),
        ]);
        assert_eq!(plan.count(ActionType::Delete), 2);
        assert!(plan.to_string().contains("delete mimir_rules.a (destroy)"));
    }

    #[test]
    fn test_empty_plan_display() {
        let plan = Plan::from_diff(&DiffResult::default(), &[]);
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes required");
    }
}
