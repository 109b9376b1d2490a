//! Diff engine for comparing desired resources with recorded state.
//!
//! The spec hash recorded at the last apply is the change signal: a
//! differing hash means Update, an empty one means the last refresh saw
//! drift (or the resource was imported) and it is converged again.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::ResourceAddress;
use crate::error::Result;
use crate::resources::{DesiredResource, Provisioner, ResourceKind};
use crate::state::ProviderState;

/// Engine for computing diffs between desired and recorded state.
#[derive(Debug)]
pub struct DiffEngine<'a> {
    provisioner: &'a Provisioner,
}

/// Difference for a single resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDiff {
    /// Resource address.
    pub address: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Why the resource is in the plan.
    pub reason: String,
    /// Hash recorded in state (if any).
    pub old_hash: Option<String>,
    /// Hash of the desired spec (if any).
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiffType {
    /// Not recorded yet.
    Create,
    /// Desired spec changed.
    Update,
    /// Remote copy changed outside this tool.
    Drift,
    /// An identity attribute changed.
    Replace,
    /// Recorded but no longer declared.
    Delete,
    /// Nothing to do.
    NoChange,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All resource diffs, in address order.
    pub diffs: Vec<ResourceDiff>,
}

impl<'a> DiffEngine<'a> {
    /// Creates a diff engine. The provisioner answers replace questions.
    #[must_use]
    pub const fn new(provisioner: &'a Provisioner) -> Self {
        Self { provisioner }
    }

    /// Computes the diff between declared resources and recorded state.
    ///
    /// # Errors
    ///
    /// Returns an error if a spec cannot be hashed or recorded attributes
    /// do not decode.
    pub fn compute_diff(
        &self,
        desired: &[(ResourceAddress, DesiredResource)],
        state: &ProviderState,
    ) -> Result<DiffResult> {
        let mut diffs = Vec::new();
        let mut declared = BTreeSet::new();

        for (address, resource) in desired {
            let key = address.to_string();
            let new_hash = resource.spec_hash()?;
            declared.insert(key.clone());

            let diff = match state.get(&key) {
                None => {
                    debug!("{key} needs to be created");
                    ResourceDiff {
                        address: key,
                        kind: resource.kind(),
                        diff_type: DiffType::Create,
                        reason: String::from("declared but not managed"),
                        old_hash: None,
                        new_hash: Some(new_hash),
                    }
                }
                Some(recorded) => {
                    let old_hash = Some(recorded.spec_hash.clone()).filter(|h| !h.is_empty());
                    let (diff_type, reason) =
                        if self.provisioner.requires_replace(&recorded.attributes, resource)? {
                            (DiffType::Replace, format!("identity changed from {}", recorded.id))
                        } else if recorded.is_drifted() {
                            (DiffType::Drift, String::from("remote copy differs from state"))
                        } else if recorded.spec_hash != new_hash {
                            (DiffType::Update, String::from("desired spec changed"))
                        } else {
                            (DiffType::NoChange, String::new())
                        };
                    debug!("{key}: {diff_type}");
                    ResourceDiff {
                        address: key,
                        kind: resource.kind(),
                        diff_type,
                        reason,
                        old_hash,
                        new_hash: Some(new_hash),
                    }
                }
            };
            diffs.push(diff);
        }

        for (key, recorded) in &state.resources {
            if !declared.contains(key) {
                debug!("{key} is no longer declared");
                diffs.push(ResourceDiff {
                    address: key.clone(),
                    kind: recorded.kind,
                    diff_type: DiffType::Delete,
                    reason: String::from("removed from manifest"),
                    old_hash: Some(recorded.spec_hash.clone()).filter(|h| !h.is_empty()),
                    new_hash: None,
                });
            }
        }

        diffs.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(DiffResult { diffs })
    }
}

impl DiffResult {
    fn count(&self, diff_type: DiffType) -> usize {
        self.diffs.iter().filter(|d| d.diff_type == diff_type).count()
    }

    /// Number of resources to create.
    #[must_use]
    pub fn creates(&self) -> usize {
        self.count(DiffType::Create)
    }

    /// Number of resources to update, drifted ones included.
    #[must_use]
    pub fn updates(&self) -> usize {
        self.count(DiffType::Update) + self.count(DiffType::Drift)
    }

    /// Number of resources to replace.
    #[must_use]
    pub fn replaces(&self) -> usize {
        self.count(DiffType::Replace)
    }

    /// Number of resources to delete.
    #[must_use]
    pub fn deletes(&self) -> usize {
        self.count(DiffType::Delete)
    }

    /// Number of unchanged resources.
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.count(DiffType::NoChange)
    }

    /// Returns true if there are any changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diffs.iter().any(|d| d.diff_type != DiffType::NoChange)
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Drift => "drift",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.address, self.diff_type)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}
