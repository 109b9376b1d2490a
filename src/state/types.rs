//! Recorded state.
//!
//! One entry per managed resource, keyed by address, holding the remote
//! identity, the hash of the spec that produced it and the attributes the
//! controller returned.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resources::ResourceKind;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// History entries kept in the state file.
pub const MAX_HISTORY: usize = 100;

/// The complete provider state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderState {
    /// State format version.
    pub version: String,
    /// Managed resources keyed by address.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Operation history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// State of a single managed resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceState {
    /// Address in the manifest (`<kind>.<label>`).
    pub address: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Remote identity.
    pub id: String,
    /// Hash of the spec last applied. Empty when drift was detected or
    /// the resource was imported.
    #[serde(default)]
    pub spec_hash: String,
    /// Attributes returned by the last successful operation.
    pub attributes: Value,
    /// When the resource was first recorded.
    pub created_at: DateTime<Utc>,
    /// When the resource was last written.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: Operation,
    /// Addresses affected.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Plan applied.
    Apply,
    /// Remote state re-read.
    Refresh,
    /// Everything destroyed.
    Destroy,
    /// Existing object adopted.
    Import,
    /// Entry dropped from state by hand.
    Remove,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a resource by address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    /// Adds or updates a resource.
    ///
    /// `created_at` is preserved when the address was already recorded.
    pub fn set(&mut self, mut resource: ResourceState) {
        if let Some(existing) = self.resources.get(&resource.address) {
            resource.created_at = existing.created_at;
        }
        self.resources.insert(resource.address.clone(), resource);
        self.last_updated = Utc::now();
    }

    /// Removes a resource by address.
    pub fn remove(&mut self, address: &str) -> Option<ResourceState> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            let excess = self.history.len() + 1 - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.history.push(entry);
    }

    /// Returns all recorded addresses.
    #[must_use]
    pub fn addresses(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Number of managed resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True if nothing is managed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceState {
    /// Creates a resource entry stamped now.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        kind: ResourceKind,
        id: impl Into<String>,
        spec_hash: impl Into<String>,
        attributes: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            address: address.into(),
            kind,
            id: id.into(),
            spec_hash: spec_hash.into(),
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    /// True if the last refresh found the remote copy changed.
    #[must_use]
    pub const fn is_drifted(&self) -> bool {
        self.spec_hash.is_empty()
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: Operation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: Operation, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Refresh => "refresh",
            Self::Destroy => "destroy",
            Self::Import => "import",
            Self::Remove => "remove",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_preserves_created_at() {
        let mut state = ProviderState::new();
        let first = ResourceState::new("mimir_rules.a", ResourceKind::Rules, "infra", "h1", json!({}));
        let created = first.created_at;
        state.set(first);

        std::thread::sleep(std::time::Duration::from_millis(5));
        state.set(ResourceState::new("mimir_rules.a", ResourceKind::Rules, "infra", "h2", json!({})));

        let entry = state.get("mimir_rules.a").expect("entry");
        assert_eq!(entry.created_at, created);
        assert_eq!(entry.spec_hash, "h2");
        assert!(entry.updated_at >= created);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = ProviderState::new();
        for i in 0..(MAX_HISTORY + 5) {
            state.add_history(HistoryEntry::new(Operation::Apply, vec![i.to_string()]));
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].resources, vec![String::from("5")]);
    }

    #[test]
    fn test_remove() {
        let mut state = ProviderState::new();
        state.set(ResourceState::new("x.y", ResourceKind::Rules, "ns", "", json!(null)));
        assert!(state.get("x.y").is_some_and(ResourceState::is_drifted));
        assert!(state.remove("x.y").is_some());
        assert!(state.remove("x.y").is_none());
        assert!(state.is_empty());
    }

    #[test]
    fn test_state_json_shape() {
        let mut state = ProviderState::new();
        state.set(ResourceState::new(
            "mimir_alertmanager_config.main",
            ResourceKind::AlertmanagerConfig,
            "tenant-1",
            "abc",
            json!({"org_id": "tenant-1"}),
        ));
        let text = serde_json::to_string(&state).expect("serialize");
        assert!(text.contains("\"kind\":\"mimir_alertmanager_config\""));
        let back: ProviderState = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, state);
    }
}
