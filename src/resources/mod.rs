//! Resource controllers.
//!
//! Each managed kind has a controller implementing the same lifecycle:
//! create, read, update, delete and import. A read that finds the remote
//! object gone returns `None` instead of an error, which lets the caller
//! drop it from state and recreate it on the next apply.

mod alertmanager;
mod bulk;
mod data;
mod identity;
mod provisioner;
mod rule_group;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::MimirClient;
use crate::error::{ConfigError, Result};
use crate::format::FormatOptions;

pub use alertmanager::{AlertmanagerController, AlertmanagerState};
pub use bulk::{RulesController, RulesSpec, RulesState};
pub use data::DataSources;
pub use identity::{GroupId, NamespaceId};
pub use provisioner::{Applied, DesiredResource, Provisioner};
pub use rule_group::{
    AlertingRuleGroupSpec, RecordingRuleGroupSpec, RuleGroupController, RuleGroupSpec,
    RuleGroupState,
};

/// Default wait between a write and the follow-up read.
pub const DEFAULT_READ_DELAY: Duration = Duration::from_secs(1);

/// Managed resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A group of alerting rules.
    #[serde(rename = "mimir_rule_group_alerting")]
    AlertingRuleGroup,
    /// A group of recording rules.
    #[serde(rename = "mimir_rule_group_recording")]
    RecordingRuleGroup,
    /// A tenant's Alertmanager configuration.
    #[serde(rename = "mimir_alertmanager_config")]
    AlertmanagerConfig,
    /// A document of many rule groups in one namespace.
    #[serde(rename = "mimir_rules")]
    Rules,
}

impl ResourceKind {
    /// Every kind, in manifest order.
    pub const ALL: [Self; 4] = [
        Self::AlertingRuleGroup,
        Self::RecordingRuleGroup,
        Self::AlertmanagerConfig,
        Self::Rules,
    ];

    /// Returns the manifest key for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlertingRuleGroup => "mimir_rule_group_alerting",
            Self::RecordingRuleGroup => "mimir_rule_group_recording",
            Self::AlertmanagerConfig => "mimir_alertmanager_config",
            Self::Rules => "mimir_rules",
        }
    }

    /// Accepted import id formats.
    #[must_use]
    pub const fn import_formats(self) -> &'static str {
        match self {
            Self::AlertingRuleGroup | Self::RecordingRuleGroup => {
                "'namespace/name' or 'org_id/namespace/name'"
            }
            Self::AlertmanagerConfig => "'org_id'",
            Self::Rules => "'namespace' or 'org_id/namespace'",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::validation_general(format!("unknown resource kind '{s}'")))
    }
}

/// What every controller needs: the client and provider-wide settings.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Mimir API client.
    pub client: MimirClient,
    /// Expression formatting switches.
    pub format: FormatOptions,
    /// Wait between a write and the follow-up read.
    pub read_delay: Duration,
}

impl ProviderContext {
    /// Creates a context with the default read delay.
    #[must_use]
    pub const fn new(client: MimirClient, format: FormatOptions) -> Self {
        Self {
            client,
            format,
            read_delay: DEFAULT_READ_DELAY,
        }
    }

    /// Sets the read delay.
    #[must_use]
    pub const fn with_read_delay(mut self, read_delay: Duration) -> Self {
        self.read_delay = read_delay;
        self
    }

    /// Waits out the configured propagation delay.
    pub async fn settle(&self) {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
    }

    /// Resolves a per-resource tenant override against the provider tenant.
    #[must_use]
    pub fn org_id<'a>(&'a self, org_id: Option<&'a str>) -> &'a str {
        org_id
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| self.client.org_id())
    }
}

/// Lifecycle of one managed resource kind.
#[async_trait]
pub trait ResourceController: Send + Sync {
    /// Desired configuration.
    type Spec: Send + Sync;
    /// What is recorded in state after a successful operation.
    type State: Serialize + for<'de> Deserialize<'de> + Send + Sync;

    /// The kind this controller manages.
    fn kind(&self) -> ResourceKind;

    /// Identity string of a recorded resource.
    fn id(&self, state: &Self::State) -> String;

    /// Creates the remote object and reads it back.
    async fn create(&self, spec: &Self::Spec) -> Result<Self::State>;

    /// Reads the remote object; `None` if it no longer exists.
    async fn read(&self, state: &Self::State) -> Result<Option<Self::State>>;

    /// Converges the remote object to `spec` and reads it back.
    async fn update(&self, previous: &Self::State, spec: &Self::Spec) -> Result<Self::State>;

    /// Deletes the remote object.
    async fn delete(&self, state: &Self::State) -> Result<()>;

    /// Adopts an existing remote object by identity string.
    async fn import(&self, id: &str) -> Result<Self::State>;

    /// True if moving from `previous` to `spec` changes identity.
    fn requires_replace(&self, previous: &Self::State, spec: &Self::Spec) -> bool;
}
