//! Manifest types.
//!
//! This module defines the structs that map to `mimirform.yaml`: the
//! provider connection settings, where state lives, and the declared
//! resources keyed by kind and label.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alertmanager::AlertmanagerSpec;
use crate::client::{ClientConfig, DEFAULT_TIMEOUT_SECS};
use crate::error::ConfigError;
use crate::format::{FormatOptions, PromDuration};
use crate::resources::{
    AlertingRuleGroupSpec, DEFAULT_READ_DELAY, DesiredResource, RecordingRuleGroupSpec,
    ResourceKind, RulesSpec,
};

/// Default state file, relative to the manifest.
pub const DEFAULT_STATE_PATH: &str = ".mimirform/state.json";

/// The root of a manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Connection settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// State location.
    #[serde(default)]
    pub state: StateConfig,
    /// Declared resources.
    #[serde(default)]
    pub resources: Resources,
}

/// Connection settings for the Mimir APIs.
///
/// Every field may be left unset and filled from `MIMIR_*` variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Default base URI.
    #[serde(default)]
    pub uri: Option<String>,
    /// Ruler base URI.
    #[serde(default)]
    pub ruler_uri: Option<String>,
    /// Alertmanager base URI.
    #[serde(default)]
    pub alertmanager_uri: Option<String>,
    /// Distributor base URI.
    #[serde(default)]
    pub distributor_uri: Option<String>,
    /// Default tenant.
    #[serde(default)]
    pub org_id: Option<String>,
    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,
    /// Basic auth user.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// HTTP proxy.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// CA bundle, inline PEM or path.
    #[serde(default)]
    pub ca: Option<String>,
    /// Client certificate, inline PEM or path.
    #[serde(default)]
    pub cert: Option<String>,
    /// Client key, inline PEM or path.
    #[serde(default)]
    pub key: Option<String>,
    /// Skip TLS verification.
    #[serde(default)]
    pub insecure: Option<bool>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Extra headers on every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Dump requests and responses at debug level.
    #[serde(default)]
    pub debug: Option<bool>,
    /// Pretty-print PromQL expressions before comparing.
    #[serde(default)]
    pub format_promql_expr: Option<bool>,
    /// Wait between a write and the follow-up read.
    #[serde(default)]
    pub read_delay: Option<String>,
}

impl ProviderConfig {
    /// Builds the transport configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `uri` or `org_id` is missing.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let uri = required(self.uri.as_ref(), "provider.uri", "MIMIR_URI")?;
        let org_id = required(self.org_id.as_ref(), "provider.org_id", "MIMIR_ORG_ID")?;

        let mut config = ClientConfig::new(uri, org_id)
            .with_timeout(Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .with_debug(self.debug.unwrap_or(false));
        config.ruler_uri.clone_from(&self.ruler_uri);
        config.alertmanager_uri.clone_from(&self.alertmanager_uri);
        config.distributor_uri.clone_from(&self.distributor_uri);
        config.token.clone_from(&self.token);
        config.username.clone_from(&self.username);
        config.password.clone_from(&self.password);
        config.proxy_url.clone_from(&self.proxy_url);
        config.ca.clone_from(&self.ca);
        config.cert.clone_from(&self.cert);
        config.key.clone_from(&self.key);
        config.insecure = self.insecure.unwrap_or(false);
        config.headers.clone_from(&self.headers);
        Ok(config)
    }

    /// Returns the formatting switches.
    #[must_use]
    pub fn format_options(&self) -> FormatOptions {
        FormatOptions::new(self.format_promql_expr.unwrap_or(false))
    }

    /// Returns the read delay.
    ///
    /// # Errors
    ///
    /// Returns an error if `read_delay` is not a valid duration.
    pub fn read_delay(&self) -> Result<Duration, ConfigError> {
        self.read_delay.as_deref().map_or(Ok(DEFAULT_READ_DELAY), |value| {
            value
                .parse::<PromDuration>()
                .map(PromDuration::to_std)
                .map_err(|_| ConfigError::InvalidDuration {
                    field: String::from("provider.read_delay"),
                    value: value.to_string(),
                })
        })
    }
}

fn required(value: Option<&String>, field: &str, env: &str) -> Result<String, ConfigError> {
    value.filter(|v| !v.is_empty()).cloned().ok_or_else(|| {
        ConfigError::validation(format!("{field} is required (or set {env})"), field)
    })
}

/// Where state is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// State file path, relative to the manifest directory.
    #[serde(default)]
    pub path: Option<String>,
}

impl StateConfig {
    /// Resolves the state file path against the manifest directory.
    #[must_use]
    pub fn resolve(&self, base: &Path) -> PathBuf {
        let path = Path::new(self.path.as_deref().unwrap_or(DEFAULT_STATE_PATH));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

/// Declared resources, keyed by label within each kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Resources {
    /// Alerting rule groups.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mimir_rule_group_alerting: BTreeMap<String, AlertingRuleGroupSpec>,
    /// Recording rule groups.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mimir_rule_group_recording: BTreeMap<String, RecordingRuleGroupSpec>,
    /// Alertmanager configurations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mimir_alertmanager_config: BTreeMap<String, AlertmanagerSpec>,
    /// Rule group documents.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mimir_rules: BTreeMap<String, RulesSpec>,
}

impl Resources {
    /// Returns every declared resource with its address.
    #[must_use]
    pub fn desired(&self) -> Vec<(ResourceAddress, DesiredResource)> {
        let mut out = Vec::new();
        for (label, spec) in &self.mimir_rule_group_alerting {
            out.push((
                ResourceAddress::new(ResourceKind::AlertingRuleGroup, label),
                DesiredResource::AlertingRuleGroup(spec.clone()),
            ));
        }
        for (label, spec) in &self.mimir_rule_group_recording {
            out.push((
                ResourceAddress::new(ResourceKind::RecordingRuleGroup, label),
                DesiredResource::RecordingRuleGroup(spec.clone()),
            ));
        }
        for (label, spec) in &self.mimir_alertmanager_config {
            out.push((
                ResourceAddress::new(ResourceKind::AlertmanagerConfig, label),
                DesiredResource::AlertmanagerConfig(spec.clone()),
            ));
        }
        for (label, spec) in &self.mimir_rules {
            out.push((
                ResourceAddress::new(ResourceKind::Rules, label),
                DesiredResource::Rules(spec.clone()),
            ));
        }
        out
    }

    /// Number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mimir_rule_group_alerting.len()
            + self.mimir_rule_group_recording.len()
            + self.mimir_alertmanager_config.len()
            + self.mimir_rules.len()
    }

    /// True if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves relative `content_file` paths against the manifest directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        for spec in self.mimir_rules.values_mut() {
            if let Some(path) = spec.content_file.as_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }
}

/// Address of a declared resource: `<kind>.<label>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceAddress {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Label within the kind.
    pub label: String,
}

impl ResourceAddress {
    /// Creates an address.
    #[must_use]
    pub fn new(kind: ResourceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.label)
    }
}

impl FromStr for ResourceAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, label) = s.split_once('.').ok_or_else(|| {
            ConfigError::validation_general(format!("invalid address '{s}', expected <kind>.<label>"))
        })?;
        if label.is_empty() {
            return Err(ConfigError::validation_general(format!(
                "invalid address '{s}', label is empty"
            )));
        }
        Ok(Self::new(kind.parse()?, label))
    }
}
