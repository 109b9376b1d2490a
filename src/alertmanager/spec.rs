//! Declarative Alertmanager configuration.
//!
//! The manifest uses block-style names (`receiver`, `inhibit_rule`,
//! `child_route`, `templates_files`) and may write durations in any
//! accepted form. `to_wire` produces the envelope Mimir stores and
//! `from_wire` maps a fetched envelope back, with durations in canonical
//! form so a round trip compares equal.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::wire::{AlertmanagerConfig, Global, InhibitRule, Receiver, Route, TimeInterval, UserConfig};
use crate::error::{ConfigError, MimirError, Result};
use crate::format::format_duration;

/// Alertmanager configuration for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertmanagerSpec {
    /// Tenant override; the provider `org_id` is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Global defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<Global>,
    /// Root route.
    pub route: RouteSpec,
    /// Receivers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receiver: Vec<Receiver>,
    /// Inhibition rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inhibit_rule: Vec<InhibitRule>,
    /// Named time intervals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_interval: Vec<TimeInterval>,
    /// Named mute time intervals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mute_time_interval: Vec<TimeInterval>,
    /// Template file name to content.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub templates_files: BTreeMap<String, String>,
}

/// A node of the declarative routing tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    /// Receiver name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Labels to group alerts by.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    /// Keep matching sibling routes after this one matches.
    #[serde(rename = "continue", default, skip_serializing_if = "std::ops::Not::not")]
    pub continue_matching: bool,
    /// Label matchers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<String>,
    /// Wait before the first notification of a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_wait: Option<String>,
    /// Wait between notifications of a changed group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_interval: Option<String>,
    /// Wait before resending an unchanged group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<String>,
    /// Intervals during which the route is muted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mute_time_intervals: Vec<String>,
    /// Intervals during which the route is active.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_time_intervals: Vec<String>,
    /// Child routes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_route: Vec<RouteSpec>,
}

fn canonical(field: &str, value: Option<&String>) -> std::result::Result<Option<String>, ConfigError> {
    value.map(|v| format_duration(field, v)).transpose()
}

impl RouteSpec {
    /// Converts the subtree rooted here into wire form.
    ///
    /// # Errors
    ///
    /// Returns an error naming the route path if a duration is invalid.
    pub fn to_wire(&self) -> std::result::Result<Route, ConfigError> {
        self.to_wire_at("route")
    }

    fn to_wire_at(&self, path: &str) -> std::result::Result<Route, ConfigError> {
        let routes = self
            .child_route
            .iter()
            .enumerate()
            .map(|(i, child)| child.to_wire_at(&format!("{path}.child_route[{i}]")))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Route {
            receiver: self.receiver.clone(),
            group_by: self.group_by.clone(),
            continue_matching: self.continue_matching,
            matchers: self.matchers.clone(),
            group_wait: canonical(&format!("{path}.group_wait"), self.group_wait.as_ref())?,
            group_interval: canonical(&format!("{path}.group_interval"), self.group_interval.as_ref())?,
            repeat_interval: canonical(&format!("{path}.repeat_interval"), self.repeat_interval.as_ref())?,
            mute_time_intervals: self.mute_time_intervals.clone(),
            active_time_intervals: self.active_time_intervals.clone(),
            routes,
        })
    }

    /// Builds the declarative subtree from a wire route.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration in the fetched route is invalid.
    pub fn from_wire(route: &Route) -> std::result::Result<Self, ConfigError> {
        Self::from_wire_at(route, "route")
    }

    fn from_wire_at(route: &Route, path: &str) -> std::result::Result<Self, ConfigError> {
        let child_route = route
            .routes
            .iter()
            .enumerate()
            .map(|(i, child)| Self::from_wire_at(child, &format!("{path}.child_route[{i}]")))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            receiver: route.receiver.clone(),
            group_by: route.group_by.clone(),
            continue_matching: route.continue_matching,
            matchers: route.matchers.clone(),
            group_wait: canonical(&format!("{path}.group_wait"), route.group_wait.as_ref())?,
            group_interval: canonical(&format!("{path}.group_interval"), route.group_interval.as_ref())?,
            repeat_interval: canonical(&format!("{path}.repeat_interval"), route.repeat_interval.as_ref())?,
            mute_time_intervals: route.mute_time_intervals.clone(),
            active_time_intervals: route.active_time_intervals.clone(),
            child_route,
        })
    }

    /// Returns every receiver referenced in the subtree, depth first.
    #[must_use]
    pub fn receivers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(receiver) = &node.receiver {
                out.push(receiver.as_str());
            }
            stack.extend(node.child_route.iter().rev());
        }
        out
    }

    /// Returns the depth of the subtree; a leaf has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.child_route.iter().map(Self::depth).max().unwrap_or(0)
    }
}

fn global_to_canonical(global: &Global) -> std::result::Result<Global, ConfigError> {
    Ok(Global {
        resolve_timeout: canonical("global.resolve_timeout", global.resolve_timeout.as_ref())?,
        ..global.clone()
    })
}

impl AlertmanagerSpec {
    /// Produces the envelope stored by Mimir.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration is invalid or serialization fails.
    pub fn to_wire(&self) -> Result<UserConfig> {
        let config = AlertmanagerConfig {
            global: self.global.as_ref().map(global_to_canonical).transpose()?,
            route: Some(self.route.to_wire()?),
            receivers: self.receiver.clone(),
            inhibit_rules: self.inhibit_rule.clone(),
            time_intervals: self.time_interval.clone(),
            mute_time_intervals: self.mute_time_interval.clone(),
            templates: self.templates_files.keys().cloned().collect(),
        };

        let alertmanager_config = serde_yaml::to_string(&config)
            .map_err(|e| MimirError::yaml("alertmanager configuration", &e))?;

        Ok(UserConfig {
            template_files: self.templates_files.clone(),
            alertmanager_config,
        })
    }

    /// Maps a fetched envelope back to the declarative shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded YAML or a duration is invalid.
    pub fn from_wire(envelope: &UserConfig, org_id: Option<String>) -> Result<Self> {
        let config: AlertmanagerConfig = serde_yaml::from_str(&envelope.alertmanager_config)
            .map_err(|e| MimirError::yaml("alertmanager configuration", &e))?;

        Ok(Self {
            org_id,
            global: config.global.as_ref().map(global_to_canonical).transpose()?,
            route: config
                .route
                .as_ref()
                .map(RouteSpec::from_wire)
                .transpose()?
                .unwrap_or_default(),
            receiver: config.receivers,
            inhibit_rule: config.inhibit_rules,
            time_interval: config.time_intervals,
            mute_time_interval: config.mute_time_intervals,
            templates_files: envelope.template_files.clone(),
        })
    }

    /// Returns this spec with durations in canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration is invalid.
    pub fn normalized(&self) -> Result<Self> {
        Self::from_wire(&self.to_wire()?, self.org_id.clone())
    }

    /// Checks receiver names and the root route.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self, field: &str) -> std::result::Result<(), ConfigError> {
        if self.route.receiver.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::validation(
                "root route must name a receiver",
                format!("{field}.route.receiver"),
            ));
        }

        let mut names = BTreeSet::new();
        for (i, receiver) in self.receiver.iter().enumerate() {
            if receiver.name.is_empty() {
                return Err(ConfigError::validation(
                    "receiver name cannot be empty",
                    format!("{field}.receiver[{i}].name"),
                ));
            }
            if !names.insert(receiver.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    resource_type: String::from("receiver"),
                    name: receiver.name.clone(),
                });
            }
        }

        self.route.to_wire()?;
        if let Some(global) = &self.global {
            global_to_canonical(global)?;
        }
        Ok(())
    }

    /// Receivers referenced by routes but not declared.
    ///
    /// Alertmanager rejects these on upload; they are reported early but
    /// not treated as errors locally.
    #[must_use]
    pub fn undeclared_receivers(&self) -> Vec<String> {
        let declared: BTreeSet<&str> = self.receiver.iter().map(|r| r.name.as_str()).collect();
        let mut seen = BTreeSet::new();
        self.route
            .receivers()
            .into_iter()
            .filter(|r| !declared.contains(r) && seen.insert(*r))
            .map(str::to_string)
            .collect()
    }
}
