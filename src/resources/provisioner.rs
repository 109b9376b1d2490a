//! Kind-dispatching front for the controllers.
//!
//! State stores each resource's attributes as JSON. The provisioner
//! decodes them into the right controller state, runs the operation and
//! encodes the result again, so callers only deal with [`Applied`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::alertmanager::AlertmanagerController;
use super::bulk::{RulesController, RulesSpec};
use super::rule_group::{AlertingRuleGroupSpec, RecordingRuleGroupSpec, RuleGroupController};
use super::{ProviderContext, ResourceController, ResourceKind};
use crate::alertmanager::AlertmanagerSpec;
use crate::config::hash::ConfigHasher;
use crate::error::{ConfigError, Result, StateError};
use crate::rules::{AlertingRule, RecordingRule};

/// Desired configuration of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum DesiredResource {
    /// `mimir_rule_group_alerting`
    #[serde(rename = "mimir_rule_group_alerting")]
    AlertingRuleGroup(AlertingRuleGroupSpec),
    /// `mimir_rule_group_recording`
    #[serde(rename = "mimir_rule_group_recording")]
    RecordingRuleGroup(RecordingRuleGroupSpec),
    /// `mimir_alertmanager_config`
    #[serde(rename = "mimir_alertmanager_config")]
    AlertmanagerConfig(AlertmanagerSpec),
    /// `mimir_rules`
    #[serde(rename = "mimir_rules")]
    Rules(RulesSpec),
}

impl DesiredResource {
    /// Returns the resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::AlertingRuleGroup(_) => ResourceKind::AlertingRuleGroup,
            Self::RecordingRuleGroup(_) => ResourceKind::RecordingRuleGroup,
            Self::AlertmanagerConfig(_) => ResourceKind::AlertmanagerConfig,
            Self::Rules(_) => ResourceKind::Rules,
        }
    }

    /// Validates the spec, reporting errors under `field`.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn validate(&self, field: &str) -> std::result::Result<(), ConfigError> {
        match self {
            Self::AlertingRuleGroup(spec) => spec.validate(field),
            Self::RecordingRuleGroup(spec) => spec.validate(field),
            Self::AlertmanagerConfig(spec) => spec.validate(field),
            Self::Rules(spec) => {
                spec.filter()?;
                spec.document().map(|_| ()).map_err(|e| match e {
                    crate::error::MimirError::Config(inner) => inner,
                    other => ConfigError::validation(other.to_string(), format!("{field}.content")),
                })
            }
        }
    }

    /// Hash of everything that determines the remote result.
    ///
    /// For `mimir_rules` the referenced file's content is included, so
    /// editing the file changes the hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be serialized.
    pub fn spec_hash(&self) -> Result<String> {
        let hasher = ConfigHasher::new();
        match self {
            Self::Rules(spec) => hasher.hash_spec(&(spec, spec.source().ok())),
            other => hasher.hash_spec(other),
        }
    }
}

/// Outcome of a controller operation, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Identity string.
    pub id: String,
    /// Controller state as JSON.
    pub attributes: Value,
}

/// Dispatches lifecycle operations to the controller for each kind.
#[derive(Debug, Clone)]
pub struct Provisioner {
    alerting: RuleGroupController<AlertingRule>,
    recording: RuleGroupController<RecordingRule>,
    alertmanager: AlertmanagerController,
    rules: RulesController,
}

impl Provisioner {
    /// Creates a provisioner sharing one context across controllers.
    #[must_use]
    pub fn new(ctx: &ProviderContext) -> Self {
        Self {
            alerting: RuleGroupController::new(ctx.clone()),
            recording: RuleGroupController::new(ctx.clone()),
            alertmanager: AlertmanagerController::new(ctx.clone()),
            rules: RulesController::new(ctx.clone()),
        }
    }

    /// Creates a resource.
    ///
    /// # Errors
    ///
    /// Returns the controller's error.
    pub async fn create(&self, desired: &DesiredResource) -> Result<Applied> {
        match desired {
            DesiredResource::AlertingRuleGroup(spec) => create_with(&self.alerting, spec).await,
            DesiredResource::RecordingRuleGroup(spec) => create_with(&self.recording, spec).await,
            DesiredResource::AlertmanagerConfig(spec) => create_with(&self.alertmanager, spec).await,
            DesiredResource::Rules(spec) => create_with(&self.rules, spec).await,
        }
    }

    /// Reads a recorded resource; `None` if it is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes do not decode or the read fails.
    pub async fn read(&self, kind: ResourceKind, attributes: &Value) -> Result<Option<Applied>> {
        match kind {
            ResourceKind::AlertingRuleGroup => read_with(&self.alerting, attributes).await,
            ResourceKind::RecordingRuleGroup => read_with(&self.recording, attributes).await,
            ResourceKind::AlertmanagerConfig => read_with(&self.alertmanager, attributes).await,
            ResourceKind::Rules => read_with(&self.rules, attributes).await,
        }
    }

    /// Converges a recorded resource to its desired spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes do not decode or the update fails.
    pub async fn update(&self, attributes: &Value, desired: &DesiredResource) -> Result<Applied> {
        match desired {
            DesiredResource::AlertingRuleGroup(spec) => update_with(&self.alerting, attributes, spec).await,
            DesiredResource::RecordingRuleGroup(spec) => update_with(&self.recording, attributes, spec).await,
            DesiredResource::AlertmanagerConfig(spec) => {
                update_with(&self.alertmanager, attributes, spec).await
            }
            DesiredResource::Rules(spec) => update_with(&self.rules, attributes, spec).await,
        }
    }

    /// Deletes a recorded resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes do not decode or the delete fails.
    pub async fn delete(&self, kind: ResourceKind, attributes: &Value) -> Result<()> {
        match kind {
            ResourceKind::AlertingRuleGroup => delete_with(&self.alerting, attributes).await,
            ResourceKind::RecordingRuleGroup => delete_with(&self.recording, attributes).await,
            ResourceKind::AlertmanagerConfig => delete_with(&self.alertmanager, attributes).await,
            ResourceKind::Rules => delete_with(&self.rules, attributes).await,
        }
    }

    /// Adopts an existing remote object.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is malformed or nothing exists there.
    pub async fn import(&self, kind: ResourceKind, id: &str) -> Result<Applied> {
        match kind {
            ResourceKind::AlertingRuleGroup => import_with(&self.alerting, id).await,
            ResourceKind::RecordingRuleGroup => import_with(&self.recording, id).await,
            ResourceKind::AlertmanagerConfig => import_with(&self.alertmanager, id).await,
            ResourceKind::Rules => import_with(&self.rules, id).await,
        }
    }

    /// True if moving to `desired` changes the resource's identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes do not decode.
    pub fn requires_replace(&self, attributes: &Value, desired: &DesiredResource) -> Result<bool> {
        match desired {
            DesiredResource::AlertingRuleGroup(spec) => replace_with(&self.alerting, attributes, spec),
            DesiredResource::RecordingRuleGroup(spec) => replace_with(&self.recording, attributes, spec),
            DesiredResource::AlertmanagerConfig(spec) => replace_with(&self.alertmanager, attributes, spec),
            DesiredResource::Rules(spec) => replace_with(&self.rules, attributes, spec),
        }
    }
}

fn decode<C: ResourceController>(controller: &C, attributes: &Value) -> Result<C::State> {
    serde_json::from_value(attributes.clone()).map_err(|e| {
        StateError::Corrupted {
            message: format!("invalid {} attributes: {e}", controller.kind()),
        }
        .into()
    })
}

fn encode<C: ResourceController>(controller: &C, state: &C::State) -> Result<Applied> {
    let attributes = serde_json::to_value(state).map_err(|e| StateError::serialization(e.to_string()))?;
    Ok(Applied {
        id: controller.id(state),
        attributes,
    })
}

async fn create_with<C: ResourceController>(controller: &C, spec: &C::Spec) -> Result<Applied> {
    let state = controller.create(spec).await?;
    encode(controller, &state)
}

async fn read_with<C: ResourceController>(controller: &C, attributes: &Value) -> Result<Option<Applied>> {
    let state = decode(controller, attributes)?;
    controller
        .read(&state)
        .await?
        .map(|current| encode(controller, &current))
        .transpose()
}

async fn update_with<C: ResourceController>(
    controller: &C,
    attributes: &Value,
    spec: &C::Spec,
) -> Result<Applied> {
    let previous = decode(controller, attributes)?;
    let state = controller.update(&previous, spec).await?;
    encode(controller, &state)
}

async fn delete_with<C: ResourceController>(controller: &C, attributes: &Value) -> Result<()> {
    let state = decode(controller, attributes)?;
    controller.delete(&state).await
}

async fn import_with<C: ResourceController>(controller: &C, id: &str) -> Result<Applied> {
    let state = controller.import(id).await?;
    encode(controller, &state)
}

fn replace_with<C: ResourceController>(controller: &C, attributes: &Value, spec: &C::Spec) -> Result<bool> {
    let previous = decode(controller, attributes)?;
    Ok(controller.requires_replace(&previous, spec))
}
