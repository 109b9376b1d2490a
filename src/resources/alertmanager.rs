//! Alertmanager configuration controller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ProviderContext, ResourceController, ResourceKind};
use crate::alertmanager::AlertmanagerSpec;
use crate::error::{ReconcileError, Result};

/// Recorded state of a tenant's Alertmanager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertmanagerState {
    /// Tenant the configuration belongs to.
    pub org_id: String,
    /// Configuration as last read, durations canonical.
    pub config: AlertmanagerSpec,
}

/// Controller for `mimir_alertmanager_config`.
#[derive(Debug, Clone)]
pub struct AlertmanagerController {
    ctx: ProviderContext,
}

impl AlertmanagerController {
    /// Creates a controller.
    #[must_use]
    pub const fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    async fn fetch(&self, org_id: &str, declared: Option<String>) -> Result<Option<AlertmanagerState>> {
        let envelope = match self.ctx.client.get_alertmanager_config(Some(org_id)).await {
            Ok(envelope) => envelope,
            Err(e) if e.is_not_found() => {
                info!("Alertmanager configuration for {org_id} no longer exists");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(Some(AlertmanagerState {
            org_id: org_id.to_string(),
            config: AlertmanagerSpec::from_wire(&envelope, declared)?,
        }))
    }

    async fn write(&self, org_id: &str, spec: &AlertmanagerSpec) -> Result<AlertmanagerState> {
        let envelope = spec.to_wire()?;
        self.ctx
            .client
            .set_alertmanager_config(Some(org_id), &envelope)
            .await?;

        self.ctx.settle().await;
        self.fetch(org_id, spec.org_id.clone()).await?.ok_or_else(|| {
            ReconcileError::ResourceReconcileFailed {
                resource_type: ResourceKind::AlertmanagerConfig.to_string(),
                name: org_id.to_string(),
                reason: String::from("configuration not found after write"),
            }
            .into()
        })
    }
}

#[async_trait]
impl ResourceController for AlertmanagerController {
    type Spec = AlertmanagerSpec;
    type State = AlertmanagerState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::AlertmanagerConfig
    }

    fn id(&self, state: &Self::State) -> String {
        state.org_id.clone()
    }

    async fn create(&self, spec: &Self::Spec) -> Result<Self::State> {
        let org_id = self.ctx.org_id(spec.org_id.as_deref()).to_string();
        info!("Creating alertmanager configuration for {org_id}");
        self.write(&org_id, spec).await
    }

    async fn read(&self, state: &Self::State) -> Result<Option<Self::State>> {
        self.fetch(&state.org_id, state.config.org_id.clone()).await
    }

    async fn update(&self, previous: &Self::State, spec: &Self::Spec) -> Result<Self::State> {
        let org_id = self.ctx.org_id(spec.org_id.as_deref()).to_string();

        if spec.normalized()? == previous.config {
            debug!("Alertmanager configuration for {org_id} unchanged, skipping write");
            return self.fetch(&org_id, spec.org_id.clone()).await?.ok_or_else(|| {
                ReconcileError::ResourceReconcileFailed {
                    resource_type: self.kind().to_string(),
                    name: org_id.clone(),
                    reason: String::from("configuration not found"),
                }
                .into()
            });
        }

        info!("Updating alertmanager configuration for {org_id}");
        self.write(&org_id, spec).await
    }

    async fn delete(&self, state: &Self::State) -> Result<()> {
        info!("Deleting alertmanager configuration for {}", state.org_id);
        self.ctx
            .client
            .delete_alertmanager_config(Some(&state.org_id))
            .await
    }

    async fn import(&self, id: &str) -> Result<Self::State> {
        if id.is_empty() || id.contains('/') {
            return Err(ReconcileError::InvalidImportId {
                resource_type: self.kind().to_string(),
                id: id.to_string(),
                expected: self.kind().import_formats().to_string(),
            }
            .into());
        }

        self.fetch(id, Some(id.to_string())).await?.ok_or_else(|| {
            ReconcileError::ImportNotFound {
                id: id.to_string(),
            }
            .into()
        })
    }

    fn requires_replace(&self, previous: &Self::State, spec: &Self::Spec) -> bool {
        self.ctx.org_id(spec.org_id.as_deref()) != previous.org_id
    }
}
