//! Single rule group controllers.
//!
//! One generic controller serves both the alerting and the recording
//! kind; the rule type parameter fixes which rules a spec may hold.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::identity::GroupId;
use super::{ProviderContext, ResourceController, ResourceKind};
use crate::error::{ConfigError, ReconcileError, Result};
use crate::format::{FormatOptions, validate_namespace};
use crate::rules::{AlertingRule, GroupRule, RecordingRule, RuleGroup, RuleKind, validate_rule_group};

/// Desired state of one rule group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleGroupSpec<R> {
    /// Tenant override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Rule namespace.
    pub namespace: String,
    /// Group name.
    pub name: String,
    /// Evaluation interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Evaluation delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_offset: Option<String>,
    /// Tenants queried by a federated group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_tenants: Vec<String>,
    /// Per-rule output limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Rules in evaluation order.
    pub rule: Vec<R>,
}

/// Spec of a `mimir_rule_group_alerting` resource.
pub type AlertingRuleGroupSpec = RuleGroupSpec<AlertingRule>;

/// Spec of a `mimir_rule_group_recording` resource.
pub type RecordingRuleGroupSpec = RuleGroupSpec<RecordingRule>;

impl<R: GroupRule> RuleGroupSpec<R> {
    fn raw_group(&self) -> RuleGroup {
        RuleGroup {
            name: self.name.clone(),
            interval: self.interval.clone(),
            query_offset: self.query_offset.clone(),
            source_tenants: self.source_tenants.clone(),
            limit: self.limit,
            rules: self.rule.iter().cloned().map(GroupRule::into_rule).collect(),
        }
    }

    /// Builds the group sent to the ruler.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration or expression cannot be normalized.
    pub fn to_wire(&self, format: FormatOptions) -> Result<RuleGroup> {
        self.raw_group().normalized(format)
    }

    /// Validates names, durations and expressions.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self, field: &str) -> std::result::Result<(), ConfigError> {
        validate_namespace(&format!("{field}.namespace"), &self.namespace)?;
        validate_rule_group(&self.raw_group())
    }

    /// Identity of the group this spec describes.
    #[must_use]
    pub fn group_id(&self) -> GroupId {
        GroupId {
            org_id: self.org_id.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// Recorded state of one rule group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroupState {
    /// Tenant override used for every call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Rule namespace.
    pub namespace: String,
    /// The group as last read from the ruler.
    pub group: RuleGroup,
}

impl RuleGroupState {
    /// Identity of the recorded group.
    #[must_use]
    pub fn group_id(&self) -> GroupId {
        GroupId {
            org_id: self.org_id.clone(),
            namespace: self.namespace.clone(),
            name: self.group.name.clone(),
        }
    }
}

/// Controller for `mimir_rule_group_alerting` and `mimir_rule_group_recording`.
#[derive(Debug, Clone)]
pub struct RuleGroupController<R> {
    ctx: ProviderContext,
    rule: PhantomData<fn() -> R>,
}

impl<R: GroupRule> RuleGroupController<R> {
    /// Creates a controller.
    #[must_use]
    pub const fn new(ctx: ProviderContext) -> Self {
        Self {
            ctx,
            rule: PhantomData,
        }
    }

    async fn fetch(&self, id: &GroupId) -> Result<Option<RuleGroupState>> {
        let group = match self
            .ctx
            .client
            .get_rule_group(id.org_id.as_deref(), &id.namespace, &id.name)
            .await
        {
            Ok(group) => group,
            Err(e) if e.is_not_found() => {
                info!("Rule group {id} no longer exists");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let group = match group.normalized(self.ctx.format) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("Keeping rule group {id} as returned, normalization failed: {e}");
                group
            }
        };

        Ok(Some(RuleGroupState {
            org_id: id.org_id.clone(),
            namespace: id.namespace.clone(),
            group,
        }))
    }

    async fn read_back(&self, id: &GroupId) -> Result<RuleGroupState> {
        self.ctx.settle().await;
        self.fetch(id).await?.ok_or_else(|| {
            ReconcileError::ResourceReconcileFailed {
                resource_type: self.kind().to_string(),
                name: id.to_string(),
                reason: String::from("rule group not found after write"),
            }
            .into()
        })
    }
}

#[async_trait]
impl<R: GroupRule> ResourceController for RuleGroupController<R> {
    type Spec = RuleGroupSpec<R>;
    type State = RuleGroupState;

    fn kind(&self) -> ResourceKind {
        match R::KIND {
            RuleKind::Alerting => ResourceKind::AlertingRuleGroup,
            RuleKind::Recording => ResourceKind::RecordingRuleGroup,
        }
    }

    fn id(&self, state: &Self::State) -> String {
        state.group_id().to_string()
    }

    async fn create(&self, spec: &Self::Spec) -> Result<Self::State> {
        let id = spec.group_id();
        info!("Creating {} rule group {id}", R::KIND);

        let group = spec.to_wire(self.ctx.format)?;
        self.ctx
            .client
            .create_rule_group(id.org_id.as_deref(), &id.namespace, &group)
            .await?;

        self.read_back(&id).await
    }

    async fn read(&self, state: &Self::State) -> Result<Option<Self::State>> {
        self.fetch(&state.group_id()).await
    }

    async fn update(&self, previous: &Self::State, spec: &Self::Spec) -> Result<Self::State> {
        let id = spec.group_id();
        let group = spec.to_wire(self.ctx.format)?;

        if group == previous.group {
            debug!("Rule group {id} unchanged, skipping write");
            return self.fetch(&id).await?.ok_or_else(|| {
                ReconcileError::ResourceReconcileFailed {
                    resource_type: self.kind().to_string(),
                    name: id.to_string(),
                    reason: String::from("rule group not found"),
                }
                .into()
            });
        }

        info!("Updating {} rule group {id}", R::KIND);
        self.ctx
            .client
            .create_rule_group(id.org_id.as_deref(), &id.namespace, &group)
            .await?;

        self.read_back(&id).await
    }

    async fn delete(&self, state: &Self::State) -> Result<()> {
        let id = state.group_id();
        info!("Deleting {} rule group {id}", R::KIND);

        self.ctx
            .client
            .delete_rule_group(id.org_id.as_deref(), &id.namespace, &id.name)
            .await
    }

    async fn import(&self, id: &str) -> Result<Self::State> {
        let group_id = GroupId::parse(self.kind(), id)?;
        self.fetch(&group_id).await?.ok_or_else(|| {
            ReconcileError::ImportNotFound {
                id: id.to_string(),
            }
            .into()
        })
    }

    fn requires_replace(&self, previous: &Self::State, spec: &Self::Spec) -> bool {
        !previous
            .group_id()
            .same_target(&spec.group_id(), self.ctx.org_id(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REMOTE: &str = "name: cpu\ninterval: 1m\nrules:\n- alert: HighCPUUsage\n  expr: cpu_usage > 80\n  for: 5m\n";

    fn spec() -> AlertingRuleGroupSpec {
        RuleGroupSpec {
            org_id: None,
            namespace: String::from("infra"),
            name: String::from("cpu"),
            interval: Some(String::from("60s")),
            query_offset: None,
            source_tenants: vec![],
            limit: None,
            rule: vec![AlertingRule {
                alert: String::from("HighCPUUsage"),
                expr: String::from("cpu_usage > 80"),
                for_duration: Some(String::from("5m")),
                keep_firing_for: None,
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
            }],
        }
    }

    async fn mount_get(server: &MockServer, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path("/config/v1/rules/infra/cpu"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_posts_then_reads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/config/v1/rules/infra"))
            .and(body_string_contains("interval: 1m"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        mount_get(&server, 200, REMOTE).await;

        let controller = RuleGroupController::<AlertingRule>::new(context(&server));
        let state = controller.create(&spec()).await.expect("create");
        assert_eq!(controller.id(&state), "infra/cpu");
        assert_eq!(state.group.rules[0].name(), "HighCPUUsage");
    }

    #[tokio::test]
    async fn test_read_missing_clears_state() {
        let server = MockServer::start().await;
        mount_get(&server, 404, "group does not exist").await;

        let controller = RuleGroupController::<AlertingRule>::new(context(&server));
        let state = RuleGroupState {
            org_id: None,
            namespace: String::from("infra"),
            group: spec().to_wire(FormatOptions::default()).expect("wire"),
        };
        assert!(controller.read(&state).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_read_other_error_surfaces() {
        let server = MockServer::start().await;
        mount_get(&server, 500, "boom").await;

        let controller = RuleGroupController::<AlertingRule>::new(context(&server));
        let state = RuleGroupState {
            org_id: None,
            namespace: String::from("infra"),
            group: spec().to_wire(FormatOptions::default()).expect("wire"),
        };
        assert!(controller.read(&state).await.is_err());
    }

    #[tokio::test]
    async fn test_update_unchanged_skips_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;
        mount_get(&server, 200, REMOTE).await;

        let controller = RuleGroupController::<AlertingRule>::new(context(&server));
        let previous = RuleGroupState {
            org_id: None,
            namespace: String::from("infra"),
            group: spec().to_wire(FormatOptions::default()).expect("wire"),
        };
        controller.update(&previous, &spec()).await.expect("update");
    }

    #[tokio::test]
    async fn test_update_changed_posts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("cpu_usage > 90"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        mount_get(&server, 200, REMOTE).await;

        let controller = RuleGroupController::<AlertingRule>::new(context(&server));
        let previous = RuleGroupState {
            org_id: None,
            namespace: String::from("infra"),
            group: spec().to_wire(FormatOptions::default()).expect("wire"),
        };
        let mut desired = spec();
        desired.rule[0].expr = String::from("cpu_usage > 90");
        controller.update(&previous, &desired).await.expect("update");
    }

    #[tokio::test]
    async fn test_delete_surfaces_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let controller = RuleGroupController::<AlertingRule>::new(context(&server));
        let state = RuleGroupState {
            org_id: None,
            namespace: String::from("infra"),
            group: spec().to_wire(FormatOptions::default()).expect("wire"),
        };
        let err = controller.delete(&state).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_import() {
        let server = MockServer::start().await;
        mount_get(&server, 200, REMOTE).await;

        let controller = RuleGroupController::<AlertingRule>::new(context(&server));
        let state = controller.import("infra/cpu").await.expect("import");
        assert_eq!(state.group.name, "cpu");
        assert!(controller.import("infra").await.is_err());
    }

    #[tokio::test]
    async fn test_import_missing() {
        let server = MockServer::start().await;
        mount_get(&server, 404, "").await;

        let controller = RuleGroupController::<AlertingRule>::new(context(&server));
        let err = controller.import("infra/cpu").await.unwrap_err();
        assert!(err.to_string().contains("non-existent"));
    }

    #[test]
    fn test_identity_change_requires_replace() {
        let server_ctx = crate::resources::ProviderContext::new(
            crate::client::MimirClient::new(crate::client::ClientConfig::new("http://x", "t"))
                .expect("client"),
            FormatOptions::default(),
        );
        let controller = RuleGroupController::<AlertingRule>::new(server_ctx);
        let previous = RuleGroupState {
            org_id: None,
            namespace: String::from("infra"),
            group: spec().to_wire(FormatOptions::default()).expect("wire"),
        };

        assert!(!controller.requires_replace(&previous, &spec()));
        let mut moved = spec();
        moved.namespace = String::from("other");
        assert!(controller.requires_replace(&previous, &moved));
        let mut tenant = spec();
        tenant.org_id = Some(String::from("t2"));
        assert!(controller.requires_replace(&previous, &tenant));
    }

    #[test]
    fn test_explicit_default_org_keeps_identity() {
        let ctx = crate::resources::ProviderContext::new(
            crate::client::MimirClient::new(crate::client::ClientConfig::new("http://x", "t"))
                .expect("client"),
            FormatOptions::default(),
        );
        let controller = RuleGroupController::<AlertingRule>::new(ctx);
        let previous = RuleGroupState {
            org_id: None,
            namespace: String::from("infra"),
            group: spec().to_wire(FormatOptions::default()).expect("wire"),
        };

        let mut pinned = spec();
        pinned.org_id = Some(String::from("t"));
        assert!(!controller.requires_replace(&previous, &pinned));

        let recorded_pinned = RuleGroupState {
            org_id: Some(String::from("t")),
            ..previous
        };
        assert!(!controller.requires_replace(&recorded_pinned, &spec()));
    }

    #[test]
    fn test_recording_spec_rejects_for() {
        let yaml = "namespace: n\nname: g\nrule:\n- record: r\n  expr: up\n  for: 1m\n";
        assert!(serde_yaml::from_str::<RecordingRuleGroupSpec>(yaml).is_err());
    }

    #[test]
    fn test_spec_validation() {
        spec().validate("resources.mimir_rule_group_alerting.cpu").expect("valid");
        let mut bad = spec();
        bad.namespace = String::from("a/b");
        assert!(bad.validate("x").is_err());
    }
}
