//! Multi-group rules controller (`mimir_rules`).
//!
//! Manages a whole document of rule groups in one namespace as a single
//! resource. The ruler has no multi-group endpoint, so every operation is
//! decomposed into one request per group:
//!
//! - create POSTs each managed group and, if one fails, deletes the groups
//!   it already created before failing
//! - update deletes groups that left the managed set, then POSTs every
//!   group in the new set (POST is an upsert)
//! - read keeps only groups that still exist; none left means deleted
//! - delete removes every recorded group, collecting failures
//!
//! A 404 on a per-group delete counts as success here.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::identity::NamespaceId;
use super::{ProviderContext, ResourceController, ResourceKind};
use crate::error::{ConfigError, MimirError, ReconcileError, Result};
use crate::format::validate_namespace;
use crate::rules::{
    GroupFilter, RuleGroup, RuleGroups, RulesSummary, diff_managed, parse_rule_groups,
    select_managed, summarize, validate_rule_groups,
};

/// Desired state of a rules document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesSpec {
    /// Tenant override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Rule namespace.
    pub namespace: String,
    /// Inline YAML document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Path to a YAML document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_file: Option<PathBuf>,
    /// Manage only these groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub only_groups: Vec<String>,
    /// Manage every group except these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_groups: Vec<String>,
}

impl RulesSpec {
    /// Reads the document from `content` or `content_file`.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly one source is set, or if the file
    /// cannot be read.
    pub fn source(&self) -> Result<String> {
        match (&self.content, &self.content_file) {
            (Some(content), None) => Ok(content.clone()),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                ConfigError::validation(
                    format!("cannot read {}: {e}", path.display()),
                    "content_file",
                )
                .into()
            }),
            (Some(_), Some(_)) => Err(ConfigError::MutuallyExclusive {
                first: String::from("content"),
                second: String::from("content_file"),
            }
            .into()),
            (None, None) => Err(ConfigError::validation(
                "one of content or content_file must be set",
                "content",
            )
            .into()),
        }
    }

    /// Parses and validates the document.
    ///
    /// # Errors
    ///
    /// Returns the first parse or validation error.
    pub fn document(&self) -> Result<RuleGroups> {
        validate_namespace("namespace", &self.namespace)?;
        let doc = parse_rule_groups(&self.source()?)?;
        validate_rule_groups(&doc)?;
        Ok(doc)
    }

    /// Returns the filter built from `only_groups` and `ignore_groups`.
    ///
    /// # Errors
    ///
    /// Returns an error if both lists are set.
    pub fn filter(&self) -> std::result::Result<GroupFilter, ConfigError> {
        GroupFilter::from_lists(&self.only_groups, &self.ignore_groups)
    }

    /// Identity of the namespace this spec manages.
    #[must_use]
    pub fn namespace_id(&self) -> NamespaceId {
        NamespaceId {
            org_id: self.org_id.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Recorded state of a rules document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesState {
    /// Tenant override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Rule namespace.
    pub namespace: String,
    /// Computed fields over the groups that exist remotely.
    #[serde(flatten)]
    pub summary: RulesSummary,
}

impl RulesState {
    /// Identity of the recorded namespace.
    #[must_use]
    pub fn namespace_id(&self) -> NamespaceId {
        NamespaceId {
            org_id: self.org_id.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Controller for `mimir_rules`.
#[derive(Debug, Clone)]
pub struct RulesController {
    ctx: ProviderContext,
}

impl RulesController {
    /// Creates a controller.
    #[must_use]
    pub const fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    /// Returns the managed groups of a spec in the form they are sent.
    fn desired(&self, spec: &RulesSpec) -> Result<Vec<RuleGroup>> {
        let doc = spec.document()?;
        let managed = select_managed(&doc, &spec.filter()?);
        if managed.is_empty() {
            return Err(ConfigError::validation(
                "group filters select no rule groups from the document",
                "only_groups",
            )
            .into());
        }

        managed
            .into_iter()
            .map(|group| group.normalized(self.ctx.format))
            .collect()
    }

    fn state(id: &NamespaceId, groups: &[RuleGroup]) -> Result<RulesState> {
        let refs: Vec<&RuleGroup> = groups.iter().collect();
        Ok(RulesState {
            org_id: id.org_id.clone(),
            namespace: id.namespace.clone(),
            summary: summarize(&refs)?,
        })
    }

    /// Deletes one group, treating an already missing group as deleted.
    async fn delete_group(&self, id: &NamespaceId, name: &str) -> Result<()> {
        match self
            .ctx
            .client
            .delete_rule_group(id.org_id.as_deref(), &id.namespace, name)
            .await
        {
            Err(e) if e.is_not_found() => {
                debug!("Rule group {id}/{name} already absent");
                Ok(())
            }
            other => other,
        }
    }

    async fn post_all(&self, id: &NamespaceId, groups: &[RuleGroup], rollback: bool) -> Result<()> {
        let mut written: Vec<&str> = Vec::new();

        for group in groups {
            if let Err(e) = self
                .ctx
                .client
                .create_rule_group(id.org_id.as_deref(), &id.namespace, group)
                .await
            {
                if rollback {
                    self.rollback(id, &written).await;
                }
                return Err(e);
            }
            written.push(&group.name);
        }
        Ok(())
    }

    async fn rollback(&self, id: &NamespaceId, created: &[&str]) {
        if created.is_empty() {
            return;
        }
        warn!("Rolling back {} rule group(s) created in {id}", created.len());
        for name in created {
            if let Err(e) = self.delete_group(id, name).await {
                warn!("Rollback of rule group {id}/{name} failed: {e}");
            }
        }
    }

    async fn existing(&self, id: &NamespaceId, names: &[String]) -> Result<Vec<RuleGroup>> {
        let mut groups = Vec::new();
        for name in names {
            match self
                .ctx
                .client
                .get_rule_group(id.org_id.as_deref(), &id.namespace, name)
                .await
            {
                Ok(group) => groups.push(self.normalize_remote(group)),
                Err(e) if e.is_not_found() => {
                    info!("Rule group {id}/{name} no longer exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(groups)
    }

    fn normalize_remote(&self, group: RuleGroup) -> RuleGroup {
        match group.normalized(self.ctx.format) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("Keeping rule group {} as returned, normalization failed: {e}", group.name);
                group
            }
        }
    }

    async fn read_back(&self, id: &NamespaceId, names: &[String]) -> Result<RulesState> {
        self.ctx.settle().await;
        let groups = self.existing(id, names).await?;
        if groups.is_empty() {
            return Err(ReconcileError::ResourceReconcileFailed {
                resource_type: ResourceKind::Rules.to_string(),
                name: id.to_string(),
                reason: String::from("no rule groups found after write"),
            }
            .into());
        }
        Self::state(id, &groups)
    }
}

#[async_trait]
impl ResourceController for RulesController {
    type Spec = RulesSpec;
    type State = RulesState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Rules
    }

    fn id(&self, state: &Self::State) -> String {
        state.namespace_id().to_string()
    }

    async fn create(&self, spec: &Self::Spec) -> Result<Self::State> {
        let id = spec.namespace_id();
        let groups = self.desired(spec)?;
        info!("Creating {} rule group(s) in {id}", groups.len());

        self.post_all(&id, &groups, true).await?;

        let names: Vec<String> = groups.iter().map(|g| g.name.clone()).collect();
        self.read_back(&id, &names).await
    }

    async fn read(&self, state: &Self::State) -> Result<Option<Self::State>> {
        let id = state.namespace_id();
        let groups = self.existing(&id, &state.summary.managed_groups).await?;
        if groups.is_empty() {
            info!("No managed rule groups left in {id}");
            return Ok(None);
        }
        Self::state(&id, &groups).map(Some)
    }

    async fn update(&self, previous: &Self::State, spec: &Self::Spec) -> Result<Self::State> {
        let id = spec.namespace_id();
        let groups = self.desired(spec)?;
        let names: Vec<String> = groups.iter().map(|g| g.name.clone()).collect();
        let diff = diff_managed(&previous.summary.managed_groups, &names);

        info!(
            "Updating {id}: {} group(s) to remove, {} to write",
            diff.to_delete.len(),
            diff.to_upsert.len()
        );

        for name in &diff.to_delete {
            self.delete_group(&id, name).await?;
        }
        self.post_all(&id, &groups, false).await?;

        self.read_back(&id, &names).await
    }

    async fn delete(&self, state: &Self::State) -> Result<()> {
        let id = state.namespace_id();
        info!("Deleting {} rule group(s) in {id}", state.summary.managed_groups.len());

        let mut failures = Vec::new();
        for name in &state.summary.managed_groups {
            if let Err(e) = self.delete_group(&id, name).await {
                failures.push(format!("{name}: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MimirError::from(ReconcileError::PartialFailure {
                operation: String::from("delete"),
                namespace: id.to_string(),
                failures,
            }))
        }
    }

    async fn import(&self, id: &str) -> Result<Self::State> {
        let namespace_id = NamespaceId::parse(self.kind(), id)?;
        let groups = self
            .ctx
            .client
            .list_rule_groups(namespace_id.org_id.as_deref(), &namespace_id.namespace)
            .await?;
        if groups.is_empty() {
            return Err(ReconcileError::ImportNotFound {
                id: id.to_string(),
            }
            .into());
        }

        let groups: Vec<RuleGroup> = groups.into_iter().map(|g| self.normalize_remote(g)).collect();
        Self::state(&namespace_id, &groups)
    }

    fn requires_replace(&self, previous: &Self::State, spec: &Self::Spec) -> bool {
        !previous
            .namespace_id()
            .same_target(&spec.namespace_id(), self.ctx.org_id(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::context;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC: &str = r"
groups:
  - name: A
    rules:
      - alert: HighCPUUsage
        expr: cpu_usage > 80
        for: 5m
  - name: B
    rules:
      - record: instance:cpu:rate5m
        expr: rate(cpu_seconds_total[5m])
  - name: C
    rules:
      - alert: Down
        expr: up == 0
";

    fn group_body(name: &str) -> String {
        match name {
            "A" => String::from("name: A\nrules:\n- alert: HighCPUUsage\n  expr: cpu_usage > 80\n  for: 5m\n"),
            "B" => String::from("name: B\nrules:\n- record: instance:cpu:rate5m\n  expr: rate(cpu_seconds_total[5m])\n"),
            _ => String::from("name: C\nrules:\n- alert: Down\n  expr: up == 0\n"),
        }
    }

    fn spec() -> RulesSpec {
        RulesSpec {
            namespace: String::from("infra"),
            content: Some(DOC.to_string()),
            ..RulesSpec::default()
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    async fn mount_get(server: &MockServer, name: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/config/v1/rules/infra/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(group_body(name)))
            .mount(server)
            .await;
    }

    async fn mount_post(server: &MockServer, name: &str, status: u16, times: u64) {
        Mock::given(method("POST"))
            .and(path("/config/v1/rules/infra"))
            .and(body_string_contains(format!("name: {name}\n")))
            .respond_with(ResponseTemplate::new(status))
            .expect(times)
            .mount(server)
            .await;
    }

    fn previous(managed: &[&str]) -> RulesState {
        RulesState {
            org_id: None,
            namespace: String::from("infra"),
            summary: RulesSummary {
                managed_groups: strings(managed),
                ..RulesSummary::default()
            },
        }
    }

    #[tokio::test]
    async fn test_create_posts_each_group() {
        let server = MockServer::start().await;
        for name in ["A", "B", "C"] {
            mount_post(&server, name, 202, 1).await;
            mount_get(&server, name).await;
        }

        let controller = RulesController::new(context(&server));
        let state = controller.create(&spec()).await.expect("create");
        assert_eq!(state.summary.managed_groups, strings(&["A", "B", "C"]));
        assert_eq!(state.summary.groups_count, 3);
        assert_eq!(state.summary.total_rules, 3);
        assert_eq!(controller.id(&state), "infra");
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_failure() {
        let server = MockServer::start().await;
        mount_post(&server, "A", 202, 1).await;
        mount_post(&server, "B", 500, 1).await;
        mount_post(&server, "C", 202, 0).await;
        Mock::given(method("DELETE"))
            .and(path("/config/v1/rules/infra/A"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let controller = RulesController::new(context(&server));
        let err = controller.create(&spec()).await.unwrap_err();
        assert!(err.to_string().contains("response code '500'"));
    }

    #[tokio::test]
    async fn test_only_groups_filters_writes() {
        let server = MockServer::start().await;
        mount_post(&server, "A", 202, 1).await;
        mount_post(&server, "B", 202, 0).await;
        mount_post(&server, "C", 202, 0).await;
        mount_get(&server, "A").await;

        let mut only = spec();
        only.only_groups = strings(&["A"]);
        let controller = RulesController::new(context(&server));
        let state = controller.create(&only).await.expect("create");
        assert_eq!(state.summary.managed_groups, strings(&["A"]));
    }

    #[tokio::test]
    async fn test_update_deletes_dropped_groups() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/config/v1/rules/infra/A"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/config/v1/rules/infra/B"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;
        mount_post(&server, "B", 202, 1).await;
        mount_post(&server, "C", 202, 1).await;
        mount_get(&server, "B").await;
        mount_get(&server, "C").await;

        let mut desired = spec();
        desired.only_groups = strings(&["B", "C"]);
        let controller = RulesController::new(context(&server));
        let state = controller
            .update(&previous(&["A", "B"]), &desired)
            .await
            .expect("update");
        assert_eq!(state.summary.managed_groups, strings(&["B", "C"]));
    }

    #[tokio::test]
    async fn test_read_drops_missing_groups() {
        let server = MockServer::start().await;
        mount_get(&server, "A").await;
        Mock::given(method("GET"))
            .and(path("/config/v1/rules/infra/B"))
            .respond_with(ResponseTemplate::new(404).set_body_string("group does not exist"))
            .mount(&server)
            .await;

        let controller = RulesController::new(context(&server));
        let state = controller
            .read(&previous(&["A", "B"]))
            .await
            .expect("read")
            .expect("still present");
        assert_eq!(state.summary.managed_groups, strings(&["A"]));
        assert_eq!(state.summary.rule_names, strings(&["HighCPUUsage"]));
    }

    #[tokio::test]
    async fn test_read_all_missing_is_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let controller = RulesController::new(context(&server));
        assert!(controller.read(&previous(&["A"])).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_delete_tolerates_not_found_and_collects_failures() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/config/v1/rules/infra/A"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/config/v1/rules/infra/B"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/config/v1/rules/infra/C"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let controller = RulesController::new(context(&server));
        let err = controller
            .delete(&previous(&["A", "B", "C"]))
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("2 rule group(s)"));
        assert!(text.contains("B: "));
        assert!(text.contains("C: "));
    }

    #[tokio::test]
    async fn test_import_lists_namespace() {
        let server = MockServer::start().await;
        let body = format!(
            "infra:\n- {}\n- {}",
            group_body("A").replace('\n', "\n  ").trim_end(),
            group_body("C").replace('\n', "\n  ").trim_end()
        );
        Mock::given(method("GET"))
            .and(path("/config/v1/rules/infra"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let controller = RulesController::new(context(&server));
        let state = controller.import("infra").await.expect("import");
        assert_eq!(state.summary.managed_groups, strings(&["A", "C"]));
    }

    #[test]
    fn test_source_requires_exactly_one() {
        let mut both = spec();
        both.content_file = Some(PathBuf::from("rules.yaml"));
        assert!(both.source().is_err());

        let mut neither = spec();
        neither.content = None;
        assert!(neither.source().is_err());
    }

    #[test]
    fn test_content_file_source() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("rules.yaml");
        std::fs::write(&file, DOC).expect("write");

        let from_file = RulesSpec {
            namespace: String::from("infra"),
            content_file: Some(file),
            ..RulesSpec::default()
        };
        assert_eq!(from_file.document().expect("document").groups.len(), 3);
    }

    #[tokio::test]
    async fn test_replace_compares_resolved_org() {
        let server = MockServer::start().await;
        let controller = RulesController::new(context(&server));

        let mut pinned = spec();
        pinned.org_id = Some(String::from("tenant-1"));
        assert!(!controller.requires_replace(&previous(&["A"]), &pinned));

        pinned.org_id = Some(String::from("tenant-2"));
        assert!(controller.requires_replace(&previous(&["A"]), &pinned));

        let mut moved = spec();
        moved.namespace = String::from("apps");
        assert!(controller.requires_replace(&previous(&["A"]), &moved));
    }

    #[test]
    fn test_state_flattens_summary() {
        let json = serde_json::to_value(previous(&["A"])).expect("serialize");
        assert_eq!(json["managed_groups"][0], "A");
        assert_eq!(json["namespace"], "infra");
    }
}
