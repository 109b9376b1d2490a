//! Plan executor.
//!
//! Runs actions in order, one at a time, recording each success in state
//! as it happens so a failed apply leaves state matching what was done.

use std::collections::HashSet;

use tracing::{error, info, warn};

use crate::error::{MimirError, ReconcileError, Result};
use crate::resources::Provisioner;
use crate::state::{HistoryEntry, Operation, ProviderState, ResourceState};

use super::plan::{ActionType, Plan, PlannedAction};

/// Executor for plans.
#[derive(Debug)]
pub struct PlanExecutor<'a> {
    provisioner: &'a Provisioner,
    /// Keep going after a failed action.
    continue_on_error: bool,
    /// Operation recorded in history.
    operation: Operation,
}

/// Result of executing a single action.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Action that was executed.
    pub action: PlannedAction,
    /// Whether the action succeeded.
    pub success: bool,
    /// Skipped because a dependency failed.
    pub skipped: bool,
    /// Remote identity after the action, if any.
    pub id: Option<String>,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug, Default)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions.
    pub skipped: usize,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(provisioner: &'a Provisioner) -> Self {
        Self {
            provisioner,
            continue_on_error: false,
            operation: Operation::Apply,
        }
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Sets the operation recorded in history.
    #[must_use]
    pub const fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Executes a plan, updating `state` after every successful action.
    ///
    /// Failures are reported in the result, not as an error.
    pub async fn execute(&self, plan: &Plan, state: &mut ProviderState) -> ExecutionResult {
        info!("Executing plan with {} actions", plan.actions.len());

        if plan.actions.is_empty() {
            return ExecutionResult::default();
        }

        let mut results = Vec::new();
        let mut failed_indices: HashSet<usize> = HashSet::new();

        for (idx, action) in plan.actions.iter().enumerate() {
            if action.dependencies.iter().any(|dep| failed_indices.contains(dep)) {
                warn!("Skipping {} due to failed dependency", action.address);
                results.push(ActionResult {
                    index: idx,
                    action: action.clone(),
                    success: false,
                    skipped: true,
                    id: None,
                    error: Some(String::from("Skipped due to dependency failure")),
                });
                failed_indices.insert(idx);
                continue;
            }

            info!("{}", action.description());
            let result = match self.execute_action(action, state).await {
                Ok(id) => ActionResult {
                    index: idx,
                    action: action.clone(),
                    success: true,
                    skipped: false,
                    id,
                    error: None,
                },
                Err(e) => {
                    error!("{} failed: {e}", action.description());
                    failed_indices.insert(idx);
                    ActionResult {
                        index: idx,
                        action: action.clone(),
                        success: false,
                        skipped: false,
                        id: None,
                        error: Some(e.to_string()),
                    }
                }
            };

            let stop = !result.success && !self.continue_on_error;
            results.push(result);
            if stop {
                break;
            }
        }

        let execution = ExecutionResult {
            successful: results.iter().filter(|r| r.success).count(),
            failed: results.iter().filter(|r| !r.success && !r.skipped).count(),
            skipped: results.iter().filter(|r| r.skipped).count(),
            results,
        };

        let addresses = plan.actions.iter().map(|a| a.address.clone()).collect();
        let entry = if execution.failed == 0 {
            HistoryEntry::new(self.operation, addresses)
        } else {
            HistoryEntry::failed(
                self.operation,
                addresses,
                &format!("{} action(s) failed", execution.failed),
            )
        };
        state.add_history(entry);

        execution
    }

    async fn execute_action(
        &self,
        action: &PlannedAction,
        state: &mut ProviderState,
    ) -> Result<Option<String>> {
        match action.action_type {
            ActionType::Create => {
                let resource = action.resource.as_ref().ok_or_else(|| missing_spec(action))?;
                let applied = self.provisioner.create(resource).await?;
                state.set(ResourceState::new(
                    &action.address,
                    action.kind,
                    &applied.id,
                    action.new_hash.clone().unwrap_or_default(),
                    applied.attributes,
                ));
                Ok(Some(applied.id))
            }
            ActionType::Update => {
                let resource = action.resource.as_ref().ok_or_else(|| missing_spec(action))?;
                let recorded = state
                    .get(&action.address)
                    .ok_or_else(|| missing_state(action))?;
                let applied = self.provisioner.update(&recorded.attributes, resource).await?;
                state.set(ResourceState::new(
                    &action.address,
                    action.kind,
                    &applied.id,
                    action.new_hash.clone().unwrap_or_default(),
                    applied.attributes,
                ));
                Ok(Some(applied.id))
            }
            ActionType::Delete => {
                let Some(recorded) = state.get(&action.address) else {
                    warn!("{} is not in state, nothing to delete", action.address);
                    return Ok(None);
                };
                self.provisioner
                    .delete(recorded.kind, &recorded.attributes)
                    .await?;
                let removed = state.remove(&action.address);
                Ok(removed.map(|r| r.id))
            }
        }
    }
}

fn missing_spec(action: &PlannedAction) -> MimirError {
    MimirError::internal(format!("no desired spec for {}", action.address))
}

fn missing_state(action: &PlannedAction) -> MimirError {
    ReconcileError::ResourceReconcileFailed {
        resource_type: action.kind.to_string(),
        name: action.address.clone(),
        reason: String::from("not recorded in state"),
    }
    .into()
}

impl ExecutionResult {
    /// Returns true if every action succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Total actions attempted or skipped.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.results.len()
    }

    /// Errors of the failed actions, as `address: message`.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.action.address,
                    r.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect()
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.total(),
            self.successful,
            self.failed,
            self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resources;
    use crate::planner::{DiffEngine, Plan};
    use crate::resources::{ResourceKind, testing};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GROUP: &str = "name: cpu\nrules:\n- record: instance:cpu:rate5m\n  expr: rate(cpu_seconds_total[5m])\n";

    fn resources() -> Resources {
        serde_yaml::from_str(
            r"
mimir_rule_group_recording:
  cpu:
    namespace: infra
    name: cpu
    rule:
      - record: instance:cpu:rate5m
        expr: rate(cpu_seconds_total[5m])
",
        )
        .expect("resources")
    }

    #[tokio::test]
    async fn test_create_records_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/config/v1/rules/infra"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/config/v1/rules/infra/cpu"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GROUP))
            .mount(&server)
            .await;

        let provisioner = Provisioner::new(&testing::context(&server));
        let desired = resources().desired();
        let mut state = ProviderState::new();
        let diff = DiffEngine::new(&provisioner)
            .compute_diff(&desired, &state)
            .expect("diff");
        let plan = Plan::from_diff(&diff, &desired);

        let result = PlanExecutor::new(&provisioner).execute(&plan, &mut state).await;
        assert!(result.all_successful(), "{:?}", result.failures());

        let recorded = state.get("mimir_rule_group_recording.cpu").expect("recorded");
        assert_eq!(recorded.kind, ResourceKind::RecordingRuleGroup);
        assert_eq!(recorded.id, "infra/cpu");
        assert_eq!(recorded.spec_hash, desired[0].1.spec_hash().expect("hash"));
        assert_eq!(state.history.len(), 1);
        assert!(state.history[0].success);
    }

    #[tokio::test]
    async fn test_failure_stops_and_skips_dependents() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provisioner = Provisioner::new(&testing::context(&server));
        let mut state = ProviderState::new();
        for label in ["a", "b"] {
            state.set(ResourceState::new(
                format!("mimir_rule_group_recording.{label}"),
                ResourceKind::RecordingRuleGroup,
                format!("infra/{label}"),
                "h",
                serde_json::json!({
                    "namespace": "infra",
                    "group": {"name": label, "rules": [{"record": "x", "expr": "up"}]}
                }),
            ));
        }
        let plan = Plan::destroy(
            state
                .resources
                .values()
                .map(|r| (r.address.as_str(), r.kind))
                .collect::<Vec<_>>(),
        );

        let result = PlanExecutor::new(&provisioner).execute(&plan, &mut state).await;
        assert_eq!(result.failed, 1);
        assert_eq!(result.total(), 1);
        assert_eq!(state.len(), 2);
        assert!(!state.history[0].success);

        let result = PlanExecutor::new(&provisioner)
            .with_continue_on_error(true)
            .execute(&plan, &mut state)
            .await;
        assert_eq!(result.failed, 2);
        assert!(result.failures()[0].contains("response code '500'"));
    }
}
