//! Reconciler for maintaining desired state.
//!
//! Ties the pieces together: refresh what state records against the
//! remote APIs, diff it with the manifest, and execute the plan under
//! the state lock. No step is retried; a failed action is reported and
//! the rest of the run decides whether to continue.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResourceAddress;
use crate::error::{MimirError, Result, StateError};
use crate::planner::{DiffEngine, DiffResult, DiffType, ExecutionResult, Plan, PlanExecutor};
use crate::resources::{DesiredResource, Provisioner};
use crate::state::{HistoryEntry, LockInfo, Operation, ProviderState, ResourceState, StateStore};

/// Reconciler for one manifest and one state store.
pub struct Reconciler<'a, S: StateStore> {
    desired: Vec<(ResourceAddress, DesiredResource)>,
    state_store: &'a S,
    provisioner: &'a Provisioner,
    continue_on_error: bool,
}

/// Outcome of re-reading recorded resources.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct RefreshReport {
    /// Addresses whose remote object no longer exists; dropped from state.
    pub vanished: Vec<String>,
    /// Addresses whose remote copy differs from the recorded attributes.
    pub drifted: Vec<String>,
    /// Number of resources that matched.
    pub unchanged: usize,
}

/// Result of an apply or destroy run.
#[derive(Debug, Serialize)]
pub struct ReconciliationResult {
    /// Whether every action succeeded.
    pub success: bool,
    /// Resources created.
    pub created: usize,
    /// Resources updated.
    pub updated: usize,
    /// Resources replaced.
    pub replaced: usize,
    /// Resources deleted.
    pub deleted: usize,
    /// Resources unchanged.
    pub unchanged: usize,
    /// What the refresh found.
    pub refresh: RefreshReport,
    /// Errors encountered, as `address: message`.
    pub errors: Vec<String>,
}

/// A plan together with the refreshed state it was computed from.
#[derive(Debug)]
pub struct PlannedRun {
    /// Refreshed state.
    pub state: ProviderState,
    /// What the refresh found.
    pub refresh: RefreshReport,
    /// Per-resource differences.
    pub diff: DiffResult,
    /// Ordered actions.
    pub plan: Plan,
}

impl<'a, S: StateStore> Reconciler<'a, S> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(
        desired: Vec<(ResourceAddress, DesiredResource)>,
        state_store: &'a S,
        provisioner: &'a Provisioner,
    ) -> Self {
        Self {
            desired,
            state_store,
            provisioner,
            continue_on_error: false,
        }
    }

    /// Sets whether apply keeps going after a failed action.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Re-reads every recorded resource into `state`.
    ///
    /// Vanished objects are removed. Objects whose attributes changed get
    /// the new attributes and an empty spec hash, so the next plan
    /// converges them.
    ///
    /// # Errors
    ///
    /// Returns the first read error other than absence.
    pub async fn refresh(&self, state: &mut ProviderState) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        let recorded: Vec<ResourceState> = state.resources.values().cloned().collect();

        for resource in recorded {
            debug!("Refreshing {}", resource.address);
            match self
                .provisioner
                .read(resource.kind, &resource.attributes)
                .await?
            {
                None => {
                    warn!(
                        "{} ({}) no longer exists remotely, removing from state",
                        resource.address, resource.id
                    );
                    state.remove(&resource.address);
                    report.vanished.push(resource.address);
                }
                Some(current) if current.attributes != resource.attributes => {
                    info!("{} has drifted", resource.address);
                    let mut updated = resource.clone();
                    updated.id = current.id;
                    updated.attributes = current.attributes;
                    updated.spec_hash.clear();
                    updated.updated_at = chrono::Utc::now();
                    state.set(updated);
                    report.drifted.push(resource.address);
                }
                Some(_) => report.unchanged += 1,
            }
        }

        Ok(report)
    }

    /// Loads state, refreshes it in memory and computes the plan.
    ///
    /// Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded, a read fails or the
    /// diff cannot be computed.
    pub async fn plan(&self) -> Result<PlannedRun> {
        let mut state = self.state_store.load_or_default().await?;
        let refresh = self.refresh(&mut state).await?;
        let diff = DiffEngine::new(self.provisioner).compute_diff(&self.desired, &state)?;
        let plan = Plan::from_diff(&diff, &self.desired);

        info!(
            "Plan: {} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            diff.creates(),
            diff.updates(),
            diff.replaces(),
            diff.deletes(),
            diff.unchanged()
        );

        Ok(PlannedRun {
            state,
            refresh,
            diff,
            plan,
        })
    }

    /// Refreshes, plans and applies under the state lock.
    ///
    /// State is saved even when some actions fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, planning fails or
    /// state cannot be saved. Action failures are reported in the result.
    pub async fn apply(&self) -> Result<ReconciliationResult> {
        let lock = self.state_store.acquire_lock("").await?;
        let result = self.apply_locked().await;
        self.release(&lock).await;
        result
    }

    async fn apply_locked(&self) -> Result<ReconciliationResult> {
        let PlannedRun {
            mut state,
            refresh,
            diff,
            plan,
        } = self.plan().await?;

        if plan.is_empty() {
            info!("No changes required - state is converged");
        }

        let execution = PlanExecutor::new(self.provisioner)
            .with_continue_on_error(self.continue_on_error)
            .execute(&plan, &mut state)
            .await;

        if !plan.is_empty() || !refresh.vanished.is_empty() || !refresh.drifted.is_empty() {
            self.state_store.save(&state).await?;
        }

        Ok(summarize(&diff, refresh, &execution))
    }

    /// Refreshes state and saves it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, a read fails or
    /// state cannot be saved.
    pub async fn refresh_state(&self) -> Result<RefreshReport> {
        let lock = self.state_store.acquire_lock("").await?;
        let result = async {
            let mut state = self.state_store.load_or_default().await?;
            let report = self.refresh(&mut state).await?;
            let mut touched = report.vanished.clone();
            touched.extend(report.drifted.iter().cloned());
            state.add_history(HistoryEntry::new(Operation::Refresh, touched));
            self.state_store.save(&state).await?;
            Ok::<_, MimirError>(report)
        }
        .await;
        self.release(&lock).await;
        result
    }

    /// Refreshes in memory and reports differences without writing.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        let run = self.plan().await?;

        let pending = run
            .diff
            .actionable_diffs()
            .into_iter()
            .filter(|d| d.diff_type != DiffType::Drift)
            .map(ToString::to_string)
            .collect();

        Ok(DriftReport {
            has_drift: !run.refresh.drifted.is_empty() || !run.refresh.vanished.is_empty(),
            drifted_resources: run.refresh.drifted,
            vanished_resources: run.refresh.vanished,
            pending_changes: pending,
            total_resources: self.desired.len(),
        })
    }

    /// Deletes every recorded resource under the state lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or state cannot be
    /// loaded or saved.
    pub async fn destroy(&self) -> Result<ReconciliationResult> {
        let lock = self.state_store.acquire_lock("").await?;
        let result = async {
            let mut state = self.state_store.load_or_default().await?;
            let plan = Plan::destroy(
                state
                    .resources
                    .values()
                    .map(|r| (r.address.as_str(), r.kind))
                    .collect::<Vec<_>>(),
            );
            let execution = PlanExecutor::new(self.provisioner)
                .with_continue_on_error(true)
                .with_operation(Operation::Destroy)
                .execute(&plan, &mut state)
                .await;
            self.state_store.save(&state).await?;

            Ok::<_, MimirError>(ReconciliationResult {
                success: execution.all_successful(),
                created: 0,
                updated: 0,
                replaced: 0,
                deleted: execution.successful,
                unchanged: 0,
                refresh: RefreshReport::default(),
                errors: execution.failures(),
            })
        }
        .await;
        self.release(&lock).await;
        result
    }

    /// Adopts an existing remote object under `address`.
    ///
    /// The recorded spec hash is left empty so the next plan converges
    /// the object to the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is already managed, the id is
    /// malformed or nothing exists remotely.
    pub async fn import(&self, address: &ResourceAddress, id: &str) -> Result<ResourceState> {
        let lock = self.state_store.acquire_lock("").await?;
        let result = async {
            let mut state = self.state_store.load_or_default().await?;
            let key = address.to_string();
            if state.get(&key).is_some() {
                return Err(MimirError::State(StateError::AddressInUse { address: key }));
            }

            let applied = self.provisioner.import(address.kind, id).await?;
            let resource =
                ResourceState::new(&key, address.kind, &applied.id, "", applied.attributes);
            state.set(resource.clone());
            state.add_history(HistoryEntry::new(Operation::Import, vec![key.clone()]));
            self.state_store.save(&state).await?;
            info!("Imported {} as {key}", applied.id);
            Ok::<_, MimirError>(resource)
        }
        .await;
        self.release(&lock).await;
        result
    }

    /// Forgets a recorded resource without touching the remote object.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not recorded.
    pub async fn forget(&self, address: &str) -> Result<ResourceState> {
        let lock = self.state_store.acquire_lock("").await?;
        let result = async {
            let mut state = self.state_store.load_or_default().await?;
            let removed = state.remove(address).ok_or_else(|| StateError::UnknownAddress {
                address: address.to_string(),
            })?;
            state.add_history(HistoryEntry::new(Operation::Remove, vec![address.to_string()]));
            self.state_store.save(&state).await?;
            Ok::<_, MimirError>(removed)
        }
        .await;
        self.release(&lock).await;
        result
    }

    async fn release(&self, lock: &LockInfo) {
        if let Err(e) = self.state_store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock {}: {e}", lock.lock_id);
        }
    }
}

fn summarize(
    diff: &DiffResult,
    refresh: RefreshReport,
    execution: &ExecutionResult,
) -> ReconciliationResult {
    ReconciliationResult {
        success: execution.all_successful(),
        created: diff.creates(),
        updated: diff.updates(),
        replaced: diff.replaces(),
        deleted: diff.deletes(),
        unchanged: diff.unchanged(),
        refresh,
        errors: execution.failures(),
    }
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Resources whose remote copy changed.
    pub drifted_resources: Vec<String>,
    /// Resources whose remote object disappeared.
    pub vanished_resources: Vec<String>,
    /// Other planned changes.
    pub pending_changes: Vec<String>,
    /// Number of declared resources.
    pub total_resources: usize,
}

impl DriftReport {
    /// Returns true if nothing drifted and nothing is pending.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        !self.has_drift && self.pending_changes.is_empty()
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_converged() {
            return write!(f, "No drift detected - state is converged");
        }
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for resource in &self.drifted_resources {
                writeln!(f, "  ~ {resource}")?;
            }
            for resource in &self.vanished_resources {
                writeln!(f, "  - {resource} (deleted outside mimirform)")?;
            }
        }
        if !self.pending_changes.is_empty() {
            writeln!(f, "Pending changes:")?;
            for change in &self.pending_changes {
                writeln!(f, "  {change}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Replaced: {}", self.replaced)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}
