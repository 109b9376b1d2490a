//! Planning: diff desired resources against state, order the work, and
//! execute it through the provisioner.

mod diff;
mod executor;
mod plan;

pub use diff::{DiffEngine, DiffResult, DiffType, ResourceDiff};
pub use executor::{ActionResult, ExecutionResult, PlanExecutor};
pub use plan::{ActionType, Plan, PlannedAction};
