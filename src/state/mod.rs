//! Persistent state.
//!
//! Records which remote objects each manifest address manages, the hash
//! of the spec that produced them, and a short operation history.

mod local;
mod lock;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use store::StateStore;
pub use types::{HistoryEntry, MAX_HISTORY, Operation, ProviderState, ResourceState, STATE_VERSION};
