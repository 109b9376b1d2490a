//! Local file-based state storage.
//!
//! State is a pretty-printed JSON file. Every write goes through a
//! temporary sibling and a rename, and the previous state is kept as
//! `<name>.backup`. The lock is a sibling `state.lock` file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{MimirError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::StateStore;
use super::types::ProviderState;

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// State store backed by a JSON file next to the manifest.
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    state_path: PathBuf,
    backup_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store for the given state file path.
    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let dir = state_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let mut backup = state_path.clone().into_os_string();
        backup.push(".backup");

        Self {
            backup_path: PathBuf::from(backup),
            lock_path: dir.join(LOCK_FILE),
            state_path,
        }
    }

    /// Path to the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Path to the copy of the previous state.
    #[must_use]
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    async fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Option<T>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateError::Corrupted {
                    message: format!("Failed to read {what} {}: {e}", path.display()),
                }
                .into());
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            MimirError::State(StateError::Corrupted {
                message: format!("Failed to parse {what} {}: {e}", path.display()),
            })
        })
    }

    /// Writes `value` to `path` through a temporary file.
    async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(|e| {
                StateError::write(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }

        let content = serde_json::to_vec_pretty(value)
            .map_err(|e| StateError::serialization(e.to_string()))?;
        let temp_path = path.with_extension("tmp");
        let failed = |step: &str, e: std::io::Error| {
            StateError::write(format!("Failed to {step} {}: {e}", temp_path.display()))
        };

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| failed("create", e))?;
        file.write_all(&content).await.map_err(|e| failed("write", e))?;
        file.sync_all().await.map_err(|e| failed("sync", e))?;

        fs::rename(&temp_path, path).await.map_err(|e| {
            StateError::write(format!("Failed to move state into {}: {e}", path.display()))
        })?;
        Ok(())
    }

    async fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(StateError::write(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))
            .into()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<ProviderState>> {
        debug!("Loading state from: {}", self.state_path.display());
        Self::read_json(&self.state_path, "state file").await
    }

    async fn save(&self, state: &ProviderState) -> Result<()> {
        if self.state_path.exists() {
            if let Err(e) = fs::copy(&self.state_path, &self.backup_path).await {
                warn!("Could not back up previous state: {e}");
            }
        }

        info!("Saving state to: {}", self.state_path.display());
        Self::write_json(&self.state_path, state).await
    }

    async fn delete(&self) -> Result<()> {
        info!("Deleting state file: {}", self.state_path.display());
        Self::remove(&self.state_path).await?;
        Self::remove(&self.lock_path).await
    }

    async fn exists(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.state_path).await?)
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.get_lock_info().await? {
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            warn!("Taking over expired lock held by {}", existing.holder);
        }

        let holder = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };
        let lock = LockInfo::new(&holder);
        Self::write_json(&self.lock_path, &lock).await.map_err(|e| {
            MimirError::State(StateError::LockFailed {
                message: e.to_string(),
            })
        })?;

        debug!("Acquired state lock {} for {LOCK_EXPIRY_SECS}s", lock.lock_id);
        Ok(lock)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        match self.get_lock_info().await? {
            Some(existing) if existing.lock_id != lock_id => Err(StateError::LockFailed {
                message: format!("lock {lock_id} is not held; current lock is {existing}"),
            }
            .into()),
            Some(_) => {
                debug!("Released state lock: {lock_id}");
                Self::remove(&self.lock_path).await
            }
            None => Ok(()),
        }
    }

    async fn force_unlock(&self) -> Result<()> {
        if let Some(existing) = self.get_lock_info().await? {
            warn!("Force-removing state lock held by {}", existing.holder);
        }
        Self::remove(&self.lock_path).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        Self::read_json(&self.lock_path, "lock file").await
    }

    async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .get_lock_info()
            .await?
            .is_some_and(|lock| !lock.is_expired()))
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
