//! Local file-based run state.
//!
//! The run lock and the run history live in a `.tenant-sync` directory next
//! to the tenant file.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, StateError, SyncError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::types::{RunHistory, RunRecord};

/// Default state directory name.
pub const STATE_DIR: &str = ".tenant-sync";

/// History file name.
const HISTORY_FILE: &str = "history.json";

/// Lock file name.
const LOCK_FILE: &str = "run.lock";

/// Local file-based run state store.
#[derive(Debug, Clone)]
pub struct LocalRunStore {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Path to the history file.
    history_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
}

impl LocalRunStore {
    /// Creates a store in the state directory next to a tenant file.
    #[must_use]
    pub fn for_config(config_path: &Path) -> Self {
        let parent = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::with_base_dir(parent.join(STATE_DIR))
    }

    /// Creates a store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let history_path = base_dir.join(HISTORY_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            history_path,
            lock_path,
        }
    }

    /// Returns the state directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Acquires the run lock.
    ///
    /// An expired lock is taken over. An empty `holder` generates one.
    ///
    /// # Errors
    ///
    /// Returns `LockedByOther` if a live lock is held, or an error if the
    /// lock file cannot be written.
    pub async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(SyncError::State(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            warn!("Expired lock held by {} found, taking over", existing.holder);
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id, operation);
        self.write_json(&self.lock_path, &lock_info).await?;

        info!(
            "Acquired run lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    /// Releases the run lock if `lock_id` still owns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be read or deleted.
    pub async fn release_lock(&self, lock_id: &str) -> Result<()> {
        match self.read_lock_file().await? {
            Some(existing) if existing.lock_id == lock_id => {
                self.delete_lock_file().await?;
                info!("Released run lock: {lock_id}");
            }
            Some(existing) => debug!(
                "Lock ID mismatch: expected {lock_id}, found {}",
                existing.lock_id
            ),
            None => debug!("Run lock {lock_id} already released"),
        }
        Ok(())
    }

    /// Removes the run lock regardless of its holder.
    ///
    /// Returns the lock that was removed, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be read or deleted.
    pub async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        let existing = self.read_lock_file().await?;
        if let Some(lock) = &existing {
            warn!("Force-releasing run lock held by {}", lock.holder);
            self.delete_lock_file().await?;
        }
        Ok(existing)
    }

    /// Returns the current lock, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file is unreadable.
    pub async fn lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    /// Returns true if a live lock is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file is unreadable.
    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .read_lock_file()
            .await?
            .is_some_and(|lock| !lock.is_expired()))
    }

    /// Loads the run history, empty if none was recorded yet.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the history file cannot be read or parsed.
    pub async fn load_history(&self) -> Result<RunHistory> {
        if !fs::try_exists(&self.history_path).await.unwrap_or(false) {
            debug!("History file does not exist: {}", self.history_path.display());
            return Ok(RunHistory::new());
        }

        let content = fs::read_to_string(&self.history_path)
            .await
            .map_err(|e| corrupted(format!("Failed to read history file: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| corrupted(format!("Failed to parse history file: {e}")))
    }

    /// Appends a run to the history.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read or written.
    pub async fn record_run(&self, record: RunRecord) -> Result<()> {
        let mut history = self.load_history().await?;
        history.push(record);
        self.write_json(&self.history_path, &history).await?;
        debug!("Run recorded in {}", self.history_path.display());
        Ok(())
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !fs::try_exists(&self.base_dir).await.unwrap_or(false) {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await?;
        }
        Ok(())
    }

    /// Reads the lock file if it exists.
    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !fs::try_exists(&self.lock_path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path)
            .await
            .map_err(|e| corrupted(format!("Failed to read lock file: {e}")))?;

        let lock_info: LockInfo = serde_json::from_str(&content)
            .map_err(|e| corrupted(format!("Failed to parse lock file: {e}")))?;

        Ok(Some(lock_info))
    }

    /// Deletes the lock file.
    async fn delete_lock_file(&self) -> Result<()> {
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::State(StateError::LockFailed {
                message: format!("Failed to delete lock file: {e}"),
            })),
        }
    }

    /// Writes JSON to a temporary file, then renames it into place.
    async fn write_json<T: serde::Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StateError::serialization(format!("Failed to serialize: {e}")))?;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

fn corrupted(message: String) -> SyncError {
    SyncError::State(StateError::Corrupted { message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{ReconciliationPlan, ReconciliationReport};
    use crate::resource::ResourceKind;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalRunStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalRunStore::with_base_dir(temp_dir.path().join(STATE_DIR));
        (store, temp_dir)
    }

    #[test]
    fn test_for_config_uses_sibling_directory() {
        let store = LocalRunStore::for_config(Path::new("/srv/tenants/prod.yaml"));
        assert_eq!(store.base_dir(), Path::new("/srv/tenants/.tenant-sync"));

        let bare = LocalRunStore::for_config(Path::new("tenant.yaml"));
        assert_eq!(bare.base_dir(), Path::new("./.tenant-sync"));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store
            .acquire_lock("test-holder", "apply")
            .await
            .expect("Failed to acquire lock");

        assert!(store.is_locked().await.expect("is_locked failed"));

        store
            .release_lock(&lock.lock_id)
            .await
            .expect("Failed to release lock");

        assert!(!store.is_locked().await.expect("is_locked failed"));
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (store, _temp) = create_test_store();

        let _lock = store
            .acquire_lock("holder-1", "apply")
            .await
            .expect("Failed to acquire first lock");

        match store.acquire_lock("holder-2", "apply").await {
            Err(SyncError::State(StateError::LockedByOther { holder, .. })) => {
                assert_eq!(holder, "holder-1");
            }
            other => panic!("expected LockedByOther, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_force_unlock() {
        let (store, _temp) = create_test_store();
        store
            .acquire_lock("", "apply")
            .await
            .expect("Failed to acquire lock");

        let removed = store.force_unlock().await.expect("force unlock failed");
        assert!(removed.is_some());
        assert!(!store.is_locked().await.expect("is_locked failed"));
        assert!(store.force_unlock().await.expect("second unlock").is_none());
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let (store, _temp) = create_test_store();
        assert!(store.load_history().await.expect("empty history").runs.is_empty());

        let plan = ReconciliationPlan::build(ResourceKind::Role, vec![], vec![]);
        let mut report = ReconciliationReport::for_plan(&plan);
        report.finish();

        store
            .record_run(RunRecord::from_report(&plan, &report))
            .await
            .expect("record run");
        store
            .record_run(RunRecord::from_report(&plan, &report))
            .await
            .expect("record run");

        let history = store.load_history().await.expect("load history");
        assert_eq!(history.runs.len(), 2);
        assert_eq!(history.runs[0].kind, ResourceKind::Role);
    }

    #[tokio::test]
    async fn test_corrupted_history() {
        let (store, _temp) = create_test_store();
        std::fs::create_dir_all(store.base_dir()).expect("create dir");
        std::fs::write(store.base_dir().join(HISTORY_FILE), "not json").expect("write");

        let err = store.load_history().await.expect_err("corrupted history");
        assert!(matches!(err, SyncError::State(StateError::Corrupted { .. })));
    }
}
