use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Snapshot, Storage};
use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};

/// JSON-file-backed record store
///
/// Cloning shares the same snapshot and writer lock.
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    /// `None` for in-memory stores.
    path: Option<PathBuf>,
    snapshot: Snapshot,
}

impl JsonStore {
    /// Open the snapshot file, creating `{patients: [], analyses: []}` on first run
    pub async fn open(config: &StoreConfig) -> StorageResult<Self> {
        let path = config.path.clone();

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot =
                    serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                        message: format!("{}: {}", path.display(), e),
                    })?;
                snapshot.validate()?;
                info!(
                    path = %path.display(),
                    patients = snapshot.patients.len(),
                    analyses = snapshot.analyses.len(),
                    "Snapshot loaded"
                );
                snapshot
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let snapshot = Snapshot::empty();
                write_atomically(&path, &snapshot)?;
                info!(path = %path.display(), "Snapshot initialized");
                snapshot
            }
            Err(e) => {
                return Err(StorageError::Io {
                    message: format!("Failed to read {}: {}", path.display(), e),
                })
            }
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                path: Some(path),
                snapshot,
            })),
        })
    }

    /// Create a store with no backing file
    pub fn in_memory() -> Self {
        Self::from_snapshot(Snapshot::empty())
    }

    /// Create an in-memory store seeded with `snapshot`
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                path: None,
                snapshot,
            })),
        }
    }

    /// Run one load-mutate-commit sequence under the writer lock.
    ///
    /// `op` edits a working copy. The copy is persisted and published only
    /// when `op` returns `Ok` and the write succeeds; otherwise the store is
    /// left exactly as it was.
    pub async fn transact<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Snapshot) -> StorageResult<T>,
    {
        let mut guard = Arc::clone(&self.inner).lock_owned().await;
        let mut working = guard.snapshot.clone();
        let value = op(&mut working)?;

        if guard.path.is_none() {
            guard.snapshot = working;
            return Ok(value);
        }

        // The blocking task owns the guard and does both the write and the
        // publish, so a dropped caller cannot split them.
        tokio::task::spawn_blocking(move || {
            if let Some(path) = &guard.path {
                write_atomically(path, &working)?;
            }
            guard.snapshot = working;
            Ok::<_, StorageError>(())
        })
        .await
        .map_err(|e| StorageError::Io {
            message: format!("Snapshot writer task failed: {}", e),
        })??;

        Ok(value)
    }

    /// Run a read-only closure against the current snapshot without cloning it
    pub async fn read<T, F>(&self, op: F) -> T
    where
        F: FnOnce(&Snapshot) -> T,
    {
        op(&self.inner.lock().await.snapshot)
    }

    /// Wait for any in-flight commit and release this handle
    pub async fn close(self) -> StorageResult<()> {
        let inner = self.inner.lock().await;
        info!(
            path = ?inner.path.as_ref().map(|p| p.display().to_string()),
            patients = inner.snapshot.patients.len(),
            analyses = inner.snapshot.analyses.len(),
            "Store closed"
        );
        Ok(())
    }

    /// Backing file path, if any
    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }
}

#[async_trait]
impl Storage for JsonStore {
    async fn load(&self) -> StorageResult<Snapshot> {
        Ok(self.inner.lock().await.snapshot.clone())
    }

    async fn commit(&self, snapshot: Snapshot) -> StorageResult<()> {
        snapshot.validate()?;
        self.transact(move |current| {
            *current = snapshot;
            Ok(())
        })
        .await
    }
}

/// Write to a sibling temp file, fsync, then rename over `path`
fn write_atomically(path: &Path, snapshot: &Snapshot) -> StorageResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    std::fs::create_dir_all(&parent).map_err(|e| StorageError::Io {
        message: format!("Failed to create directory {}: {}", parent.display(), e),
    })?;

    let body = serde_json::to_vec_pretty(snapshot)?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| StorageError::Io {
        message: format!("Failed to create temp file in {}: {}", parent.display(), e),
    })?;
    tmp.write_all(&body).map_err(|e| StorageError::Io {
        message: format!("Failed to write snapshot for {}: {}", path.display(), e),
    })?;
    tmp.flush().map_err(|e| StorageError::Io {
        message: format!("Failed to flush snapshot for {}: {}", path.display(), e),
    })?;
    tmp.as_file().sync_all().map_err(|e| StorageError::Io {
        message: format!("Failed to sync snapshot for {}: {}", path.display(), e),
    })?;
    tmp.persist(path).map_err(|e| StorageError::Io {
        message: format!("Failed to replace {}: {}", path.display(), e.error),
    })?;

    debug!(path = %path.display(), bytes = body.len(), "Snapshot committed");
    Ok(())
}
