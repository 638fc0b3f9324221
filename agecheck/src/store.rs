//! Callback persistence for the webhook receiver.
//!
//! Received payloads live in an in-process ordered list that is mirrored to a
//! single JSON file, rewritten whole on every append. The lock serializes
//! concurrent deliveries so the file never sees interleaved writes and the
//! list order always matches arrival order.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Ordered history of received callbacks, mirrored to a JSON file.
///
/// Duplicates are kept as-is: delivery is at-least-once and the history is
/// append-only, aside from the operator-facing [`clear`](Self::clear).
/// Cloning is cheap and all clones share the same history.
#[derive(Clone)]
pub struct CallbackStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    callbacks: Mutex<Vec<Value>>,
}

impl CallbackStore {
    /// Open the store, loading any callbacks already on disk.
    ///
    /// A missing file starts an empty history. An unreadable or corrupt file
    /// is logged and ignored so a bad byte on disk cannot keep the receiver
    /// from starting.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let callbacks = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<Value>>(&bytes) {
                Ok(list) => {
                    info!(path = %path.display(), loaded = list.len(), "store_loaded");
                    list
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store_file_corrupt");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "store_fresh");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "store_file_unreadable");
                Vec::new()
            }
        };

        Self {
            inner: Arc::new(StoreInner {
                path,
                callbacks: Mutex::new(callbacks),
            }),
        }
    }

    /// Append a payload and rewrite the backing file.
    ///
    /// Returns the new history length. On a write failure the entry stays in
    /// memory and the error is handed back to the caller.
    pub async fn append(&self, payload: Value) -> Result<usize> {
        let mut callbacks = self.inner.callbacks.lock().await;
        callbacks.push(payload);
        let total = callbacks.len();

        let bytes = serde_json::to_vec_pretty(&*callbacks)
            .context("Failed to serialize callback history")?;
        tokio::fs::write(&self.inner.path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", self.inner.path.display()))?;

        info!(path = %self.inner.path.display(), total = total, "store_appended");
        Ok(total)
    }

    /// Snapshot of the full history, in arrival order.
    pub async fn all(&self) -> Vec<Value> {
        self.inner.callbacks.lock().await.clone()
    }

    /// Number of callbacks received so far.
    pub async fn len(&self) -> usize {
        self.inner.callbacks.lock().await.len()
    }

    /// Whether anything has arrived yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop the in-memory history and delete the backing file.
    pub async fn clear(&self) -> Result<()> {
        let mut callbacks = self.inner.callbacks.lock().await;
        callbacks.clear();

        match tokio::fs::remove_file(&self.inner.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to remove {}", self.inner.path.display()));
            }
        }

        info!(path = %self.inner.path.display(), "store_cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn append_grows_history_and_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("callbacks.json");
        let store = CallbackStore::open(path.clone()).await;

        assert!(store.is_empty().await);

        let first = store.append(json!({"batch_id": "b1"})).await.unwrap();
        let second = store.append(json!({"batch_id": "b2"})).await.unwrap();
        assert_eq!((first, second), (1, 2));

        let on_disk: Vec<Value> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk[0]["batch_id"], "b1");
        assert_eq!(on_disk[1]["batch_id"], "b2");
    }

    #[tokio::test]
    async fn reopen_loads_previous_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("callbacks.json");

        let store = CallbackStore::open(path.clone()).await;
        store.append(json!({"batch_id": "b1"})).await.unwrap();
        drop(store);

        let reopened = CallbackStore::open(path).await;
        assert_eq!(reopened.len().await, 1);
        assert_eq!(reopened.all().await[0]["batch_id"], "b1");
    }

    #[tokio::test]
    async fn duplicate_payloads_are_kept() {
        let dir = TempDir::new().unwrap();
        let store = CallbackStore::open(dir.path().join("callbacks.json")).await;

        let payload = json!({"batch_id": "b1", "report_url": "https://x/y.csv"});
        store.append(payload.clone()).await.unwrap();
        store.append(payload.clone()).await.unwrap();

        let all = store.all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], all[1]);
    }

    #[tokio::test]
    async fn missing_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let store = CallbackStore::open(dir.path().join("never-written.json")).await;

        assert!(store.is_empty().await);
        assert_eq!(store.append(json!({"batch_id": "b1"})).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("callbacks.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = CallbackStore::open(path).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("callbacks.json");
        let store = CallbackStore::open(path.clone()).await;

        store.append(json!({"batch_id": "b1"})).await.unwrap();
        assert!(path.exists());

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
        assert!(!path.exists());

        // Clearing an already-clean store is not an error
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn failed_write_keeps_entry_in_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-subdir").join("callbacks.json");
        let store = CallbackStore::open(path).await;

        let err = store.append(json!({"batch_id": "b1"})).await;
        assert!(err.is_err());
        assert_eq!(store.len().await, 1);
    }
}
