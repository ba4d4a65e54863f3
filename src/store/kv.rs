//! Key/value storage backends
//!
//! Provides:
//! - `KeyValueStore`, the async string-keyed storage trait
//! - `MemoryStore` for tests and ephemeral sessions
//! - `FileStore`, a JSON-document store persisted atomically to disk

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AppError;

/// Async string key/value storage.
///
/// Implementations must be safe to share across tasks. Errors surface as
/// [`AppError`] so callers can classify them uniformly.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// In-memory store. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// File-backed store holding a single JSON document.
///
/// The whole document lives in memory; every mutation rewrites the file
/// through a temp-file rename so a crash mid-write cannot corrupt it.
pub struct FileStore {
    path: PathBuf,
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl FileStore {
    /// Open the store at `path`, loading any existing document.
    ///
    /// A missing file is an empty store. A file that exists but does not
    /// parse is reported as corrupted rather than silently discarded.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<HashMap<String, String>>(&raw).map_err(|e| {
                AppError::corrupted(format!(
                    "Session store at {} is not valid JSON: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(AppError::from(e)),
        };
        debug!("Opened file store at {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: Arc::new(RwLock::new(values)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &HashMap<String, String>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let serialized = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values).await
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut values = self.values.write().await;
        values.remove(key);
        self.persist(&values).await
    }
}
