//! JSON file-backed mapping store: one object `{task_id: job_id, ...}` in a single file.
//!
//! Writers inside one process are serialized by `write_lock`, and every rewrite goes
//! through a temp file + rename. Several writer processes sharing the file can still
//! lose updates; use `SqliteMappingStore` for that deployment.

use async_trait::async_trait;
use hpc_types::{write_atomic, MappingStore, MappingStoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct JsonFileMappingStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileMappingStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, MappingStoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(MappingStoreError::Other(e.to_string())),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            MappingStoreError::Other(format!("corrupt mapping file {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl MappingStore for JsonFileMappingStore {
    async fn put(&self, task_id: &str, job_id: &str) -> Result<(), MappingStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut mappings = self.load().await?;
        if let Some(prev) = mappings.insert(task_id.to_string(), job_id.to_string()) {
            if prev != job_id {
                tracing::warn!(task_id = %task_id, previous = %prev, job_id = %job_id, "overwriting task mapping");
            }
        }
        let body = serde_json::to_vec_pretty(&mappings)
            .map_err(|e| MappingStoreError::Other(e.to_string()))?;
        write_atomic(&self.path, &body)
            .await
            .map_err(|e| MappingStoreError::Other(e.to_string()))?;
        tracing::debug!(task_id = %task_id, job_id = %job_id, entries = mappings.len(), "task mapping persisted");
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<String>, MappingStoreError> {
        Ok(self.load().await?.remove(task_id))
    }
}
