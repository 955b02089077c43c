//! In-memory mapping store (process lifetime only).

use async_trait::async_trait;
use hpc_types::{MappingStore, MappingStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct InMemoryMappingStore {
    /// task_id -> job_id
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for InMemoryMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn put(&self, task_id: &str, job_id: &str) -> Result<(), MappingStoreError> {
        self.entries
            .write()
            .await
            .insert(task_id.to_string(), job_id.to_string());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<String>, MappingStoreError> {
        Ok(self.entries.read().await.get(task_id).cloned())
    }
}
