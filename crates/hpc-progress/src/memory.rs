use async_trait::async_trait;
use hpc_types::{ProgressError, ProgressRecord, ProgressStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory progress store for tests and single-process setups.
#[derive(Clone, Default)]
pub struct InMemoryProgressStore {
    records: Arc<RwLock<HashMap<String, ProgressRecord>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn read(&self, task_id: &str) -> Result<Option<ProgressRecord>, ProgressError> {
        Ok(self.records.read().await.get(task_id).cloned())
    }

    async fn write(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        record.validate()?;
        self.records
            .write()
            .await
            .insert(record.task_id.clone(), record.clone());
        Ok(())
    }
}
