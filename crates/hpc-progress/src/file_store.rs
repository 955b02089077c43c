//! One `{task_id}.json` per task under a progress directory.

use async_trait::async_trait;
use hpc_types::{validate_identifier, write_atomic, ProgressError, ProgressRecord, ProgressStore};
use std::path::{Path, PathBuf};

pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Well-known record location for a task.
    pub fn record_path(&self, task_id: &str) -> Result<PathBuf, ProgressError> {
        validate_identifier("task_id", task_id)
            .map_err(|e| ProgressError::Invalid(e.to_string()))?;
        Ok(self.dir.join(format!("{}.json", task_id)))
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn read(&self, task_id: &str) -> Result<Option<ProgressRecord>, ProgressError> {
        let path = self.record_path(task_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProgressError::Io(e)),
        };
        // A worker that writes in place can be caught mid-write; treat it as not yet written.
        match serde_json::from_slice::<ProgressRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::debug!(task_id = %task_id, error = %e, "unreadable progress record, ignoring");
                Ok(None)
            }
        }
    }

    async fn write(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        record.validate()?;
        let path = self.record_path(&record.task_id)?;
        let body = serde_json::to_vec(record)?;
        write_atomic(&path, &body).await?;
        Ok(())
    }
}
