//! Traits for the scheduler transport and the persisted state backends.

use crate::{
    JobRequest, MappingStoreError, NativeJobState, ProgressError, ProgressRecord, TransportError,
};
use async_trait::async_trait;

/// Mechanism used to talk to the batch scheduler (HTTP API or local command).
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Short name for logs, e.g. `http` or `local`.
    fn name(&self) -> &'static str;

    /// Submit a rendered job; returns the scheduler's job id.
    async fn submit(&self, job: &JobRequest) -> Result<String, TransportError>;

    /// Query the scheduler for a job's native state.
    ///
    /// `Ok(None)` means the transport has no live view of the job (it left the queue,
    /// or status polling is disabled); callers fall back to the progress record.
    async fn query(&self, job_id: &str) -> Result<Option<NativeJobState>, TransportError>;
}

/// Durable task id -> external job id mapping.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Add or overwrite the mapping for `task_id`. Atomic per key.
    async fn put(&self, task_id: &str, job_id: &str) -> Result<(), MappingStoreError>;

    /// Job id for `task_id`, or `None` when the task was never submitted.
    async fn get(&self, task_id: &str) -> Result<Option<String>, MappingStoreError>;
}

/// Per-task progress records shared between the worker (writer) and the client (reader).
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Latest record, or `None` when the worker has not written one yet.
    async fn read(&self, task_id: &str) -> Result<Option<ProgressRecord>, ProgressError>;

    /// Replace the record for `record.task_id`. Readers never observe a partial write.
    async fn write(&self, record: &ProgressRecord) -> Result<(), ProgressError>;
}
