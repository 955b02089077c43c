//! Scheduler trait: submit an analysis task, poll its status.

use async_trait::async_trait;
use hpc_types::{SchedulerError, TaskSpec, TaskStatusReport};

/// Front door used by request handlers.
///
/// Contract: `submit` returns only after the task -> job mapping is durable, so a
/// `get_status` issued after it never reports the task as unknown. `get_status` never
/// fails; scheduler or storage problems come back as a report with status `error`.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Render, submit and record the job for `task`; returns the scheduler's job id.
    async fn submit(&self, task: &TaskSpec) -> Result<String, SchedulerError>;

    /// Current reconciled status of `task_id`.
    async fn get_status(&self, task_id: &str) -> TaskStatusReport;
}
