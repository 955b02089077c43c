//! Task and job request/response DTOs.

use crate::{ErrorKind, JobStatus};
use serde::{Deserialize, Serialize};

/// One analysis request, as handed over by the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub user: String,
    /// Opaque plan produced upstream; serialized verbatim into the job's plan file.
    pub analysis_plan: serde_json::Value,
    pub data_id: String,
}

impl TaskSpec {
    pub fn new(
        task_id: impl Into<String>,
        user: impl Into<String>,
        analysis_plan: serde_json::Value,
        data_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            user: user.into(),
            analysis_plan,
            data_id: data_id.into(),
        }
    }
}

/// Resources requested from the scheduler for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub nodes: u32,
    pub gpus_per_node: u32,
    /// Scheduler memory string, e.g. `64G`.
    pub memory: String,
    /// Wall-clock limit, e.g. `12:00:00`.
    pub time_limit: String,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            nodes: 1,
            gpus_per_node: 1,
            memory: "64G".to_string(),
            time_limit: "12:00:00".to_string(),
        }
    }
}

/// Everything a transport needs to submit one rendered job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub task_id: String,
    /// Scheduler-facing job name.
    pub name: String,
    /// Rendered batch script.
    pub script: String,
    pub queue: String,
    pub resources: ResourceRequest,
}

/// Native job state as reported by the scheduler, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeJobState {
    pub status: String,
    pub error: Option<String>,
}

impl NativeJobState {
    pub fn normalized(&self) -> JobStatus {
        JobStatus::from_native(&self.status)
    }
}

/// Result of a status poll for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub task_id: String,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl TaskStatusReport {
    /// Report for a task id that has no job mapping.
    pub fn not_found(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: JobStatus::Unknown,
            progress: 0.0,
            result_reference: None,
            error: Some(format!("no job mapping for task {}", task_id)),
            error_kind: Some(ErrorKind::TaskNotFound),
        }
    }

    /// Degraded report for a status poll that failed; pollers keep retrying.
    pub fn degraded(task_id: &str, kind: ErrorKind, message: String, progress: f64) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: JobStatus::Error,
            progress,
            result_reference: None,
            error: Some(message),
            error_kind: Some(kind),
        }
    }
}
