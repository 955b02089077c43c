//! Error taxonomy for submission and status tracking.

use serde::{Deserialize, Serialize};

/// Machine-readable failure tag carried in status reports and API envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AlreadySubmitted,
    TaskNotFound,
    Authentication,
    Submission,
    StatusQuery,
    MappingPersistence,
    ProgressRead,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} exceeds {max} bytes")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} contains invalid character {ch:?}")]
    InvalidCharacter { field: &'static str, ch: char },
    #[error("{0} must not contain path traversal")]
    Traversal(&'static str),
    #[error("analysis plan cannot be encoded: {0}")]
    Plan(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("submission failed: {0}")]
    Submission(String),
    #[error("status query failed: {0}")]
    StatusQuery(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MappingStoreError {
    #[error("mapping store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("progress io: {0}")]
    Io(#[from] std::io::Error),
    #[error("progress encoding: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid progress record: {0}")]
    Invalid(String),
    #[error("task {0} already reached a terminal state")]
    Finalized(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid task: {0}")]
    Validation(#[from] ValidationError),
    #[error("task {task_id} was already submitted as job {job_id}")]
    AlreadySubmitted { task_id: String, job_id: String },
    #[error("task {0} is already being submitted")]
    InProgress(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("submission failed: {0}")]
    Submission(String),
    #[error("status query failed: {0}")]
    StatusQuery(String),
    #[error("mapping persistence failed: {0}")]
    MappingPersistence(#[from] MappingStoreError),
    #[error("progress: {0}")]
    Progress(#[from] ProgressError),
}

impl From<TransportError> for SchedulerError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Authentication(m) => SchedulerError::Authentication(m),
            TransportError::Submission(m) => SchedulerError::Submission(m),
            TransportError::StatusQuery(m) => SchedulerError::StatusQuery(m),
        }
    }
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Validation(_) => ErrorKind::Validation,
            SchedulerError::AlreadySubmitted { .. } | SchedulerError::InProgress(_) => {
                ErrorKind::AlreadySubmitted
            }
            SchedulerError::Authentication(_) => ErrorKind::Authentication,
            SchedulerError::Submission(_) => ErrorKind::Submission,
            SchedulerError::StatusQuery(_) => ErrorKind::StatusQuery,
            SchedulerError::MappingPersistence(_) => ErrorKind::MappingPersistence,
            SchedulerError::Progress(_) => ErrorKind::ProgressRead,
        }
    }
}
