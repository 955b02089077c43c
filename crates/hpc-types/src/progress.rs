//! Progress record written by the analysis worker.

use crate::ProgressError;
use serde::{Deserialize, Serialize};

/// Worker-side state in a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressState {
    Running,
    Completed,
    Failed,
}

impl ProgressState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProgressState::Running)
    }
}

/// One progress snapshot for a task. Overwritten wholesale on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub task_id: String,
    /// Fraction complete in [0.0, 1.0].
    pub progress: f64,
    pub status: ProgressState,
    /// Unix time in seconds.
    pub timestamp: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressRecord {
    pub fn new(task_id: impl Into<String>, progress: f64, status: ProgressState, timestamp: f64) -> Self {
        Self {
            task_id: task_id.into(),
            progress,
            status,
            timestamp,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn validate(&self) -> Result<(), ProgressError> {
        if !(0.0..=1.0).contains(&self.progress) {
            return Err(ProgressError::Invalid(format!(
                "progress {} outside [0, 1]",
                self.progress
            )));
        }
        Ok(())
    }
}
