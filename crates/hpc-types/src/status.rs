//! Normalized job status and its translation from the scheduler vocabulary.

use serde::{Deserialize, Serialize};

/// Normalized status of a task's external job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
    /// The status query itself failed; only produced by degraded reports.
    Error,
}

impl JobStatus {
    /// Translate a native scheduler status. Total: anything unrecognized is `Unknown`.
    ///
    /// Slurm decorates cancellations (`CANCELLED+`, `CANCELLED by 1000`), so only the
    /// leading word is compared.
    pub fn from_native(native: &str) -> Self {
        let word = native
            .trim()
            .split(|c: char| c.is_whitespace() || c == '+')
            .next()
            .unwrap_or("");
        match word.to_ascii_uppercase().as_str() {
            "PENDING" => JobStatus::Pending,
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown => "unknown",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
