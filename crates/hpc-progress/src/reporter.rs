//! Worker-side progress reporting.
//!
//! The running analysis job owns its progress record: it writes 0.0/running on start,
//! a non-decreasing fraction at each pipeline stage, then exactly one terminal record.

use hpc_types::{ProgressError, ProgressRecord, ProgressState, ProgressStore};
use std::sync::Arc;
use tokio::sync::Mutex;

struct ReporterState {
    last_progress: f64,
    finalized: bool,
}

pub struct ProgressReporter {
    store: Arc<dyn ProgressStore>,
    task_id: String,
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn ProgressStore>, task_id: impl Into<String>) -> Self {
        Self {
            store,
            task_id: task_id.into(),
            state: Mutex::new(ReporterState {
                last_progress: 0.0,
                finalized: false,
            }),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Initial record: 0.0 / running.
    pub async fn start(&self) -> Result<(), ProgressError> {
        self.emit(0.0, ProgressState::Running, None).await
    }

    /// Record a stage boundary. Values are clamped to [0, 1] and never go backwards.
    pub async fn advance(&self, progress: f64) -> Result<(), ProgressError> {
        if progress.is_nan() {
            return Err(ProgressError::Invalid("progress is NaN".to_string()));
        }
        self.emit(progress.clamp(0.0, 1.0), ProgressState::Running, None)
            .await
    }

    pub async fn complete(&self) -> Result<(), ProgressError> {
        self.emit(1.0, ProgressState::Completed, None).await
    }

    /// Terminal failure; the last reached progress is kept.
    pub async fn fail(&self, error: impl Into<String>) -> Result<(), ProgressError> {
        self.emit(0.0, ProgressState::Failed, Some(error.into()))
            .await
    }

    async fn emit(
        &self,
        progress: f64,
        status: ProgressState,
        error: Option<String>,
    ) -> Result<(), ProgressError> {
        let mut state = self.state.lock().await;
        if state.finalized {
            return Err(ProgressError::Finalized(self.task_id.clone()));
        }
        let progress = progress.max(state.last_progress);
        let mut record = ProgressRecord::new(self.task_id.clone(), progress, status, unix_now());
        record.error = error;
        self.store.write(&record).await?;

        state.last_progress = progress;
        state.finalized = status.is_terminal();
        tracing::info!(
            task_id = %self.task_id,
            progress = progress,
            status = ?status,
            "progress updated"
        );
        Ok(())
    }
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
