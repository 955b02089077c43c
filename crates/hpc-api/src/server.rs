//! Axum server and routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use hpc_scheduler::Scheduler;
use hpc_types::{ErrorKind, TaskSpec, TaskStatusReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub struct AppState {
    pub scheduler: Arc<dyn Scheduler + Send + Sync>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/analysis/submit", post(handle_submit))
        .route("/api/v1/analysis/status/:task_id", get(handle_status))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnalysisRequest {
    /// Generated when omitted.
    #[serde(default)]
    pub task_id: Option<String>,
    pub user: String,
    pub analysis_plan: serde_json::Value,
    pub data_id: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnalysisData {
    pub task_id: String,
    pub job_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Envelope code for a failed submission.
fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => 400,
        ErrorKind::AlreadySubmitted => 409,
        ErrorKind::Authentication | ErrorKind::Submission => 502,
        _ => 500,
    }
}

async fn handle_submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitAnalysisRequest>,
) -> Json<ApiResponse<SubmitAnalysisData>> {
    let task_id = req
        .task_id
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let task = TaskSpec::new(task_id, req.user, req.analysis_plan, req.data_id);
    match state.scheduler.submit(&task).await {
        Ok(job_id) => Json(ApiResponse {
            code: 200,
            message: "Analysis task submitted".to_string(),
            data: Some(SubmitAnalysisData {
                task_id: task.task_id,
                job_id,
                status: "submitted",
            }),
        }),
        Err(e) => {
            tracing::warn!(task_id = %task.task_id, kind = ?e.kind(), error = %e, "submit rejected");
            Json(ApiResponse {
                code: error_code(e.kind()),
                message: e.to_string(),
                data: None,
            })
        }
    }
}

async fn handle_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Json<ApiResponse<TaskStatusReport>> {
    let report = state.scheduler.get_status(&task_id).await;
    Json(ApiResponse {
        code: 200,
        message: "Success".to_string(),
        data: Some(report),
    })
}

async fn handle_health() -> &'static str {
    "ok"
}
