//! HTTP API adapter.
//!
//! JSON surface for submit / status / cancel / health / metrics. The
//! consistency contract is write-through: a 202 from POST means the task
//! is durable in the store, so an immediate GET finds it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::application::{CancelOutcome, ExecutorPool, TaskQueue};
use crate::domain::errors::DomainError;
use crate::domain::models::{Phase, PhaseResult, Task, TaskSpec, TaskStatus};
use crate::domain::ports::TaskFilter;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: TaskQueue,
    pub pool: Arc<ExecutorPool>,
}

/// Error body per the wire contract: `{"error": code, "detail": ...}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, detail: Option<String>) -> Self {
        Self { status, body: ErrorBody { error: error.to_string(), detail } }
    }

    fn invalid_payload(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_payload", Some(detail.into()))
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", None)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTask(detail) => Self::invalid_payload(detail),
            DomainError::TaskNotFound(_) => Self::not_found(),
            DomainError::TransitionConflict { .. } => Self::new(
                StatusCode::CONFLICT,
                "conflict",
                Some("task is in a terminal state".to_string()),
            ),
            // Diagnostics are logged, not returned.
            other => {
                error!(error = %other, "Internal error serving API request");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", None)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    id: Uuid,
    status: TaskStatus,
}

/// Full task record for status queries.
#[derive(Debug, Serialize)]
struct TaskDetailResponse {
    id: Uuid,
    kind: String,
    status: TaskStatus,
    priority: i32,
    phase: Phase,
    phase_results: BTreeMap<Phase, PhaseResult>,
    retry_counts: BTreeMap<Phase, u32>,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: String,
    claimed_at: Option<String>,
    completed_at: Option<String>,
    attempts: u32,
}

impl From<Task> for TaskDetailResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            kind: t.kind.as_str().to_string(),
            status: t.status,
            priority: t.priority,
            phase: t.workflow.current_phase,
            phase_results: t.workflow.phase_results,
            retry_counts: t.workflow.retry_counts,
            result: t.result,
            error: t.error,
            created_at: t.created_at.to_rfc3339(),
            claimed_at: t.claimed_at.map(|dt| dt.to_rfc3339()),
            completed_at: t.completed_at.map(|dt| dt.to_rfc3339()),
            attempts: t.attempts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/tasks", post(submit_task))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        .route("/api/metrics", get(get_metrics))
        .route("/health", get(health_check))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the shutdown future resolves.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await
}

// Handler functions

async fn submit_task(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let spec: TaskSpec =
        serde_json::from_value(body).map_err(|e| ApiError::invalid_payload(e.to_string()))?;

    let task = state.queue.enqueue(spec).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { id: task.id, status: task.status })))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskDetailResponse>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found())?;
    let task = state.queue.get(id).await?.ok_or_else(ApiError::not_found)?;
    Ok(Json(TaskDetailResponse::from(task)))
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TaskDetailResponse>>, ApiError> {
    let status = match params.status.as_deref() {
        Some(s) => Some(
            TaskStatus::from_str(s)
                .ok_or_else(|| ApiError::invalid_payload(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };

    let tasks = state.queue.list(TaskFilter { status }, params.limit).await?;
    Ok(Json(tasks.into_iter().map(TaskDetailResponse::from).collect()))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found())?;
    let outcome = state.queue.cancel(id).await?;
    let status = match outcome {
        CancelOutcome::Cancelled => "cancelled",
        CancelOutcome::Cancelling => "cancelling",
    };
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "status": status }))))
}

async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    match state.queue.ping().await {
        Ok(()) => Ok(Json(serde_json::json!({ "status": "ok" }))),
        Err(e) => {
            error!(error = %e, "Health check failed");
            Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unreachable",
                None,
            ))
        }
    }
}

async fn get_metrics(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let counts = state.queue.stats().await?;
    let queue: BTreeMap<&str, u64> =
        counts.iter().map(|(status, count)| (status.as_str(), *count)).collect();
    let pool = state.pool.metrics().await;

    Ok(Json(serde_json::json!({
        "queue": queue,
        "pool": pool,
    })))
}
