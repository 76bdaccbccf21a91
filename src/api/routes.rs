//! API route definitions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::scheduler::{ScheduledTask, TaskSpec, WakeReason};

use super::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(scheduler_status))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", delete(delete_task))
        .route("/tasks/{id}/pause", post(pause_task))
        .route("/tasks/{id}/resume", post(resume_task))
        .route("/tasks/{id}/run", post(run_task))
        .route("/tasks/{id}/history", get(task_history))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

/// Error envelope. Domain failures map to client codes; anything unexpected
/// is logged here and leaves as a generic 500.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        tracing::error!("api request failed: {err:#}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message, "meta": meta() }))).into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn scheduler_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = state.scheduler.status().await.map_err(ApiError::internal)?;
    Ok(Json(json!({ "data": status, "meta": meta() })))
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tasks = state
        .scheduler
        .list_tasks()
        .await
        .map_err(ApiError::internal)?;
    let total = tasks.len();
    Ok(Json(json!({ "data": tasks, "meta": { "total": total } })))
}

async fn create_task(
    State(state): State<AppState>,
    Json(spec): Json<TaskSpec>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let task = ScheduledTask::create(spec).map_err(|e| ApiError::bad_request(e.to_string()))?;
    state
        .scheduler
        .insert_task(task.clone())
        .await
        .map_err(ApiError::internal)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": task, "meta": meta() })),
    ))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let removed = state
        .scheduler
        .remove_task(id)
        .await
        .map_err(ApiError::internal)?;
    if !removed {
        return Err(ApiError::not_found("task not found"));
    }
    Ok(Json(
        json!({ "data": { "id": id, "deleted": true }, "meta": meta() }),
    ))
}

async fn pause_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    set_task_active(state, id, false).await
}

async fn resume_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    set_task_active(state, id, true).await
}

async fn set_task_active(state: AppState, id: Uuid, active: bool) -> Result<Json<Value>, ApiError> {
    let updated = state
        .scheduler
        .set_active(id, active)
        .await
        .map_err(ApiError::internal)?;
    match updated {
        Some(task) => Ok(Json(json!({ "data": task, "meta": meta() }))),
        None => Err(ApiError::not_found("task not found")),
    }
}

/// Force-queue the task and wake the scheduler loop. The run itself happens
/// on the loop so the concurrency cap holds; this handler only reports that
/// the task was accepted.
async fn run_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let known = state
        .scheduler
        .enqueue_now(id)
        .await
        .map_err(ApiError::internal)?;
    if !known {
        return Err(ApiError::not_found("task not found"));
    }
    if state.wake.send(WakeReason::Manual).is_err() {
        return Err(ApiError::internal(anyhow::anyhow!(
            "scheduler loop unavailable"
        )));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "data": { "id": id, "queued": true }, "meta": meta() })),
    ))
}

async fn task_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let history = state
        .scheduler
        .task_history(id)
        .await
        .map_err(ApiError::internal)?;
    match history {
        Some(executions) => {
            let total = executions.len();
            Ok(Json(
                json!({ "data": executions, "meta": { "total": total } }),
            ))
        }
        None => Err(ApiError::not_found("task not found")),
    }
}
