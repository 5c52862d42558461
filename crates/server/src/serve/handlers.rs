//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use biznesplan_core::{NewOrder, SERVICE_NAME};
use biznesplan_engine::PipelineError;
use biznesplan_storage::{OrderRecord, OrderStore, ProcessLogRecord, StorageError};

use super::state::AppState;
use super::json_error;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": state.settings.app_version,
    });
    (StatusCode::OK, Json(response))
}

/// GET /
pub(crate) async fn handle_root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "message": format!("{} API", state.settings.app_name),
        "health": "/health",
        "orders": "/orders",
    });
    (StatusCode::OK, Json(response))
}

/// POST /orders
pub(crate) async fn handle_create_order(
    State(state): State<Arc<AppState>>,
    Json(new_order): Json<NewOrder>,
) -> Response {
    match state.pipeline.create_order(new_order).await {
        Ok(record) => (StatusCode::CREATED, Json(order_view(&record))).into_response(),
        Err(e) => pipeline_error_response(e),
    }
}

/// GET /orders/{id}
pub(crate) async fn handle_get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_order(&id).await {
        Ok(record) => (StatusCode::OK, Json(order_view(&record))).into_response(),
        Err(e) => storage_error_response(e),
    }
}

/// GET /orders/{id}/logs
///
/// The full audit/progress trail, ascending by creation. Restartable: every
/// request re-reads the sequence from the start.
pub(crate) async fn handle_get_order_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    // Distinguish "no such order" from "no entries yet".
    if let Err(e) = state.store.get_order(&id).await {
        return storage_error_response(e);
    }
    match state.store.list_process_logs(&id).await {
        Ok(entries) => {
            let logs: Vec<serde_json::Value> = entries.iter().map(log_view).collect();
            (StatusCode::OK, Json(serde_json::json!({ "logs": logs }))).into_response()
        }
        Err(e) => storage_error_response(e),
    }
}

/// POST /orders/{id}/cancel
pub(crate) async fn handle_cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.pipeline.cancel(&id).await {
        Ok(record) => (StatusCode::OK, Json(order_view(&record))).into_response(),
        Err(e) => pipeline_error_response(e),
    }
}

/// Client-facing order status view. Exposes lifecycle fields only, never
/// storage internals.
fn order_view(record: &OrderRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id,
        "podio_item_id": record.podio_item_id,
        "nip": record.nip,
        "full_name": record.full_name,
        "status": record.status,
        "current_phase": record.current_phase,
        "progress_percent": record.progress_percent,
        "error_message": record.error_message,
        "retry_count": record.retry_count,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
        "started_at": record.started_at,
        "completed_at": record.completed_at,
    })
}

fn log_view(entry: &ProcessLogRecord) -> serde_json::Value {
    serde_json::json!({
        "phase": entry.phase,
        "message": entry.message,
        "level": entry.level,
        "data": entry.data,
        "progress_current": entry.progress_current,
        "progress_total": entry.progress_total,
        "progress_percent": entry.progress_percent(),
        "created_at": entry.created_at,
    })
}

fn storage_error_response(err: StorageError) -> Response {
    match &err {
        StorageError::OrderNotFound { .. } => {
            json_error(StatusCode::NOT_FOUND, &err.to_string()).into_response()
        }
        StorageError::DuplicatePodioItem { .. }
        | StorageError::AlreadyRecorded { .. }
        | StorageError::ConcurrentConflict { .. } => {
            json_error(StatusCode::CONFLICT, &err.to_string()).into_response()
        }
        // Backend internals stay internal.
        _ => {
            tracing::error!(error = %err, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
                .into_response()
        }
    }
}

fn pipeline_error_response(err: PipelineError) -> Response {
    match err {
        PipelineError::Domain(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()).into_response()
        }
        PipelineError::OrderCancelled { .. }
        | PipelineError::TerminalState { .. }
        | PipelineError::WrongStage { .. }
        | PipelineError::NotAnActiveStage { .. }
        | PipelineError::ProgressRegression { .. }
        | PipelineError::MissingChildRecord { .. } => {
            json_error(StatusCode::CONFLICT, &err.to_string()).into_response()
        }
        PipelineError::Storage(e) => storage_error_response(e),
    }
}
