//! HTTP JSON API for the order backend.
//!
//! Exposes order intake, status polling, the audit/progress log, and
//! cooperative cancellation as an async HTTP service using `axum` + `tokio`.
//! The log endpoint is the surface a streaming/push component tails: the
//! core only records entries, it never pushes.
//!
//! Endpoints:
//! - GET  /health              - Liveness probe (fixed JSON)
//! - GET  /                    - Informational JSON pointing at the paths
//! - POST /orders              - Create an order
//! - GET  /orders/{id}         - Order status view
//! - GET  /orders/{id}/logs    - Full process log, ascending
//! - POST /orders/{id}/cancel  - Cancel a non-terminal order
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use biznesplan_engine::{IterationCapPolicy, Pipeline};
use biznesplan_storage::MemoryStore;

use self::handlers::{
    handle_cancel_order, handle_create_order, handle_get_order, handle_get_order_logs,
    handle_health, handle_not_found, handle_root,
};
use self::state::AppState;
use crate::config::Settings;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Start the HTTP server on the given port.
///
/// CORS is permissive (`Any` origin) for local dev; tighten for production.
pub async fn start_server(
    port: u16,
    settings: Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(
        store.clone(),
        settings.llm_max_retries,
        Box::new(IterationCapPolicy::new(settings.biznesplan_max_iterations)),
    );

    let state = Arc::new(AppState {
        store,
        pipeline,
        settings,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/orders", post(handle_create_order))
        .route("/orders/{id}", get(handle_get_order))
        .route("/orders/{id}/logs", get(handle_get_order_logs))
        .route("/orders/{id}/cancel", post(handle_cancel_order))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    eprintln!("Biznesplan backend listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    eprintln!("\nServer shut down.");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    eprintln!("\nReceived shutdown signal...");
}
