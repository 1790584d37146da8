//! API route definitions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use super::state::AppState;
use crate::tray::ABOUT_URL;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/alerts/reset", post(reset_alerts))
        .route("/config/reload", post(reload_config))
        .route("/about", get(about))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.monitor.status();
    let total = snapshot.entries.len();
    Json(json!({ "data": snapshot, "meta": { "total": total } }))
}

async fn reset_alerts(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.monitor.reset_alerts().await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "data": { "reset": true } }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn reload_config(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.monitor.reload_from_disk().await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "data": { "path": state.monitor.config_path().display().to_string() } })),
        ),
        Err(e) => {
            warn!(error = %e, "configuration reload rejected");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("{:#}", e) })))
        }
    }
}

async fn about() -> Json<Value> {
    Json(json!({ "data": { "name": env!("CARGO_PKG_NAME"), "url": ABOUT_URL } }))
}
