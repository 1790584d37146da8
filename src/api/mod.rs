//! Local control API for the running monitor.
//!
//! Everything lives under [`API_PREFIX`]. Reads go through the published
//! status snapshot; writes are forwarded to the poll loop as commands.

mod routes;
pub mod state;

use axum::http::{StatusCode, Uri};
use axum::{Json, Router};
use serde_json::{json, Value};

use self::state::AppState;

/// Path prefix of every control route.
pub const API_PREFIX: &str = "/api/v1";

/// Control router bound to a monitor handle.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(API_PREFIX, routes::api_routes())
        .fallback(unknown_route)
        .with_state(state)
}

async fn unknown_route(uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("no control route at {}", uri.path()) })),
    )
}
