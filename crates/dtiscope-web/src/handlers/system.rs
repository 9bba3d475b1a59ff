//! Liveness endpoint.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::SharedState;

/// GET /health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let jobs = state.jobs.list_jobs().await;
    let running = jobs.iter().filter(|j| !j.status.is_terminal()).count();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "compounds": state.catalog.compounds.len(),
        "jobs": { "running": running, "total": jobs.len() },
    }))
}
