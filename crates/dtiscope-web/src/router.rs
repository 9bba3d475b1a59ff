//! Axum router: maps all URL paths to handlers.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
    compression::CompressionLayer,
};
use std::sync::Arc;
use crate::state::{AppState, SharedState};
use crate::handlers::{
    compounds::{api_compounds, api_compound_detail, api_compound_search, api_compound_statistics, api_compound_targets},
    predict::{
        cancel_job, cleanup_jobs, download_results, job_results, job_status, list_jobs,
        predict_batch, predict_single, validate_smiles,
    },
    system::health,
    targets::{api_targets, api_target_compounds, api_target_detail, api_target_search, api_target_statistics},
};
use crate::sse::sse_handler;

/// Largest accepted batch upload.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/health", get(health))

        // SSE streaming
        .route("/api/events", get(sse_handler))

        // Prediction jobs
        .route("/api/predict/single",          post(predict_single))
        .route("/api/predict/batch",           post(predict_batch).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
        .route("/api/predict/status/{id}",     get(job_status))
        .route("/api/predict/cancel/{id}",     post(cancel_job))
        .route("/api/predict/results/{id}",    get(job_results))
        .route("/api/predict/download/{id}",   get(download_results))
        .route("/api/predict/jobs",            get(list_jobs))
        .route("/api/predict/cleanup",         post(cleanup_jobs))
        .route("/api/predict/validate/smiles", post(validate_smiles))

        // Targets
        .route("/api/targets",                  get(api_targets))
        .route("/api/targets/statistics",       get(api_target_statistics))
        .route("/api/targets/search",           post(api_target_search))
        .route("/api/targets/{name}",           get(api_target_detail))
        .route("/api/targets/{name}/compounds", get(api_target_compounds))

        // Compounds
        .route("/api/compounds",              get(api_compounds))
        .route("/api/compounds/statistics",   get(api_compound_statistics))
        .route("/api/compounds/search",       post(api_compound_search))
        .route("/api/compounds/{id}",         get(api_compound_detail))
        .route("/api/compounds/{id}/targets", get(api_compound_targets))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
