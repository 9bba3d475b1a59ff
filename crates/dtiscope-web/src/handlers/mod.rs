//! HTTP handlers for all API routes.
//!
//! Successful responses are wrapped as `{"status": "success", "data": ...}`;
//! errors go through [`ApiError`] as `{"status": "error", "message": ...}`.

pub mod compounds;
pub mod predict;
pub mod system;
pub mod targets;

use axum::Json;
use dtiscope_common::error::ApiError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { status: "success", data })
}

/// Common `?page=&page_size=&search=&sort_by=&sort_order=` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Body of the quick-search routes.
#[derive(Debug, Default, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "type")]
    pub search_type: Option<String>,
}

/// Run catalog work off the async runtime; the first query reads the corpus from disk.
pub async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("catalog worker aborted: {e}")))
}
