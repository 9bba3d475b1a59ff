//! Target list, search, detail and statistics endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use dtiscope_catalog::{SortOrder, TargetQuery};
use dtiscope_common::error::ApiError;
use serde_json::json;

use super::{blocking, success, ListParams, SearchBody};
use crate::state::SharedState;

/// Page size of the quick target search.
const SEARCH_PAGE_SIZE: usize = 100;

/// GET /api/targets: search, sort and paginate aggregated targets.
pub async fn api_targets(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = TargetQuery {
        search: params.search,
        sort_by: params.sort_by.unwrap_or_else(|| "prediction_count".to_string()),
        sort_order: params.sort_order.as_deref().map_or(SortOrder::Desc, SortOrder::parse),
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(state.settings.catalog.default_page_size),
    };
    let targets = state.catalog.targets.clone();
    let page = blocking(move || targets.list_targets(&query)).await?;
    Ok(success(page))
}

/// GET /api/targets/statistics
pub async fn api_target_statistics(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let targets = state.catalog.targets.clone();
    let stats = blocking(move || targets.statistics()).await?;
    Ok(success(stats))
}

/// POST /api/targets/search: first page of matches, up to 100.
pub async fn api_target_search(
    State(state): State<SharedState>,
    Json(body): Json<SearchBody>,
) -> Result<impl IntoResponse, ApiError> {
    let query = TargetQuery {
        search: Some(body.query),
        page: 1,
        page_size: SEARCH_PAGE_SIZE,
        ..Default::default()
    };
    let targets = state.catalog.targets.clone();
    let page = blocking(move || targets.list_targets(&query)).await?;
    Ok(Json(json!({
        "status": "success",
        "total": page.items.len(),
        "data": page.items,
    })))
}

/// GET /api/targets/{name}: target by symbol or alias, with its compounds.
pub async fn api_target_detail(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let targets = state.catalog.targets.clone();
    let detail = blocking(move || targets.get_target_detail(&name))
        .await?
        .ok_or_else(|| ApiError::NotFound("Target not found".to_string()))?;
    Ok(success(detail))
}

/// GET /api/targets/{name}/compounds: compounds of a target, best score first.
pub async fn api_target_compounds(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let targets = state.catalog.targets.clone();
    let compounds = blocking(move || targets.get_target_compounds(&name))
        .await?
        .ok_or_else(|| ApiError::NotFound("Target not found".to_string()))?;
    Ok(success(compounds))
}
