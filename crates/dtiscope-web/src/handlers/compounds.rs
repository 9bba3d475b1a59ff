//! Compound list, search, detail and per-compound target endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use dtiscope_catalog::{CompoundQuery, SearchField, SortOrder};
use dtiscope_common::error::ApiError;
use serde::Deserialize;
use serde_json::json;

use super::{blocking, success, SearchBody};
use crate::state::SharedState;

/// Default page size of the per-compound target list.
const COMPOUND_TARGETS_PAGE_SIZE: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct CompoundListParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    /// `all` or absent for every type.
    pub compound_type: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// GET /api/compounds: filter by type, search, sort and paginate.
pub async fn api_compounds(
    State(state): State<SharedState>,
    Query(params): Query<CompoundListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let CompoundListParams { page, page_size, compound_type, search, sort_by, sort_order } = params;
    let query = CompoundQuery {
        compound_type,
        search,
        sort_by: sort_by.unwrap_or_else(|| "global_id".to_string()),
        sort_order: sort_order.as_deref().map_or(SortOrder::Asc, SortOrder::parse),
    };
    let catalog = &state.settings.catalog;
    let page = state.catalog.compounds.list(
        &query,
        page.unwrap_or(1),
        page_size.unwrap_or(catalog.default_page_size),
        catalog.max_page_size,
    );
    Ok(success(page))
}

/// GET /api/compounds/statistics
pub async fn api_compound_statistics(State(state): State<SharedState>) -> impl IntoResponse {
    success(state.catalog.compounds.statistics())
}

/// POST /api/compounds/search: up to 100 hits in table order.
pub async fn api_compound_search(
    State(state): State<SharedState>,
    Json(body): Json<SearchBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Search query required".to_string()));
    }
    let field = body.search_type.as_deref().map_or(SearchField::All, SearchField::parse);
    let hits = state.catalog.compounds.search(&body.query, field);
    Ok(Json(json!({
        "status": "success",
        "total": hits.len(),
        "data": hits,
    })))
}

/// GET /api/compounds/{id}
pub async fn api_compound_detail(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let compound = state
        .catalog
        .compounds
        .get(id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound("Compound not found".to_string()))?;
    Ok(success(compound))
}

/// GET /api/compounds/{id}/targets: paginated predicted targets with score statistics.
pub async fn api_compound_targets(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = params.page.unwrap_or(1);
    let page_size = params.page_size.unwrap_or(COMPOUND_TARGETS_PAGE_SIZE);
    let targets = state.catalog.targets.clone();
    let view = blocking(move || targets.compound_targets_page(id, page, page_size))
        .await?
        .ok_or_else(|| ApiError::NotFound("Compound not found".to_string()))?;
    Ok(success(view))
}
