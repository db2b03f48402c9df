use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::image::{PageSelector, SearchResponse};
use crate::services::SearchRequest;

use super::{ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    /// A page number or the literal "last".
    pub page: Option<String>,
    pub per_page: Option<u32>,
    pub user_id: Option<String>,
}

pub async fn search_images(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ApiResponse<SearchResponse>>, ApiError> {
    if params.query.trim().is_empty() {
        return Err(ApiError::validation("query must not be empty"));
    }

    let page = match params.page.as_deref() {
        None => PageSelector::default(),
        Some(raw) => PageSelector::parse(raw)
            .ok_or_else(|| ApiError::validation("page must be a positive number or \"last\""))?,
    };

    let search_config = &state.config().search;
    let per_page = params.per_page.unwrap_or(search_config.default_per_page);
    if per_page == 0 || per_page > search_config.max_per_page {
        return Err(ApiError::validation(format!(
            "per_page must be between 1 and {}",
            search_config.max_per_page
        )));
    }

    let request = SearchRequest {
        query: params.query,
        page,
        per_page,
        user_id: params.user_id.filter(|user_id| !user_id.is_empty()),
    };

    let response = state.search_service().search(&request).await?;

    Ok(Json(ApiResponse::success(response)))
}
