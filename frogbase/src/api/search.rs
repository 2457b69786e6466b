//! Search endpoint

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::SearchStrategy;
use crate::error::{ApiError, ApiResult};
use crate::search::SearchHit;
use crate::AppState;

/// Largest `k` accepted over HTTP
const MAX_K: usize = 500;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
    pub strategy: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub strategy: SearchStrategy,
    pub k: usize,
    pub hits: Vec<SearchHit>,
}

/// GET /search?q=&k=&strategy=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let defaults = &state.library.settings().search;
    let k = params.k.unwrap_or(defaults.default_k);
    if k > MAX_K {
        return Err(ApiError::BadRequest(format!("k must be at most {}", MAX_K)));
    }
    let strategy = match params.strategy.as_deref() {
        Some(s) => s
            .parse::<SearchStrategy>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => defaults.strategy,
    };

    let hits = state.library.search_with(&params.q, k, strategy).await?;
    Ok(Json(SearchResponse {
        query: params.q,
        strategy,
        k,
        hits,
    }))
}

pub fn search_routes() -> Router<AppState> {
    Router::new().route("/search", get(search))
}
