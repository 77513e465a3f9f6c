use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::models::{HybridOutcome, HybridSearchRequest, SearchRequest, SearchResponse};
use crate::search::hybrid::HybridQuery;
use crate::state::AppState;

/// POST /search - Plain nearest-neighbour search with hard filters
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let hits = state
        .retriever
        .search(&req.query, req.top_k, &req.filters(), req.min_score)
        .await
        .map_err(|e| {
            tracing::warn!("Search failed: {e}");
            <(StatusCode, String)>::from(e)
        })?;

    Ok(Json(SearchResponse { hits }))
}

/// POST /hybrid-search - Composed semantic query, avoid-term exclusion,
/// hard filters and vibe boosting
pub async fn hybrid_search(
    State(state): State<AppState>,
    Json(req): Json<HybridSearchRequest>,
) -> Result<Json<HybridOutcome>, (StatusCode, String)> {
    let query = HybridQuery {
        filters: req.filters(),
        boost_factor: req.boost_factor.unwrap_or(state.config.default_boost),
        free_text: req.free_text,
        tags: req.tags,
        avoid_terms: req.avoid_terms,
        top_k: req.top_k,
    };

    let outcome = state.retriever.hybrid_search(&query).await.map_err(|e| {
        tracing::warn!("Hybrid search failed: {e}");
        <(StatusCode, String)>::from(e)
    })?;

    Ok(Json(outcome))
}
