pub mod embed;
pub mod index;
pub mod search;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the HTTP router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::root))
        .route("/healthz", get(index::health))
        .route("/stats", get(index::stats))
        .route("/report", get(index::report))
        .route("/upsert", post(index::upsert))
        .route("/reset", post(index::reset))
        .route("/reload", post(index::reload))
        .route("/embed", post(embed::embed))
        .route("/search", post(search::search))
        .route("/hybrid-search", post(search::hybrid_search))
        .with_state(state)
}
