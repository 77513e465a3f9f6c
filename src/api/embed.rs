use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::error::ServiceError;
use crate::models::{EmbedRequest, EmbedResponse};
use crate::state::AppState;

const MAX_EMBED_TEXTS: usize = 100;

/// POST /embed - Turn texts into normalised vectors
pub async fn embed(
    State(state): State<AppState>,
    Json(req): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, (StatusCode, String)> {
    if req.texts.is_empty() || req.texts.len() > MAX_EMBED_TEXTS {
        return Err(ServiceError::Validation(format!(
            "texts must contain between 1 and {MAX_EMBED_TEXTS} items"
        ))
        .into());
    }
    if let Some(pos) = req.texts.iter().position(|t| t.trim().is_empty()) {
        return Err(ServiceError::Validation(format!("text at position {pos} is empty")).into());
    }

    let embedder = state.engine.embedder();
    let embeddings = embedder.embed(&req.texts).await.map_err(|e| {
        tracing::warn!("Embedding failed: {e}");
        <(StatusCode, String)>::from(e)
    })?;

    Ok(Json(EmbedResponse {
        count: embeddings.len(),
        dimension: embedder.dimension(),
        embeddings,
    }))
}
