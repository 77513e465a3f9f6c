use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::models::{
    HealthResponse, MessageResponse, StatsResponse, UpsertRequest, UpsertResponse,
};
use crate::search::report::ConsistencyReport;
use crate::state::AppState;

/// GET / - Service descriptor
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.engine.embedder().model_name(),
        "endpoints": [
            "/healthz", "/stats", "/report", "/embed", "/search",
            "/hybrid-search", "/upsert", "/reset", "/reload"
        ],
    }))
}

/// GET /healthz - Vector and record counts plus fault state
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.engine.snapshot();
    let consistent = snapshot.is_consistent();
    let faulted = state.engine.is_faulted();

    Json(HealthResponse {
        status: if consistent && !faulted { "ok" } else { "degraded" }.to_string(),
        model: state.engine.embedder().model_name().to_string(),
        index_type: state.engine.kind().to_string(),
        vectors: snapshot.vector_count(),
        records: snapshot.record_count(),
        consistent,
        faulted,
    })
}

/// GET /stats - Index size and shape
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.engine.snapshot();
    Json(StatsResponse {
        vectors: snapshot.vector_count(),
        records: snapshot.record_count(),
        dimension: snapshot.index.dimension(),
        index_type: snapshot.index.kind().to_string(),
    })
}

/// GET /report - Consistency summary with category and group breakdowns
pub async fn report(State(state): State<AppState>) -> Json<ConsistencyReport> {
    let snapshot = state.engine.snapshot();
    Json(ConsistencyReport::from_snapshot(
        &snapshot,
        &state.config.group_key,
        state.engine.is_faulted(),
    ))
}

/// POST /upsert - Insert or replace records, rebuilding the whole index
pub async fn upsert(
    State(state): State<AppState>,
    Json(req): Json<UpsertRequest>,
) -> Result<Json<UpsertResponse>, (StatusCode, String)> {
    match state.engine.upsert(req.items).await {
        Ok(result) => Ok(Json(UpsertResponse { ok: true, result })),
        Err(e) => {
            tracing::error!("Upsert failed: {e}");
            Err(e.into())
        }
    }
}

/// POST /reset - Drop every record and vector
pub async fn reset(State(state): State<AppState>) -> Json<MessageResponse> {
    state.engine.reset().await;
    Json(MessageResponse {
        ok: true,
        message: "Index reset".to_string(),
    })
}

/// POST /reload - Re-read the persisted index and records
pub async fn reload(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let result = state.engine.reload().await.map_err(|e| {
        tracing::error!("Reload failed: {e}");
        <(StatusCode, String)>::from(e)
    })?;
    Ok(Json(MessageResponse {
        ok: true,
        message: format!("Index reloaded: {} records", result.total),
    }))
}
