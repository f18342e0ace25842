use axum::extract::State;
use axum::{http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Probes the one backend every retrieval request depends on: the store.
/// The embedding/summarizer/reranker backends are excluded — each is
/// already independently degrade-on-failure, so their outage shouldn't
/// flip the whole service to not-ready.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match state.store.stats_summary("_readiness_probe").await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
