use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::services::RetrievedChunk;
use crate::state::AppState;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub owner_id: String,
    pub query: String,
    pub agent_id: Option<Uuid>,
    pub top_k: Option<usize>,
}

/// One row of `POST /api/documents/search`'s response (spec §6):
/// `{chunk_id, document_id, content, score}`, ordered high-to-low. `score`
/// is the reranker's score when reranking ran, else the RRF fused score.
#[derive(Debug, Serialize)]
pub struct SearchResultView {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub score: f32,
}

impl From<RetrievedChunk> for SearchResultView {
    fn from(hit: RetrievedChunk) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            document_id: hit.document_id,
            content: hit.content,
            score: hit.rerank_score.unwrap_or(hit.fused_score),
        }
    }
}

/// `POST /api/documents/search`: raw hybrid retrieval results, for callers
/// that want to do their own formatting (spec §6, §4.9). A backend
/// failure degrades to whatever the surviving path found rather than an
/// HTTP error, so the response is always the bare results array — a
/// `Degraded` retrieval and an empty corpus are indistinguishable to this
/// endpoint's caller (spec §7 propagation policy).
pub async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchResultView>>, ApiError> {
    info!(owner_id = %request.owner_id, "search request received");

    let top_k = request
        .top_k
        .unwrap_or(state.settings.rag.top_k)
        .min(50);

    let outcome = state
        .retriever
        .retrieve(&request.query, &request.owner_id, request.agent_id, top_k)
        .await;

    Ok(Json(
        outcome.results.into_iter().map(SearchResultView::from).collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub owner_id: String,
    pub query: String,
    pub agent_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub context: String,
    pub has_context: bool,
}

/// `POST /api/documents/context`: the formatted, citation-bearing context
/// block the voice pipeline injects into its prompt (spec §6, §4.10).
pub async fn context_handler(
    State(state): State<AppState>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextResponse>, ApiError> {
    info!(owner_id = %request.owner_id, "context request received");

    let reply = state
        .context
        .get_context(&request.query, &request.owner_id, request.agent_id)
        .await;

    Ok(Json(ContextResponse {
        context: reply.context,
        has_context: reply.has_context,
    }))
}
