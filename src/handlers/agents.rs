use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::database::models::Agent;
use crate::handlers::documents::OwnerQuery;
use crate::state::AppState;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub voice_id: String,
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub is_default: bool,
}

/// `POST /api/agents` (spec §6, §4.11).
pub async fn create_agent_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<Json<Agent>, ApiError> {
    info!(owner_id = %request.owner_id, name = %request.name, "create agent request received");

    let agent = Agent {
        id: Uuid::new_v4(),
        owner_id: request.owner_id,
        name: request.name,
        instructions: request.instructions,
        voice_id: request.voice_id,
        greeting: request.greeting,
        is_default: request.is_default,
    };

    let created = state.agents.create_agent(agent).await?;
    Ok(Json(created))
}

#[derive(Debug, Serialize)]
pub struct ListAgentsResponse {
    pub agents: Vec<Agent>,
    pub total: usize,
}

/// `GET /api/agents?owner_id=...`.
pub async fn list_agents_handler(
    State(state): State<AppState>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<ListAgentsResponse>, ApiError> {
    let agents = state.agents.list_agents(&params.owner_id).await?;
    let total = agents.len();
    Ok(Json(ListAgentsResponse { agents, total }))
}

#[derive(Debug, Serialize)]
pub struct DeleteAgentResponse {
    pub deleted: bool,
}

/// `DELETE /api/agents/{id}?owner_id=...`.
pub async fn delete_agent_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<DeleteAgentResponse>, ApiError> {
    let deleted = state.agents.delete_agent(&params.owner_id, agent_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("agent {agent_id} not found for this owner")));
    }
    Ok(Json(DeleteAgentResponse { deleted }))
}

#[derive(Debug, Deserialize)]
pub struct LinkDocumentsRequest {
    pub owner_id: String,
    pub document_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LinkDocumentsResponse {
    pub linked: usize,
}

/// `POST /api/agents/{id}/documents` (spec §6, §4.11). Only documents the
/// requesting owner actually owns are linked — a caller can't link
/// another owner's document into their own agent by guessing its id.
pub async fn link_documents_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Json(request): Json<LinkDocumentsRequest>,
) -> Result<Json<LinkDocumentsResponse>, ApiError> {
    let owned = state.documents.list_documents(&request.owner_id).await?;
    let owned_ids: std::collections::HashSet<Uuid> = owned.into_iter().map(|d| d.id).collect();

    let verified: Vec<Uuid> = request
        .document_ids
        .into_iter()
        .filter(|id| owned_ids.contains(id))
        .collect();

    if verified.is_empty() {
        return Err(ApiError::InvalidInput(
            "none of the supplied document_ids belong to this owner".to_string(),
        ));
    }

    state.agents.link_documents(agent_id, &verified).await?;
    Ok(Json(LinkDocumentsResponse { linked: verified.len() }))
}

/// `DELETE /api/agents/{id}/documents/{doc_id}`.
pub async fn unlink_document_handler(
    State(state): State<AppState>,
    Path((agent_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeleteAgentResponse>, ApiError> {
    state.agents.unlink_document(agent_id, document_id).await?;
    Ok(Json(DeleteAgentResponse { deleted: true }))
}
