use std::sync::Arc;

use uuid::Uuid;

use crate::database::models::Agent;
use crate::database::store::DocumentStore;
use crate::utils::error::ApiError;

/// Thin pass-through onto the store's agent operations (spec §4.11, C11).
/// An agent is a persona an owner configures and links to a subset of
/// their own documents; the registry itself holds no state beyond what
/// the store already persists.
pub struct AgentService {
    store: Arc<dyn DocumentStore>,
}

impl AgentService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create_agent(&self, agent: Agent) -> Result<Agent, ApiError> {
        self.store.create_agent(agent).await.map_err(ApiError::from)
    }

    pub async fn list_agents(&self, owner_id: &str) -> Result<Vec<Agent>, ApiError> {
        self.store.list_agents(owner_id).await.map_err(ApiError::from)
    }

    pub async fn delete_agent(&self, owner_id: &str, agent_id: Uuid) -> Result<bool, ApiError> {
        self.store
            .delete_agent(owner_id, agent_id)
            .await
            .map_err(ApiError::from)
    }

    /// Links are owner-checked at the document level by the caller
    /// (handlers resolve `document_ids` via `list_documents` first) —
    /// the store itself only enforces that the agent row exists.
    pub async fn link_documents(&self, agent_id: Uuid, document_ids: &[Uuid]) -> Result<(), ApiError> {
        self.store
            .link_agent_documents(agent_id, document_ids)
            .await
            .map_err(ApiError::from)
    }

    pub async fn unlink_document(&self, agent_id: Uuid, document_id: Uuid) -> Result<(), ApiError> {
        self.store
            .unlink_agent_document(agent_id, document_id)
            .await
            .map_err(ApiError::from)
    }

    pub async fn list_agent_documents(&self, agent_id: Uuid) -> Result<Vec<Uuid>, ApiError> {
        self.store
            .list_agent_documents(agent_id)
            .await
            .map_err(ApiError::from)
    }
}
