use std::sync::Arc;

use crate::config::Settings;
use crate::database::store::DocumentStore;
use crate::logging::ActivityLogger;
use crate::search::{Bm25Registry, Reranker};
use crate::services::{AgentService, ContextService, DocumentService, EmbeddingService, Retriever};
use crate::utils::limiters::Limiters;

/// Shared application state, handed to every handler via axum's `State`
/// extractor. Every field is an `Arc` so the whole struct is cheap to
/// clone per request.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn DocumentStore>,
    pub embedding: Arc<EmbeddingService>,
    pub bm25: Arc<Bm25Registry>,
    pub reranker: Option<Arc<Reranker>>,
    pub limiters: Arc<Limiters>,
    pub activity: Arc<ActivityLogger>,
    pub documents: Arc<DocumentService>,
    pub retriever: Arc<Retriever>,
    pub context: Arc<ContextService>,
    pub agents: Arc<AgentService>,
}
