use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::models::{
    Agent, ChunkHit, CorpusChunk, Document, DocumentSummary, DocumentType, NewChunk,
    ProcessingStat,
};

/// Aggregate counters behind `GET /api/contextual/stats` (spec §6).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatsSummary {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
}

/// Durable storage contract (spec §4.5 "Store"). `PgStore` is the
/// production implementation over Postgres + pgvector; `MemoryStore`
/// (`database::memory`) is a reference implementation used by tests and
/// anywhere a real database isn't available.
///
/// Every read is scoped to `owner_id` — implementors must join chunks to
/// documents on `owner_id` so a query can never cross an ownership
/// boundary (spec §8 invariant 4).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(
        &self,
        owner_id: &str,
        title: &str,
        doc_type: DocumentType,
        metadata: JsonValue,
    ) -> Result<Uuid>;

    /// Atomic per-document: either every chunk lands or none do (spec §4.5).
    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<()>;

    /// `Ok(true)` if a document was found, owned by `owner_id`, and deleted
    /// (cascading to its chunks and agent links). `Ok(false)` otherwise.
    async fn delete_document(&self, owner_id: &str, document_id: Uuid) -> Result<bool>;

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentSummary>>;

    async fn get_document(&self, owner_id: &str, document_id: Uuid) -> Result<Option<Document>>;

    /// Chunks whose cosine similarity to `query_vector` exceeds `threshold`,
    /// ordered descending, capped at `k`. `allowed_document_ids` further
    /// restricts the result to that set when present (agent scoping).
    async fn vector_search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        threshold: f32,
        k: usize,
        allowed_document_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ChunkHit>>;

    /// Full corpus for an owner, for (re)building the BM25 index.
    async fn get_all_chunks(&self, owner_id: &str) -> Result<Vec<CorpusChunk>>;

    async fn link_agent_documents(&self, agent_id: Uuid, document_ids: &[Uuid]) -> Result<()>;
    async fn unlink_agent_document(&self, agent_id: Uuid, document_id: Uuid) -> Result<()>;
    async fn list_agent_documents(&self, agent_id: Uuid) -> Result<Vec<Uuid>>;

    async fn record_processing_stats(&self, stat: ProcessingStat) -> Result<()>;
    async fn stats_summary(&self, owner_id: &str) -> Result<StatsSummary>;

    async fn create_agent(&self, agent: Agent) -> Result<Agent>;
    async fn list_agents(&self, owner_id: &str) -> Result<Vec<Agent>>;
    /// Cascades to `agent_documents`; never touches documents themselves
    /// (spec §4.11).
    async fn delete_agent(&self, owner_id: &str, agent_id: Uuid) -> Result<bool>;
}
