use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{
    Agent, ChunkHit, CorpusChunk, Document, DocumentSummary, DocumentType, NewChunk,
    ProcessingStat, DEFAULT_AGENT_OWNER,
};
use super::store::{DocumentStore, StatsSummary};
use crate::utils::cosine_similarity;

#[derive(Clone)]
struct StoredChunk {
    id: Uuid,
    document_id: Uuid,
    #[allow(dead_code)]
    chunk_index: i32,
    content: String,
    contextual_content: Option<String>,
    is_contextualized: bool,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<Uuid, Document>,
    chunks: HashMap<Uuid, StoredChunk>,
    agents: HashMap<Uuid, Agent>,
    agent_documents: HashMap<Uuid, Vec<Uuid>>,
    stats: Vec<ProcessingStat>,
}

/// Reference [`DocumentStore`] implementation backed by process memory.
/// Used by unit tests, integration tests, and local development when no
/// Postgres instance is configured — spec §4.5 does not mandate a single
/// storage backend, only the contract in [`DocumentStore`].
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Seeds the same `_default`-owned built-in agent `PgStore` gets from
    /// its migration seed, so behavior doesn't diverge across backends
    /// (spec §3).
    pub fn new() -> Self {
        let store = Self {
            inner: Mutex::new(Inner::default()),
        };
        let mut inner = store.inner.lock();
        let default_agent = Agent {
            id: Uuid::new_v4(),
            owner_id: DEFAULT_AGENT_OWNER.to_string(),
            name: "Assistant".to_string(),
            instructions: "You are a helpful assistant. Answer using the retrieved context when it's relevant.".to_string(),
            voice_id: String::new(),
            greeting: "Hi, how can I help you today?".to_string(),
            is_default: true,
        };
        inner.agents.insert(default_agent.id, default_agent);
        drop(inner);
        store
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_document(
        &self,
        owner_id: &str,
        title: &str,
        doc_type: DocumentType,
        metadata: JsonValue,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let doc = Document {
            id,
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            doc_type,
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().documents.insert(id, doc);
        Ok(id)
    }

    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<()> {
        let mut inner = self.inner.lock();
        for chunk in chunks {
            let id = Uuid::new_v4();
            inner.chunks.insert(
                id,
                StoredChunk {
                    id,
                    document_id,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    contextual_content: chunk.contextual_content,
                    is_contextualized: chunk.is_contextualized,
                    embedding: chunk.embedding,
                },
            );
        }
        Ok(())
    }

    async fn delete_document(&self, owner_id: &str, document_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock();
        let owned = inner
            .documents
            .get(&document_id)
            .map(|d| d.owner_id == owner_id)
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }
        inner.documents.remove(&document_id);
        inner.chunks.retain(|_, c| c.document_id != document_id);
        for docs in inner.agent_documents.values_mut() {
            docs.retain(|id| *id != document_id);
        }
        Ok(true)
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentSummary>> {
        let inner = self.inner.lock();
        let mut out: Vec<DocumentSummary> = inner
            .documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .map(|d| DocumentSummary {
                id: d.id,
                title: d.title.clone(),
                doc_type: d.doc_type,
                created_at: d.created_at,
                chunk_count: inner.chunks.values().filter(|c| c.document_id == d.id).count(),
            })
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn get_document(&self, owner_id: &str, document_id: Uuid) -> Result<Option<Document>> {
        let inner = self.inner.lock();
        Ok(inner
            .documents
            .get(&document_id)
            .filter(|d| d.owner_id == owner_id)
            .cloned())
    }

    async fn vector_search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        threshold: f32,
        k: usize,
        allowed_document_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ChunkHit>> {
        let inner = self.inner.lock();
        let owned_docs: std::collections::HashSet<Uuid> = inner
            .documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .map(|d| d.id)
            .collect();

        let mut hits: Vec<ChunkHit> = inner
            .chunks
            .values()
            .filter(|c| owned_docs.contains(&c.document_id))
            .filter(|c| allowed_document_ids.map_or(true, |ids| ids.contains(&c.document_id)))
            .filter_map(|c| {
                let score = cosine_similarity(query_vector, &c.embedding).ok()?;
                if score >= threshold {
                    Some(ChunkHit {
                        chunk_id: c.id,
                        document_id: c.document_id,
                        content: c
                            .contextual_content
                            .clone()
                            .unwrap_or_else(|| c.content.clone()),
                        score,
                        is_contextualized: c.is_contextualized,
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get_all_chunks(&self, owner_id: &str) -> Result<Vec<CorpusChunk>> {
        let inner = self.inner.lock();
        let owned_docs: std::collections::HashSet<Uuid> = inner
            .documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .map(|d| d.id)
            .collect();

        Ok(inner
            .chunks
            .values()
            .filter(|c| owned_docs.contains(&c.document_id))
            .map(|c| CorpusChunk {
                chunk_id: c.id,
                document_id: c.document_id,
                content: c
                    .contextual_content
                    .clone()
                    .unwrap_or_else(|| c.content.clone()),
            })
            .collect())
    }

    async fn link_agent_documents(&self, agent_id: Uuid, document_ids: &[Uuid]) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner.agent_documents.entry(agent_id).or_default();
        for id in document_ids {
            if !entry.contains(id) {
                entry.push(*id);
            }
        }
        Ok(())
    }

    async fn unlink_agent_document(&self, agent_id: Uuid, document_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(docs) = inner.agent_documents.get_mut(&agent_id) {
            docs.retain(|id| *id != document_id);
        }
        Ok(())
    }

    async fn list_agent_documents(&self, agent_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .inner
            .lock()
            .agent_documents
            .get(&agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_processing_stats(&self, stat: ProcessingStat) -> Result<()> {
        self.inner.lock().stats.push(stat);
        Ok(())
    }

    async fn stats_summary(&self, owner_id: &str) -> Result<StatsSummary> {
        let inner = self.inner.lock();
        let mut summary = StatsSummary::default();
        summary.total_documents = inner
            .documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .count();
        summary.total_chunks = inner
            .chunks
            .values()
            .filter(|c| {
                inner
                    .documents
                    .get(&c.document_id)
                    .map(|d| d.owner_id == owner_id)
                    .unwrap_or(false)
            })
            .count();
        for stat in inner.stats.iter().filter(|s| s.owner_id == owner_id) {
            summary.total_tokens += stat.tokens.input
                + stat.tokens.output
                + stat.tokens.cache_creation
                + stat.tokens.cache_read;
            summary.estimated_cost_usd += stat.cost_estimate_usd;
        }
        Ok(summary)
    }

    async fn create_agent(&self, agent: Agent) -> Result<Agent> {
        let mut inner = self.inner.lock();
        inner.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    /// Every agent the owner created, plus the built-in `_default`-owned
    /// agents no caller owns but every caller can see (spec §3).
    async fn list_agents(&self, owner_id: &str) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .inner
            .lock()
            .agents
            .values()
            .filter(|a| a.owner_id == owner_id || a.owner_id == DEFAULT_AGENT_OWNER)
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
        Ok(agents)
    }

    async fn delete_agent(&self, owner_id: &str, agent_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock();
        let owned = inner
            .agents
            .get(&agent_id)
            .map(|a| a.owner_id == owner_id)
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }
        inner.agents.remove(&agent_id);
        inner.agent_documents.remove(&agent_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_and_list_scopes_by_owner() {
        let store = MemoryStore::new();
        let doc_id = store
            .insert_document("owner-a", "Doc A", DocumentType::Text, json!({}))
            .await
            .unwrap();
        store
            .insert_document("owner-b", "Doc B", DocumentType::Text, json!({}))
            .await
            .unwrap();

        let docs = store.list_documents("owner-a").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, doc_id);
    }

    #[tokio::test]
    async fn delete_document_rejects_other_owner() {
        let store = MemoryStore::new();
        let doc_id = store
            .insert_document("owner-a", "Doc A", DocumentType::Text, json!({}))
            .await
            .unwrap();

        let deleted = store.delete_document("owner-b", doc_id).await.unwrap();
        assert!(!deleted);
        assert!(store.get_document("owner-a", doc_id).await.unwrap().is_some());

        let deleted = store.delete_document("owner-a", doc_id).await.unwrap();
        assert!(deleted);
        assert!(store.get_document("owner-a", doc_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vector_search_respects_threshold_and_scope() {
        let store = MemoryStore::new();
        let doc_id = store
            .insert_document("owner-a", "Doc A", DocumentType::Text, json!({}))
            .await
            .unwrap();
        store
            .insert_chunks(
                doc_id,
                vec![NewChunk {
                    chunk_index: 0,
                    content: "hello world".into(),
                    contextual_content: None,
                    is_contextualized: false,
                    embedding: vec![1.0, 0.0, 0.0],
                    metadata: json!({}),
                }],
            )
            .await
            .unwrap();

        let hits = store
            .vector_search("owner-a", &[1.0, 0.0, 0.0], 0.9, 5, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = store
            .vector_search("owner-b", &[1.0, 0.0, 0.0], 0.9, 5, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn list_agents_includes_default_agent_for_every_owner() {
        let store = MemoryStore::new();
        store
            .create_agent(Agent {
                id: Uuid::new_v4(),
                owner_id: "owner-a".to_string(),
                name: "Custom".to_string(),
                instructions: String::new(),
                voice_id: String::new(),
                greeting: String::new(),
                is_default: false,
            })
            .await
            .unwrap();

        let agents_a = store.list_agents("owner-a").await.unwrap();
        assert_eq!(agents_a.len(), 2);
        assert!(agents_a.iter().any(|a| a.owner_id == DEFAULT_AGENT_OWNER));
        assert!(agents_a.iter().any(|a| a.owner_id == "owner-a"));

        let agents_b = store.list_agents("owner-b").await.unwrap();
        assert_eq!(agents_b.len(), 1);
        assert_eq!(agents_b[0].owner_id, DEFAULT_AGENT_OWNER);
    }
}
