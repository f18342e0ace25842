use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::config::{FeatureFlags, RagConfig};
use crate::database::store::DocumentStore;
use crate::search::{reciprocal_rank_fusion, Bm25Registry, FusedHit, Reranker};
use crate::utils::limiters::Limiters;
use crate::services::EmbeddingService;

/// One retrieval result, ready to be formatted into a context block or
/// returned directly from `/api/documents/search` (spec §4.9).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub fused_score: f32,
    pub rerank_score: Option<f32>,
}

pub struct RetrievalOutcome {
    pub results: Vec<RetrievedChunk>,
    pub degraded: bool,
}

/// A candidate shared by both search paths, before RRF fusion needs to
/// know anything about where it came from.
struct Candidate {
    chunk_id: Uuid,
    document_id: Uuid,
    content: String,
}

/// Hybrid dense+sparse retrieval over one owner's corpus (spec §4.9, C9).
/// Vector search and BM25 search are launched concurrently; each is
/// individually deadline-bounded so a slow backend degrades the result
/// instead of blocking the whole request.
pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    embedding: Arc<EmbeddingService>,
    bm25: Arc<Bm25Registry>,
    reranker: Option<Arc<Reranker>>,
    limiters: Arc<Limiters>,
    config: RagConfig,
    features: FeatureFlags,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedding: Arc<EmbeddingService>,
        bm25: Arc<Bm25Registry>,
        reranker: Option<Arc<Reranker>>,
        limiters: Arc<Limiters>,
        config: RagConfig,
        features: FeatureFlags,
    ) -> Self {
        Self {
            store,
            embedding,
            bm25,
            reranker,
            limiters,
            config,
            features,
        }
    }

    /// Runs one retrieval for `query` scoped to `owner_id`, further
    /// restricted to `agent_id`'s linked documents when present. An
    /// agent with zero linked documents sees none — not the owner's whole
    /// corpus (spec §9 Open Question).
    pub async fn retrieve(
        &self,
        query: &str,
        owner_id: &str,
        agent_id: Option<Uuid>,
        top_k: usize,
    ) -> RetrievalOutcome {
        if query.trim().is_empty() {
            return RetrievalOutcome {
                results: Vec::new(),
                degraded: false,
            };
        }

        let allowed_document_ids = match agent_id {
            Some(agent_id) => match self.store.list_agent_documents(agent_id).await {
                Ok(ids) if ids.is_empty() => {
                    return RetrievalOutcome {
                        results: Vec::new(),
                        degraded: false,
                    };
                }
                Ok(ids) => Some(ids),
                Err(e) => {
                    warn!(error = %e, "failed to resolve agent document links");
                    return RetrievalOutcome {
                        results: Vec::new(),
                        degraded: true,
                    };
                }
            },
            None => None,
        };

        let query_embedding = match self.embedding.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, retrieval degraded");
                return RetrievalOutcome {
                    results: Vec::new(),
                    degraded: true,
                };
            }
        };

        let candidate_k = top_k * self.config.candidate_multiplier;
        let deadline = Duration::from_millis(self.config.search_deadline_ms);

        // Both searches are spawned before either is awaited, so they
        // genuinely run side by side (spec §4.9 step 3).
        let vector_task = tokio::spawn(self.clone_for_vector_search(
            owner_id.to_string(),
            query_embedding,
            candidate_k,
            allowed_document_ids.clone(),
        ));
        let bm25_task = if self.features.use_hybrid_search {
            let bm25 = self.bm25.clone();
            let owner = owner_id.to_string();
            let q = query.to_string();
            let allowed = allowed_document_ids.clone();
            Some(tokio::task::spawn_blocking(move || {
                bm25.search(&owner, &q, candidate_k, allowed.as_deref())
            }))
        } else {
            None
        };

        let vector_hits = match tokio::time::timeout(deadline, vector_task).await {
            Ok(Ok(Ok(hits))) => Some(hits),
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "vector search failed");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "vector search task panicked");
                None
            }
            Err(_) => {
                warn!("vector search exceeded search deadline");
                None
            }
        };

        let bm25_hits = match bm25_task {
            Some(task) => match tokio::time::timeout(deadline, task).await {
                Ok(Ok(hits)) => hits,
                Ok(Err(e)) => {
                    warn!(error = %e, "bm25 search task panicked");
                    None
                }
                Err(_) => {
                    warn!("bm25 search exceeded search deadline");
                    None
                }
            },
            None => None,
        };

        if vector_hits.is_none() && bm25_hits.is_none() {
            return RetrievalOutcome {
                results: Vec::new(),
                degraded: true,
            };
        }
        let degraded = vector_hits.is_none() || (self.features.use_hybrid_search && bm25_hits.is_none());

        let vector_candidates: Vec<Candidate> = vector_hits
            .unwrap_or_default()
            .into_iter()
            .filter(|h| {
                allowed_document_ids
                    .as_ref()
                    .map(|ids| ids.contains(&h.document_id))
                    .unwrap_or(true)
            })
            .map(|h| Candidate {
                chunk_id: h.chunk_id,
                document_id: h.document_id,
                content: h.content,
            })
            .collect();

        let bm25_candidates: Vec<Candidate> = bm25_hits
            .unwrap_or_default()
            .into_iter()
            .filter(|h| {
                allowed_document_ids
                    .as_ref()
                    .map(|ids| ids.contains(&h.document_id))
                    .unwrap_or(true)
            })
            .map(|h| Candidate {
                chunk_id: h.chunk_id,
                document_id: h.document_id,
                content: h.content,
            })
            .collect();

        let rankings: Vec<Vec<Candidate>> = if bm25_candidates.is_empty() {
            vec![vector_candidates]
        } else {
            vec![vector_candidates, bm25_candidates]
        };

        let fused = reciprocal_rank_fusion(
            &rankings,
            self.config.rrf_k,
            |c: &Candidate| c.chunk_id,
            |c: &Candidate| (c.document_id, c.content.clone()),
        );

        let results = self.finalize(query, fused, top_k).await;

        RetrievalOutcome { results, degraded }
    }

    /// `tokio::spawn` needs an owned, `'static` future; this clones the
    /// `Arc`-backed fields it needs rather than the whole `Retriever`.
    fn clone_for_vector_search(
        &self,
        owner_id: String,
        query_embedding: Vec<f32>,
        k: usize,
        allowed_document_ids: Option<Vec<Uuid>>,
    ) -> impl std::future::Future<Output = anyhow::Result<Vec<crate::database::models::ChunkHit>>> {
        let store = self.store.clone();
        let limiters = self.limiters.clone();
        let threshold = self.config.similarity_threshold;

        async move {
            let (_permit, wait) =
                Limiters::acquire_timed(limiters.db_search.clone(), limiters.acquire_timeout, "db_search")
                    .await?;
            tracing::debug!(wait_ms = wait.as_millis() as u64, op = "db_search", "wait_queue");

            store
                .vector_search(
                    &owner_id,
                    &query_embedding,
                    threshold,
                    k,
                    allowed_document_ids.as_deref(),
                )
                .await
        }
    }

    /// Optionally reranks the fused shortlist, then truncates to `top_k`.
    async fn finalize(&self, query: &str, fused: Vec<FusedHit>, top_k: usize) -> Vec<RetrievedChunk> {
        let Some(reranker) = self.reranker.as_ref().filter(|_| self.features.use_rerank) else {
            return fused
                .into_iter()
                .take(top_k)
                .map(|hit| RetrievedChunk {
                    chunk_id: hit.chunk_id,
                    document_id: hit.document_id,
                    content: hit.content,
                    fused_score: hit.rrf_score,
                    rerank_score: None,
                })
                .collect();
        };

        let shortlist_cap = (top_k * 3).min(self.config.rerank_shortlist_cap);
        let mut fused = fused;
        let remainder = if fused.len() > shortlist_cap {
            fused.split_off(shortlist_cap)
        } else {
            Vec::new()
        };

        let reranked = reranker.rerank(query, fused).await;
        let mut scores: HashMap<Uuid, f32> = HashMap::new();
        let mut ordered: Vec<FusedHit> = Vec::with_capacity(reranked.len() + remainder.len());
        for (hit, score) in reranked {
            if let Some(score) = score {
                scores.insert(hit.chunk_id, score);
            }
            ordered.push(hit);
        }
        ordered.extend(remainder);

        ordered
            .into_iter()
            .take(top_k)
            .map(|hit| {
                let rerank_score = scores.get(&hit.chunk_id).copied();
                RetrievedChunk {
                    chunk_id: hit.chunk_id,
                    document_id: hit.document_id,
                    content: hit.content,
                    fused_score: hit.rrf_score,
                    rerank_score,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, LimitsConfig};
    use crate::database::memory::MemoryStore;
    use crate::database::models::{
        Agent, ChunkHit, CorpusChunk, Document, DocumentSummary, DocumentType, NewChunk,
        ProcessingStat,
    };
    use crate::database::store::StatsSummary;
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};

    /// A throwaway HTTP server standing in for the embedding backend, so
    /// tests can exercise a real `reqwest` round trip instead of mocking
    /// `EmbeddingService` away. Always returns the same 3-dim vector.
    async fn spawn_embedding_stub() -> String {
        use axum::{routing::post, Json, Router};

        async fn handler(Json(_): Json<JsonValue>) -> Json<JsonValue> {
            Json(json!({ "data": [{ "embedding": [1.0, 0.0, 0.0] }] }))
        }

        let app = Router::new().route("/v1/embeddings", post(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn test_embedding_service(base_url: String) -> Arc<EmbeddingService> {
        let limiters = Arc::new(Limiters::new(&LimitsConfig::default()));
        Arc::new(EmbeddingService::new(
            EmbeddingConfig {
                base_url,
                model: "test-embed".to_string(),
                dimension: 3,
                api_key: None,
                request_timeout_seconds: 5,
                batch_size: 8,
            },
            limiters,
        ))
    }

    fn test_retriever(
        store: Arc<dyn DocumentStore>,
        embedding: Arc<EmbeddingService>,
        config: RagConfig,
        features: FeatureFlags,
    ) -> Retriever {
        Retriever::new(
            store,
            embedding,
            Arc::new(Bm25Registry::new()),
            None,
            Arc::new(Limiters::new(&LimitsConfig::default())),
            config,
            features,
        )
    }

    fn chunk(content: &str) -> NewChunk {
        NewChunk {
            chunk_index: 0,
            content: content.to_string(),
            contextual_content: None,
            is_contextualized: false,
            embedding: vec![1.0, 0.0, 0.0],
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn zero_link_agent_returns_empty_without_searching() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        // Unreachable on purpose: if the zero-link short-circuit didn't
        // fire before the embedding call, this would fail on a connection
        // error instead of asserting the intended behavior.
        let embedding = test_embedding_service("http://127.0.0.1:1".to_string());
        let retriever =
            test_retriever(store, embedding, RagConfig::default(), FeatureFlags::default());

        let outcome = retriever
            .retrieve("airship", "owner-a", Some(Uuid::new_v4()), 5)
            .await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.degraded);
    }

    #[tokio::test]
    async fn agent_link_lookup_failure_degrades_without_searching() {
        struct FailingLinks;

        #[async_trait]
        impl DocumentStore for FailingLinks {
            async fn insert_document(
                &self,
                _: &str,
                _: &str,
                _: DocumentType,
                _: JsonValue,
            ) -> anyhow::Result<Uuid> {
                unreachable!()
            }
            async fn insert_chunks(&self, _: Uuid, _: Vec<NewChunk>) -> anyhow::Result<()> {
                unreachable!()
            }
            async fn delete_document(&self, _: &str, _: Uuid) -> anyhow::Result<bool> {
                unreachable!()
            }
            async fn list_documents(&self, _: &str) -> anyhow::Result<Vec<DocumentSummary>> {
                unreachable!()
            }
            async fn get_document(&self, _: &str, _: Uuid) -> anyhow::Result<Option<Document>> {
                unreachable!()
            }
            async fn vector_search(
                &self,
                _: &str,
                _: &[f32],
                _: f32,
                _: usize,
                _: Option<&[Uuid]>,
            ) -> anyhow::Result<Vec<ChunkHit>> {
                unreachable!()
            }
            async fn get_all_chunks(&self, _: &str) -> anyhow::Result<Vec<CorpusChunk>> {
                unreachable!()
            }
            async fn link_agent_documents(&self, _: Uuid, _: &[Uuid]) -> anyhow::Result<()> {
                unreachable!()
            }
            async fn unlink_agent_document(&self, _: Uuid, _: Uuid) -> anyhow::Result<()> {
                unreachable!()
            }
            async fn list_agent_documents(&self, _: Uuid) -> anyhow::Result<Vec<Uuid>> {
                Err(anyhow::anyhow!("link store unavailable"))
            }
            async fn record_processing_stats(&self, _: ProcessingStat) -> anyhow::Result<()> {
                unreachable!()
            }
            async fn stats_summary(&self, _: &str) -> anyhow::Result<StatsSummary> {
                unreachable!()
            }
            async fn create_agent(&self, _: Agent) -> anyhow::Result<Agent> {
                unreachable!()
            }
            async fn list_agents(&self, _: &str) -> anyhow::Result<Vec<Agent>> {
                unreachable!()
            }
            async fn delete_agent(&self, _: &str, _: Uuid) -> anyhow::Result<bool> {
                unreachable!()
            }
        }

        let store: Arc<dyn DocumentStore> = Arc::new(FailingLinks);
        let embedding = test_embedding_service("http://127.0.0.1:1".to_string());
        let retriever =
            test_retriever(store, embedding, RagConfig::default(), FeatureFlags::default());

        let outcome = retriever
            .retrieve("airship", "owner-a", Some(Uuid::new_v4()), 5)
            .await;
        assert!(outcome.results.is_empty());
        assert!(outcome.degraded);
    }

    #[tokio::test]
    async fn empty_query_short_circuits_without_searching() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let embedding = test_embedding_service("http://127.0.0.1:1".to_string());
        let retriever =
            test_retriever(store, embedding, RagConfig::default(), FeatureFlags::default());

        let outcome = retriever.retrieve("   ", "owner-a", None, 5).await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.degraded);
    }

    #[tokio::test]
    async fn embedding_failure_degrades_retrieval() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let embedding = test_embedding_service("http://127.0.0.1:1".to_string());
        let retriever =
            test_retriever(store, embedding, RagConfig::default(), FeatureFlags::default());

        let outcome = retriever.retrieve("airship", "owner-a", None, 5).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.degraded);
    }

    #[tokio::test]
    async fn agent_scoping_restricts_results_to_linked_documents() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let allowed_doc = store
            .insert_document("owner-a", "Allowed", DocumentType::Text, json!({}))
            .await
            .unwrap();
        let blocked_doc = store
            .insert_document("owner-a", "Blocked", DocumentType::Text, json!({}))
            .await
            .unwrap();
        store
            .insert_chunks(allowed_doc, vec![chunk("airship fleet maintenance")])
            .await
            .unwrap();
        store
            .insert_chunks(blocked_doc, vec![chunk("also matches the query vector")])
            .await
            .unwrap();

        let agent_id = Uuid::new_v4();
        store
            .link_agent_documents(agent_id, &[allowed_doc])
            .await
            .unwrap();

        let base_url = spawn_embedding_stub().await;
        let embedding = test_embedding_service(base_url);
        let retriever = test_retriever(
            store,
            embedding,
            RagConfig::default(),
            FeatureFlags::default(),
        );

        let outcome = retriever
            .retrieve("airship", "owner-a", Some(agent_id), 5)
            .await;
        assert!(!outcome.degraded);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].document_id, allowed_doc);
    }

    #[tokio::test]
    async fn owner_isolation_never_crosses_scope() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let owner_a_doc = store
            .insert_document("owner-a", "Doc A", DocumentType::Text, json!({}))
            .await
            .unwrap();
        let owner_b_doc = store
            .insert_document("owner-b", "Doc B", DocumentType::Text, json!({}))
            .await
            .unwrap();
        store
            .insert_chunks(owner_a_doc, vec![chunk("owner a content")])
            .await
            .unwrap();
        store
            .insert_chunks(owner_b_doc, vec![chunk("owner b content")])
            .await
            .unwrap();

        let base_url = spawn_embedding_stub().await;
        let embedding = test_embedding_service(base_url);
        let retriever = test_retriever(
            store,
            embedding,
            RagConfig::default(),
            FeatureFlags::default(),
        );

        let outcome = retriever.retrieve("content", "owner-a", None, 5).await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].document_id, owner_a_doc);
    }

    /// Delegates everything to a real `MemoryStore` except `vector_search`,
    /// which sleeps first — lets a test force the vector path past the
    /// search deadline without needing a real slow backend.
    struct SlowStore {
        inner: Arc<MemoryStore>,
        delay: Duration,
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn insert_document(
            &self,
            owner_id: &str,
            title: &str,
            doc_type: DocumentType,
            metadata: JsonValue,
        ) -> anyhow::Result<Uuid> {
            self.inner.insert_document(owner_id, title, doc_type, metadata).await
        }
        async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> anyhow::Result<()> {
            self.inner.insert_chunks(document_id, chunks).await
        }
        async fn delete_document(&self, owner_id: &str, document_id: Uuid) -> anyhow::Result<bool> {
            self.inner.delete_document(owner_id, document_id).await
        }
        async fn list_documents(&self, owner_id: &str) -> anyhow::Result<Vec<DocumentSummary>> {
            self.inner.list_documents(owner_id).await
        }
        async fn get_document(&self, owner_id: &str, document_id: Uuid) -> anyhow::Result<Option<Document>> {
            self.inner.get_document(owner_id, document_id).await
        }
        async fn vector_search(
            &self,
            owner_id: &str,
            query_vector: &[f32],
            threshold: f32,
            k: usize,
            allowed_document_ids: Option<&[Uuid]>,
        ) -> anyhow::Result<Vec<ChunkHit>> {
            tokio::time::sleep(self.delay).await;
            self.inner
                .vector_search(owner_id, query_vector, threshold, k, allowed_document_ids)
                .await
        }
        async fn get_all_chunks(&self, owner_id: &str) -> anyhow::Result<Vec<CorpusChunk>> {
            self.inner.get_all_chunks(owner_id).await
        }
        async fn link_agent_documents(&self, agent_id: Uuid, document_ids: &[Uuid]) -> anyhow::Result<()> {
            self.inner.link_agent_documents(agent_id, document_ids).await
        }
        async fn unlink_agent_document(&self, agent_id: Uuid, document_id: Uuid) -> anyhow::Result<()> {
            self.inner.unlink_agent_document(agent_id, document_id).await
        }
        async fn list_agent_documents(&self, agent_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
            self.inner.list_agent_documents(agent_id).await
        }
        async fn record_processing_stats(&self, stat: ProcessingStat) -> anyhow::Result<()> {
            self.inner.record_processing_stats(stat).await
        }
        async fn stats_summary(&self, owner_id: &str) -> anyhow::Result<StatsSummary> {
            self.inner.stats_summary(owner_id).await
        }
        async fn create_agent(&self, agent: Agent) -> anyhow::Result<Agent> {
            self.inner.create_agent(agent).await
        }
        async fn list_agents(&self, owner_id: &str) -> anyhow::Result<Vec<Agent>> {
            self.inner.list_agents(owner_id).await
        }
        async fn delete_agent(&self, owner_id: &str, agent_id: Uuid) -> anyhow::Result<bool> {
            self.inner.delete_agent(owner_id, agent_id).await
        }
    }

    #[tokio::test]
    async fn vector_search_exceeding_deadline_degrades_instead_of_blocking() {
        let inner = Arc::new(MemoryStore::new());
        let doc_id = inner
            .insert_document("owner-a", "Doc A", DocumentType::Text, json!({}))
            .await
            .unwrap();
        inner
            .insert_chunks(doc_id, vec![chunk("airship fleet maintenance")])
            .await
            .unwrap();

        let slow_store: Arc<dyn DocumentStore> = Arc::new(SlowStore {
            inner,
            delay: Duration::from_millis(300),
        });

        let base_url = spawn_embedding_stub().await;
        let embedding = test_embedding_service(base_url);
        let mut config = RagConfig::default();
        config.search_deadline_ms = 20;

        let retriever = test_retriever(slow_store, embedding, config, FeatureFlags::default());
        let outcome = retriever.retrieve("airship", "owner-a", None, 5).await;

        assert!(outcome.degraded);
        assert!(outcome.results.is_empty());
    }
}
