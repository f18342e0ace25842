use std::sync::Arc;
use std::time::Instant;

use tracing::warn;
use uuid::Uuid;

use crate::cache::MetadataCache;
use crate::config::RagConfig;
use crate::database::store::DocumentStore;
use crate::logging::ActivityLogger;
use crate::services::retriever::Retriever;

/// The per-turn retrieval contract handed to the voice pipeline (spec
/// §4.10, C10): a single formatted block of context, or none at all.
pub struct ContextReply {
    pub context: String,
    pub has_context: bool,
}

/// Wraps the [`Retriever`] with citation formatting and a soft latency
/// budget (spec §4.10). Never fails the caller — a degraded or empty
/// retrieval simply yields `has_context: false`.
pub struct ContextService {
    retriever: Arc<Retriever>,
    metadata_cache: Arc<MetadataCache>,
    store: Arc<dyn DocumentStore>,
    activity: Arc<ActivityLogger>,
    config: RagConfig,
}

impl ContextService {
    pub fn new(
        retriever: Arc<Retriever>,
        metadata_cache: Arc<MetadataCache>,
        store: Arc<dyn DocumentStore>,
        activity: Arc<ActivityLogger>,
        config: RagConfig,
    ) -> Self {
        Self {
            retriever,
            metadata_cache,
            store,
            activity,
            config,
        }
    }

    pub async fn get_context(
        &self,
        query: &str,
        owner_id: &str,
        agent_id: Option<Uuid>,
    ) -> ContextReply {
        if query.trim().is_empty() {
            return ContextReply {
                context: String::new(),
                has_context: false,
            };
        }

        let start = Instant::now();
        let outcome = self
            .retriever
            .retrieve(query, owner_id, agent_id, self.config.top_k)
            .await;

        if outcome.degraded {
            self.activity
                .retrieval_degraded(owner_id, "one or more search paths failed or timed out");
        }

        let mut blocks = Vec::with_capacity(outcome.results.len());
        for hit in &outcome.results {
            let title = self.title_for(owner_id, hit.document_id).await;
            blocks.push(format!("From '{title}':\n{}", hit.content));
        }

        let mut context = blocks.join("\n\n");
        if context.chars().count() > self.config.max_context_chars {
            context = context.chars().take(self.config.max_context_chars).collect();
        }

        let elapsed = start.elapsed();
        if elapsed.as_millis() as u64 > self.config.context_soft_budget_ms {
            warn!(
                owner_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "context assembly exceeded its soft budget"
            );
        }

        ContextReply {
            has_context: !outcome.results.is_empty(),
            context,
        }
    }

    async fn title_for(&self, owner_id: &str, document_id: Uuid) -> String {
        if let Some(meta) = self.metadata_cache.get(owner_id, document_id) {
            return meta.title;
        }

        match self.store.get_document(owner_id, document_id).await {
            Ok(Some(doc)) => {
                self.metadata_cache.set(
                    owner_id,
                    document_id,
                    crate::cache::DocumentMeta {
                        title: doc.title.clone(),
                        doc_type: doc.doc_type,
                    },
                );
                doc.title
            }
            _ => "Unknown document".to_string(),
        }
    }
}
