use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{DocumentMeta, MetadataCache};
use crate::config::{FeatureFlags, RagConfig};
use crate::database::models::{DocumentSummary, DocumentType, NewChunk};
use crate::database::store::DocumentStore;
use crate::document::{contextualizer::log_outcome, Chunk, Contextualizer, DocumentParser, TextChunker};
use crate::logging::ActivityLogger;
use crate::search::Bm25Registry;
use crate::services::EmbeddingService;
use crate::utils::error::ApiError;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
/// Ingestion's soft wall-clock budget (spec §5). Exceeding it never fails
/// the upload — it only earns a warning log so an operator notices a slow
/// backend before it becomes a timeout.
const INGEST_SOFT_DEADLINE_SECS: u64 = 120;

pub struct IngestResult {
    pub document_id: Uuid,
    pub chunks_created: usize,
    pub contextualized_chunks: usize,
}

/// Orchestrates the ingest pipeline end to end (spec §4, C1-C7): parse,
/// chunk, optionally contextualize, embed, persist, then publish the new
/// chunks to the BM25 index and metadata cache so they're immediately
/// visible to retrieval.
pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
    embedding: Arc<EmbeddingService>,
    contextualizer: Option<Arc<Contextualizer>>,
    chunker: Arc<TextChunker>,
    bm25: Arc<Bm25Registry>,
    metadata_cache: Arc<MetadataCache>,
    activity: Arc<ActivityLogger>,
    features: FeatureFlags,
}

impl DocumentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedding: Arc<EmbeddingService>,
        contextualizer: Option<Arc<Contextualizer>>,
        chunker: Arc<TextChunker>,
        bm25: Arc<Bm25Registry>,
        metadata_cache: Arc<MetadataCache>,
        activity: Arc<ActivityLogger>,
        features: FeatureFlags,
    ) -> Self {
        Self {
            store,
            embedding,
            contextualizer,
            chunker,
            bm25,
            metadata_cache,
            activity,
            features,
        }
    }

    /// Ingests one uploaded document for `owner_id`. `doc_type` is inferred
    /// from `file_name`'s extension when not supplied. Chunking, embedding,
    /// and (optionally) contextualization all happen before anything is
    /// persisted, so a failure at any stage leaves the store untouched.
    pub async fn ingest_document(
        &self,
        owner_id: &str,
        title: &str,
        file_name: &str,
        bytes: Vec<u8>,
        doc_type: Option<DocumentType>,
        config: &RagConfig,
    ) -> Result<IngestResult, ApiError> {
        let start = Instant::now();

        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::PayloadTooLarge(format!(
                "file is {} bytes, max is {MAX_UPLOAD_BYTES}",
                bytes.len()
            )));
        }
        if bytes.is_empty() {
            return Err(ApiError::InvalidInput("file is empty".to_string()));
        }

        let doc_type = match doc_type {
            Some(t) => t,
            None => DocumentParser::infer_type(file_name)?,
        };
        validate_file_content(&bytes, doc_type)?;

        let parsed = DocumentParser::parse(&bytes, doc_type)?;
        let chunks = self.chunker.chunk(&parsed.content);
        if chunks.is_empty() {
            return Err(ApiError::InvalidInput(
                "document produced no chunks".to_string(),
            ));
        }

        let (enriched, processed, failed, tokens, cost) = self
            .contextualize_if_enabled(&parsed.content, chunks)
            .await;

        let texts: Vec<String> = enriched
            .iter()
            .map(|c| {
                c.contextual_content
                    .clone()
                    .unwrap_or_else(|| c.content.clone())
            })
            .collect();
        let embeddings = self.embedding.embed_batch(texts).await?;

        let new_chunks: Vec<NewChunk> = enriched
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewChunk {
                chunk_index: chunk.chunk_index,
                is_contextualized: chunk.contextual_content.is_some(),
                content: chunk.content,
                contextual_content: chunk.contextual_content,
                embedding,
                metadata: json!({}),
            })
            .collect();

        let document_id = self
            .store
            .insert_document(
                owner_id,
                title,
                doc_type,
                json!({ "page_count": parsed.page_count }),
            )
            .await
            .map_err(ApiError::from)?;

        let chunks_created = new_chunks.len();
        if let Err(e) = self.store.insert_chunks(document_id, new_chunks).await {
            // Ingest is transactional end to end (spec §4.5, §7): a document
            // whose chunks fail to land must not remain as an orphan row.
            if let Err(cleanup_err) = self.store.delete_document(owner_id, document_id).await {
                warn!(
                    document_id = %document_id,
                    error = %cleanup_err,
                    "failed to roll back orphaned document after chunk insert failure"
                );
            }
            return Err(ApiError::from(e));
        }

        if processed > 0 || failed > 0 {
            self.store
                .record_processing_stats(crate::database::models::ProcessingStat {
                    document_id,
                    owner_id: owner_id.to_string(),
                    total_chunks: chunks_created,
                    processed_chunks: processed,
                    failed_chunks: failed,
                    tokens,
                    processing_time_seconds: start.elapsed().as_secs_f64(),
                    cost_estimate_usd: cost,
                    created_at: chrono::Utc::now(),
                })
                .await
                .map_err(ApiError::from)?;

            if failed > 0 {
                self.activity.contextualization_degraded(
                    owner_id,
                    document_id,
                    format!("{failed} of {chunks_created} chunks fell back to raw indexing"),
                );
            }
        }

        self.rebuild_bm25(owner_id).await;
        self.metadata_cache.set(
            owner_id,
            document_id,
            DocumentMeta {
                title: title.to_string(),
                doc_type,
            },
        );
        self.activity.document_ingested(
            owner_id,
            document_id,
            format!("{chunks_created} chunks, {processed} contextualized"),
        );

        let elapsed = start.elapsed();
        if elapsed.as_secs() > INGEST_SOFT_DEADLINE_SECS {
            warn!(
                document_id = %document_id,
                elapsed_secs = elapsed.as_secs(),
                "ingest exceeded soft deadline"
            );
        }
        info!(document_id = %document_id, chunks = chunks_created, "document ingested");

        Ok(IngestResult {
            document_id,
            chunks_created,
            contextualized_chunks: processed,
        })
    }

    async fn contextualize_if_enabled(
        &self,
        document_content: &str,
        chunks: Vec<Chunk>,
    ) -> (
        Vec<crate::document::ContextualizedChunk>,
        usize,
        usize,
        crate::database::models::TokenUsage,
        f64,
    ) {
        let Some(contextualizer) = self
            .contextualizer
            .as_ref()
            .filter(|_| self.features.enable_contextual_retrieval)
        else {
            let raw = chunks
                .into_iter()
                .map(|c| crate::document::ContextualizedChunk {
                    chunk_index: c.chunk_index,
                    content: c.content,
                    contextual_content: None,
                })
                .collect();
            return (raw, 0, 0, Default::default(), 0.0);
        };

        let outcome = contextualizer
            .contextualize_document(document_content, chunks)
            .await;
        log_outcome("document", &outcome);
        (
            outcome.chunks,
            outcome.processed_chunks,
            outcome.failed_chunks,
            outcome.tokens,
            outcome.cost_estimate_usd,
        )
    }

    async fn rebuild_bm25(&self, owner_id: &str) {
        match self.store.get_all_chunks(owner_id).await {
            Ok(corpus) => self.bm25.rebuild(owner_id, corpus),
            Err(e) => warn!(error = %e, owner_id, "failed to rebuild BM25 index after ingest"),
        }
    }

    pub async fn delete_document(&self, owner_id: &str, document_id: Uuid) -> Result<bool, ApiError> {
        let deleted = self
            .store
            .delete_document(owner_id, document_id)
            .await
            .map_err(ApiError::from)?;

        if deleted {
            self.metadata_cache.invalidate(owner_id, document_id);
            self.rebuild_bm25(owner_id).await;
            self.activity.document_deleted(owner_id, document_id);
        }

        Ok(deleted)
    }

    pub async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentSummary>, ApiError> {
        self.store.list_documents(owner_id).await.map_err(ApiError::from)
    }
}

/// Defends against a caller mislabeling a file's type (spec §4.1 "only pdf
/// and text, content-checked"). PDFs must actually start with the PDF
/// magic bytes; a payload `infer` confidently calls an executable is
/// rejected outright regardless of the declared type.
fn validate_file_content(data: &[u8], doc_type: DocumentType) -> Result<(), ApiError> {
    let kind = infer::get(data);

    if let Some(kind) = &kind {
        let mime = kind.mime_type();
        if matches!(
            mime,
            "application/x-executable" | "application/x-msdownload" | "application/x-elf"
        ) {
            return Err(ApiError::InvalidInput(
                "executable files are not accepted".to_string(),
            ));
        }

        match doc_type {
            DocumentType::Pdf if mime != "application/pdf" => {
                return Err(ApiError::InvalidInput(format!(
                    "declared type pdf does not match detected content type {mime}"
                )));
            }
            DocumentType::Text if !mime.starts_with("text/") => {
                return Err(ApiError::InvalidInput(format!(
                    "declared type text does not match detected content type {mime}"
                )));
            }
            _ => {}
        }
    } else if doc_type == DocumentType::Pdf {
        return Err(ApiError::InvalidInput(
            "could not recognize file content as a PDF".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_file_content_accepts_plain_text() {
        assert!(validate_file_content(b"hello world", DocumentType::Text).is_ok());
    }

    #[test]
    fn validate_file_content_rejects_pdf_declared_but_not_pdf_bytes() {
        assert!(validate_file_content(b"hello world", DocumentType::Pdf).is_err());
    }

    #[test]
    fn validate_file_content_accepts_real_pdf_header() {
        let bytes = b"%PDF-1.4\n%mock pdf content";
        assert!(validate_file_content(bytes, DocumentType::Pdf).is_ok());
    }
}
