use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::chunker::Chunk;
use crate::config::ContextualConfig;
use crate::database::models::TokenUsage;
use crate::services::summarizer_service::SummarizerService;

/// Per-chunk enrichment outcome: `None` means the chunk is indexed raw,
/// either because contextualization is disabled, the document or daily
/// budget was exhausted, or the summarizer call failed (spec §4.3, §4.6:
/// contextualization failure degrades, it never fails ingestion).
pub struct ContextualizedChunk {
    pub chunk_index: i32,
    pub content: String,
    pub contextual_content: Option<String>,
}

#[derive(Default)]
pub struct ContextualizationOutcome {
    pub chunks: Vec<ContextualizedChunk>,
    pub processed_chunks: usize,
    pub failed_chunks: usize,
    pub tokens: TokenUsage,
    pub cost_estimate_usd: f64,
}

enum ChunkOutcome {
    Contextualized(String, TokenUsage),
    Skipped,
    Failed,
}

struct DailyCounter {
    day: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn try_reserve(&mut self, today: NaiveDate, max: u32) -> bool {
        if self.day != today {
            self.day = today;
            self.count = 0;
        }
        if self.count >= max {
            return false;
        }
        self.count += 1;
        true
    }
}

/// Tracks the daily request budget and dispatches chunk enrichment either
/// streamed (bounded concurrency, below `batch_threshold`) or as a single
/// joined batch (spec §4.3, SPEC_FULL 4.3a).
pub struct Contextualizer {
    summarizer: SummarizerService,
    cfg: ContextualConfig,
    daily: Mutex<DailyCounter>,
}

impl Contextualizer {
    pub fn new(summarizer: SummarizerService, cfg: ContextualConfig) -> Self {
        Self {
            summarizer,
            cfg,
            daily: Mutex::new(DailyCounter {
                day: Utc::now().date_naive(),
                count: 0,
            }),
        }
    }

    /// `true` if the daily request budget still has room; reserves one
    /// request atomically if so. Resets the counter across a UTC day
    /// boundary.
    fn try_reserve_daily_request(&self) -> bool {
        self.daily
            .lock()
            .try_reserve(Utc::now().date_naive(), self.cfg.max_daily_requests)
    }

    pub async fn contextualize_document(
        &self,
        document_content: &str,
        chunks: Vec<Chunk>,
    ) -> ContextualizationOutcome {
        let mut outcome = ContextualizationOutcome::default();
        let mut cumulative_tokens: u64 = 0;

        let results: Vec<(Chunk, ChunkOutcome)> = if chunks.len() >= self.cfg.batch_threshold {
            self.dispatch_batch(document_content, chunks, &mut cumulative_tokens)
                .await
        } else {
            self.dispatch_streaming(document_content, chunks, &mut cumulative_tokens)
                .await
        };

        for (chunk, result) in results {
            let contextual_content = match result {
                ChunkOutcome::Contextualized(context, tokens) => {
                    outcome.tokens.add(tokens);
                    outcome.cost_estimate_usd += self.summarizer.estimate_cost(&tokens);
                    outcome.processed_chunks += 1;
                    // spec §4.3: the stored enrichment is "<context>\n<original chunk>".
                    Some(format!("{context}\n{}", chunk.content))
                }
                ChunkOutcome::Skipped => None,
                ChunkOutcome::Failed => {
                    outcome.failed_chunks += 1;
                    None
                }
            };

            outcome.chunks.push(ContextualizedChunk {
                chunk_index: chunk.chunk_index,
                content: chunk.content,
                contextual_content,
            });
        }

        outcome
    }

    /// Below `batch_threshold`: dispatch per-chunk calls with bounded
    /// concurrency, stopping early once the per-document token cap is hit.
    async fn dispatch_streaming(
        &self,
        document_content: &str,
        chunks: Vec<Chunk>,
        cumulative_tokens: &mut u64,
    ) -> Vec<(Chunk, ChunkOutcome)> {
        let mut out = Vec::with_capacity(chunks.len());

        for group in chunks.chunks(self.cfg.streaming_concurrency) {
            if *cumulative_tokens >= self.cfg.max_tokens_per_document {
                for chunk in group {
                    out.push((chunk.clone(), ChunkOutcome::Skipped));
                }
                continue;
            }

            let futures: Vec<_> = group
                .iter()
                .map(|chunk| self.contextualize_one(document_content, chunk))
                .collect();

            let results = join_all(futures).await;
            for (chunk, result) in group.iter().zip(results) {
                if let ChunkOutcome::Contextualized(_, tokens) = &result {
                    *cumulative_tokens += tokens.input + tokens.output;
                }
                out.push((chunk.clone(), result));
            }
        }

        out
    }

    /// At/above `batch_threshold`: dispatch the document's chunks in large
    /// joined windows rather than `streaming_concurrency`-sized ones (the
    /// batch endpoint isn't subject to the same per-request concurrency
    /// limit), but still enforce `max_tokens_per_document` between windows
    /// exactly like `dispatch_streaming` — the cap applies to every
    /// dispatch path, not just the streaming one (spec §4.3).
    async fn dispatch_batch(
        &self,
        document_content: &str,
        chunks: Vec<Chunk>,
        cumulative_tokens: &mut u64,
    ) -> Vec<(Chunk, ChunkOutcome)> {
        const BATCH_WINDOW: usize = 25;

        let mut out = Vec::with_capacity(chunks.len());

        for group in chunks.chunks(BATCH_WINDOW) {
            if *cumulative_tokens >= self.cfg.max_tokens_per_document {
                for chunk in group {
                    out.push((chunk.clone(), ChunkOutcome::Skipped));
                }
                continue;
            }

            let futures: Vec<_> = group
                .iter()
                .map(|chunk| self.contextualize_one(document_content, chunk))
                .collect();

            let results = join_all(futures).await;
            for (chunk, result) in group.iter().zip(results) {
                if let ChunkOutcome::Contextualized(_, tokens) = &result {
                    *cumulative_tokens += tokens.input + tokens.output;
                }
                out.push((chunk.clone(), result));
            }
        }

        out
    }

    async fn contextualize_one(&self, document_content: &str, chunk: &Chunk) -> ChunkOutcome {
        if !self.try_reserve_daily_request() {
            warn!("daily contextualization request budget exhausted, indexing chunk raw");
            return ChunkOutcome::Skipped;
        }

        match self
            .summarizer
            .contextualize_chunk(document_content, &chunk.content)
            .await
        {
            Ok(result) => ChunkOutcome::Contextualized(result.context, result.tokens),
            Err(e) => {
                warn!(error = %e, "contextualization failed for chunk, indexing raw");
                ChunkOutcome::Failed
            }
        }
    }
}

pub fn log_outcome(document_title: &str, outcome: &ContextualizationOutcome) {
    info!(
        document = document_title,
        processed = outcome.processed_chunks,
        failed = outcome.failed_chunks,
        cost_usd = outcome.cost_estimate_usd,
        "contextualization complete"
    );
}
