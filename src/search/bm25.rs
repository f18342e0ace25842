use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::CorpusChunk;
use crate::utils::tokenize::tokenize;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// One chunk's tokenized form, kept alongside its length for BM25's length
/// normalization term.
struct IndexedChunk {
    chunk_id: Uuid,
    document_id: Uuid,
    content: String,
    term_freqs: HashMap<String, u32>,
    length: u32,
}

/// An owner's BM25 corpus: an immutable snapshot swapped in atomically on
/// every rebuild so concurrent readers never observe a half-built index
/// (spec §4.6, SPEC_FULL C-arc-swap).
struct BmCorpus {
    chunks: Vec<IndexedChunk>,
    postings: HashMap<String, Vec<usize>>,
    avg_length: f32,
}

impl BmCorpus {
    fn build(corpus_chunks: Vec<CorpusChunk>) -> Self {
        let mut chunks = Vec::with_capacity(corpus_chunks.len());
        let mut postings: HashMap<String, Vec<usize>> = HashMap::new();
        let mut total_len: u64 = 0;

        for chunk in corpus_chunks {
            let tokens = tokenize(&chunk.content);
            let length = tokens.len() as u32;
            total_len += length as u64;

            let mut term_freqs = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }

            let index = chunks.len();
            for term in term_freqs.keys() {
                postings.entry(term.clone()).or_default().push(index);
            }

            chunks.push(IndexedChunk {
                chunk_id: chunk.chunk_id,
                document_id: chunk.document_id,
                content: chunk.content,
                term_freqs,
                length,
            });
        }

        let avg_length = if chunks.is_empty() {
            0.0
        } else {
            total_len as f32 / chunks.len() as f32
        };

        Self {
            chunks,
            postings,
            avg_length,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.chunks.len() as f32;
        let df = self.postings.get(term).map(|v| v.len()).unwrap_or(0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Okapi BM25 score for `query` against every chunk that shares at
    /// least one term and passes `allowed_document_ids` (when present),
    /// ranked descending, capped at `k`. The allow-list is applied before
    /// truncation, matching the filter-then-limit shape of both
    /// `DocumentStore::vector_search` implementations (spec §4.6).
    fn search(
        &self,
        query: &str,
        k: usize,
        allowed_document_ids: Option<&[Uuid]>,
    ) -> Vec<(Uuid, Uuid, String, f32)> {
        if self.chunks.is_empty() {
            return Vec::new();
        }

        let query_terms = tokenize(query);
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for term in &query_terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(term);

            for &doc_idx in postings {
                let chunk = &self.chunks[doc_idx];
                if let Some(allowed) = allowed_document_ids {
                    if !allowed.contains(&chunk.document_id) {
                        continue;
                    }
                }
                let tf = *chunk.term_freqs.get(term).unwrap_or(&0) as f32;
                let norm = 1.0 - B + B * (chunk.length as f32 / self.avg_length.max(1.0));
                let score = idf * (tf * (K1 + 1.0)) / (tf + K1 * norm);
                *scores.entry(doc_idx).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);

        ranked
            .into_iter()
            .map(|(idx, score)| {
                let chunk = &self.chunks[idx];
                (chunk.chunk_id, chunk.document_id, chunk.content.clone(), score)
            })
            .collect()
    }
}

/// One BM25 hit, shaped like a vector hit so both feed the same RRF fusion
/// step (spec §4.6).
pub struct Bm25Hit {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub score: f32,
}

/// Owner-scoped registry of BM25 snapshots, published via `ArcSwap` so a
/// reader in the middle of a query never blocks a concurrent rebuild and
/// never observes a torn index (spec §4.6, §5 "lock-free reads").
#[derive(Default)]
pub struct Bm25Registry {
    corpora: DashMap<String, Arc<ArcSwap<BmCorpus>>>,
}

impl Bm25Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an owner's index in one atomic pointer swap. Call after
    /// ingest, delete, or contextualization completes for that owner
    /// (spec §4.6 rebuild triggers).
    pub fn rebuild(&self, owner_id: &str, corpus_chunks: Vec<CorpusChunk>) {
        let corpus = Arc::new(BmCorpus::build(corpus_chunks));
        match self.corpora.entry(owner_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => e.get().store(corpus),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Arc::new(ArcSwap::new(corpus)));
            }
        }
    }

    /// `None` if the owner has never had a corpus built (distinct from an
    /// empty corpus, which returns `Some(vec![])`). `allowed_document_ids`
    /// restricts the corpus before top-k truncation, not after, so an
    /// agent scoped to a small document subset still sees its true top-k
    /// rather than whatever survives the owner-wide ranking's cutoff.
    pub fn search(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
        allowed_document_ids: Option<&[Uuid]>,
    ) -> Option<Vec<Bm25Hit>> {
        let entry = self.corpora.get(owner_id)?;
        let snapshot = entry.load();
        Some(
            snapshot
                .search(query, k, allowed_document_ids)
                .into_iter()
                .map(|(chunk_id, document_id, content, score)| Bm25Hit {
                    chunk_id,
                    document_id,
                    content,
                    score,
                })
                .collect(),
        )
    }
}
