use std::collections::HashMap;
use uuid::Uuid;

/// One fused candidate ready for reranking or direct return (spec §4.9).
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub rrf_score: f32,
}

/// Reciprocal Rank Fusion of a dense-vector ranking and a BM25 ranking
/// (spec §4.9). Each input is assumed already sorted best-first; `k_rrf`
/// is the RRF damping constant (spec default 60).
///
/// Chunks absent from one ranking still score — RRF only uses rank, not
/// raw similarity, so a BM25-only or vector-only hit is never penalized
/// below every hit present in both.
///
/// Ties are broken by `chunk_id` ascending (SPEC_FULL 4.9a) so fusion is
/// deterministic regardless of hash-map iteration order upstream.
pub fn reciprocal_rank_fusion<T>(
    rankings: &[Vec<T>],
    k_rrf: u32,
    id_of: impl Fn(&T) -> Uuid,
    to_hit: impl Fn(&T) -> (Uuid, String),
) -> Vec<FusedHit> {
    let mut scores: HashMap<Uuid, f32> = HashMap::new();
    let mut payload: HashMap<Uuid, (Uuid, String)> = HashMap::new();

    for ranking in rankings {
        for (rank, item) in ranking.iter().enumerate() {
            let id = id_of(item);
            let contribution = 1.0 / (k_rrf as f32 + (rank + 1) as f32);
            *scores.entry(id).or_insert(0.0) += contribution;
            payload.entry(id).or_insert_with(|| to_hit(item));
        }
    }

    let mut fused: Vec<FusedHit> = scores
        .into_iter()
        .map(|(chunk_id, rrf_score)| {
            let (document_id, content) = payload.remove(&chunk_id).expect("payload recorded above");
            FusedHit {
                chunk_id,
                document_id,
                content,
                rrf_score,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    fused
}
