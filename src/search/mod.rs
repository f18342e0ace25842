pub mod bm25;
pub mod reranker;
pub mod rrf;

pub use bm25::{Bm25Hit, Bm25Registry};
pub use reranker::Reranker;
pub use rrf::{reciprocal_rank_fusion, FusedHit};
