use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::rrf::FusedHit;
use crate::config::RerankerConfig;
use crate::utils::limiters::Limiters;

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Client for an optional cross-encoder reranker (spec §4.8, C8). Rescans
/// the shortlist of `rerank_shortlist_cap` RRF-fused candidates and returns
/// them reordered by the cross-encoder's relevance score.
///
/// A reranker failure never fails the request — the caller falls back to
/// the RRF ordering it already had (spec §4.8 graceful degradation).
#[derive(Clone)]
pub struct Reranker {
    client: Client,
    config: RerankerConfig,
    limiters: Arc<Limiters>,
}

impl Reranker {
    pub fn new(config: RerankerConfig, limiters: Arc<Limiters>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
            limiters,
        }
    }

    /// `GET /health`-style probe used at startup to decide whether reranking
    /// is usable before the feature flag is trusted (spec §6).
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Rescoring a shortlist of RRF-fused candidates. Returns the
    /// candidates reordered by cross-encoder relevance, each paired with its
    /// relevance score — `None` when the reranker call failed and the
    /// original fused order was kept instead (spec §4.8 graceful
    /// degradation; the caller's fused ordering is still meaningful).
    pub async fn rerank(&self, query: &str, candidates: Vec<FusedHit>) -> Vec<(FusedHit, Option<f32>)> {
        if candidates.is_empty() {
            return Vec::new();
        }

        match self.rerank_inner(query, &candidates).await {
            Ok(scored_order) => reorder(candidates, scored_order),
            Err(e) => {
                warn!(error = %e, "reranker call failed, falling back to fused order");
                candidates.into_iter().map(|c| (c, None)).collect()
            }
        }
    }

    async fn rerank_inner(&self, query: &str, candidates: &[FusedHit]) -> Result<Vec<(usize, f32)>> {
        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.rerank.clone(),
            self.limiters.acquire_timeout,
            "rerank",
        )
        .await?;
        debug!(wait_ms = wait.as_millis() as u64, op = "rerank", "wait_queue");

        let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        let request = RerankRequest {
            model: &self.config.model,
            query,
            documents,
        };

        let url = format!("{}/v1/rerank", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("connecting to reranker server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("reranker API error ({status}): {body}");
        }

        let mut body: RerankResponse = response.json().await.context("parsing reranker response")?;

        body.results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.index.cmp(&b.index))
        });

        Ok(body
            .results
            .into_iter()
            .map(|r| (r.index, r.relevance_score))
            .collect())
    }
}

/// Reorders `candidates` per `order` (a permutation of indices into the
/// original vector, each paired with its relevance score). Any index the
/// reranker didn't return (a malformed or partial response) is appended in
/// its original order at the end, scoreless, so no candidate is silently
/// dropped.
fn reorder(candidates: Vec<FusedHit>, order: Vec<(usize, f32)>) -> Vec<(FusedHit, Option<f32>)> {
    let mut slots: Vec<Option<FusedHit>> = candidates.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());

    for (idx, score) in order {
        if let Some(slot) = slots.get_mut(idx) {
            if let Some(hit) = slot.take() {
                out.push((hit, Some(score)));
            }
        }
    }
    for slot in slots.into_iter().flatten() {
        out.push((slot, None));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn hit(score: f32) -> FusedHit {
        FusedHit {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            content: "x".to_string(),
            rrf_score: score,
        }
    }

    #[test]
    fn reorder_applies_permutation_and_carries_scores() {
        let candidates = vec![hit(0.1), hit(0.2), hit(0.3)];
        let ids = [candidates[0].chunk_id, candidates[1].chunk_id, candidates[2].chunk_id];

        let reordered = reorder(candidates, vec![(2, 0.9), (0, 0.5), (1, 0.1)]);
        assert_eq!(reordered[0].0.chunk_id, ids[2]);
        assert_eq!(reordered[0].1, Some(0.9));
        assert_eq!(reordered[1].0.chunk_id, ids[0]);
        assert_eq!(reordered[2].0.chunk_id, ids[1]);
    }

    #[test]
    fn reorder_appends_indices_missing_from_order_with_no_score() {
        let candidates = vec![hit(0.1), hit(0.2), hit(0.3)];
        let ids = [candidates[0].chunk_id, candidates[1].chunk_id, candidates[2].chunk_id];

        let reordered = reorder(candidates, vec![(1, 0.7)]);
        assert_eq!(reordered.len(), 3);
        assert_eq!(reordered[0].0.chunk_id, ids[1]);
        assert_eq!(reordered[0].1, Some(0.7));
        assert_eq!(reordered[1].1, None);
    }
}
