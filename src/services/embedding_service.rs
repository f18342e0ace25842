use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::utils::error::ApiError;
use crate::utils::limiters::Limiters;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for the embedding backend (spec §4.4). Embeddings are cached by
/// input text for the lifetime of the process and every call is gated by
/// the embedding limiter so a slow backend degrades to backpressure rather
/// than unbounded concurrency.
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    pub dimension: usize,
    model_name: String,
    cache: Arc<RwLock<HashMap<String, Vec<f32>>>>,
    limiters: Arc<Limiters>,
    batch_size: usize,
    api_key: Option<String>,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig, limiters: Arc<Limiters>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url,
            dimension: config.dimension,
            model_name: config.model,
            cache: Arc::new(RwLock::new(HashMap::new())),
            limiters,
            batch_size: config.batch_size,
            api_key: config.api_key,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        self.embed_internal(text)
            .await
            .map_err(|e| ApiError::BackendError(e.to_string()))
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        {
            let cache = self.cache.read().await;
            if let Some(embedding) = cache.get(text) {
                debug!("embedding cache hit ({} chars)", text.len());
                return Ok(embedding.clone());
            }
        }

        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.embedding.clone(),
            self.limiters.acquire_timeout,
            "embedding",
        )
        .await?;
        debug!(wait_ms = wait.as_millis() as u64, op = "embedding", "wait_queue");

        let exec_start = Instant::now();
        let embedding = self.request_with_retry(text).await?;
        debug!(exec_ms = exec_start.elapsed().as_millis() as u64, op = "embedding", "exec");

        if embedding.len() != self.dimension {
            anyhow::bail!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        self.cache
            .write()
            .await
            .insert(text.to_string(), embedding.clone());

        Ok(embedding)
    }

    /// Up to [`MAX_ATTEMPTS`] tries with exponential backoff before the
    /// failure is surfaced (spec §4.4).
    async fn request_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.request_once(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    warn!(attempt, error = %e, "embedding request failed");
                    last_err = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt - 1)))
                            .await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding request failed")))
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: text.to_string(),
            model: self.model_name.clone(),
        };

        let url = format!("{}/v1/embeddings", self.base_url);
        let mut request_builder = self.client.post(&url);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = request_builder
            .json(&request)
            .send()
            .await
            .context("connecting to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("embedding API error ({status}): {body}");
        }

        let response_body: EmbeddingResponse = response
            .json()
            .await
            .context("parsing embedding response")?;

        let embedding = response_body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("empty data array from embedding server")?;

        if embedding.is_empty() {
            anyhow::bail!("generated embedding vector is empty");
        }

        Ok(embedding)
    }

    /// Batches `texts` into groups of `batch_size`, embedding each group
    /// concurrently. A single failure aborts the whole batch (spec §4.4):
    /// partial ingestion is the caller's concern, not this service's.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ApiError> {
        use futures::future::join_all;

        let mut all_results = Vec::with_capacity(texts.len());

        for group in texts.chunks(self.batch_size) {
            let futures: Vec<_> = group
                .iter()
                .map(|text| {
                    let service = self.clone();
                    let t = text.clone();
                    async move { service.embed(&t).await }
                })
                .collect();

            for result in join_all(futures).await {
                all_results.push(result?);
            }
        }

        Ok(all_results)
    }
}
