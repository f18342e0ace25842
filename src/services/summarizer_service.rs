use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::database::models::TokenUsage;
use crate::utils::limiters::Limiters;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Token accounting from the summarizer response. Cache fields follow the
/// Anthropic prompt-cache naming; OpenAI-compatible servers that don't
/// support caching simply omit them and `#[serde(default)]` fills zeros.
#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

/// A document's enriching context for one chunk, plus the token cost of
/// producing it (spec §4.3).
pub struct ContextualizationResult {
    pub context: String,
    pub tokens: TokenUsage,
}

/// Client for the LLM backend that generates chunk-enriching context
/// (spec §4.3). A distinct backend from [`crate::services::embedding_service::EmbeddingService`],
/// gated by its own limiter so a slow summarizer never blocks embeddings.
#[derive(Clone)]
pub struct SummarizerService {
    client: Client,
    config: SummarizerConfig,
    limiters: Arc<Limiters>,
}

const SYSTEM_PROMPT: &str = "You write a short piece of context that situates a chunk within its \
source document, for the purpose of improving search retrieval of the chunk. \
Answer only with the succinct context, nothing else.";

impl SummarizerService {
    pub fn new(config: SummarizerConfig, limiters: Arc<Limiters>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
            limiters,
        }
    }

    /// Generates the contextualizing text for a single chunk given the
    /// whole document it came from. `document_content` is repeated as the
    /// first message on every call within a document's processing run so
    /// the backend's prompt cache (when present) can reuse it.
    pub async fn contextualize_chunk(
        &self,
        document_content: &str,
        chunk_content: &str,
    ) -> Result<ContextualizationResult> {
        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.contextualization.clone(),
            self.limiters.acquire_timeout,
            "contextualization",
        )
        .await?;
        debug!(wait_ms = wait.as_millis() as u64, op = "contextualization", "wait_queue");

        let user_content = format!(
            "<document>\n{document_content}\n</document>\n\nHere is the chunk we want to situate \
             within the whole document:\n<chunk>\n{chunk_content}\n</chunk>"
        );

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_content,
                },
            ],
            max_tokens: self.config.max_output_tokens,
            temperature: 0.0,
        };

        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let mut request_builder = self.client.post(&url);
        if let Some(key) = &self.config.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = request_builder
            .json(&request)
            .send()
            .await
            .context("connecting to summarizer server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("summarizer API error ({status}): {body}");
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .context("parsing summarizer response")?;

        let context = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("empty choices array from summarizer")?;

        Ok(ContextualizationResult {
            context,
            tokens: TokenUsage {
                input: body.usage.prompt_tokens,
                output: body.usage.completion_tokens,
                cache_creation: body.usage.cache_creation_input_tokens,
                cache_read: body.usage.cache_read_input_tokens,
            },
        })
    }

    /// USD cost of a token usage tally, per the configured per-1K prices
    /// (spec §4.3 cost estimate).
    pub fn estimate_cost(&self, tokens: &TokenUsage) -> f64 {
        (tokens.input as f64 / 1000.0) * self.config.price_per_1k_input
            + (tokens.output as f64 / 1000.0) * self.config.price_per_1k_output
            + (tokens.cache_creation as f64 / 1000.0) * self.config.price_per_1k_cache_creation
            + (tokens.cache_read as f64 / 1000.0) * self.config.price_per_1k_cache_read
    }
}
