use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub summarizer: SummarizerConfig,
    pub reranker: RerankerConfig,
    pub rag: RagConfig,
    pub contextual: ContextualConfig,
    pub limits: LimitsConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub features: FeatureFlags,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
    pub batch_size: usize,
}

/// The summarizer LLM used by the Contextualizer (spec §4.3). A separate
/// backend from the embedding service, though in practice both may point at
/// the same inference server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SummarizerConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_output_tokens: usize,
    /// USD per 1K tokens, for `ProcessingStat.cost_estimate_usd`.
    pub price_per_1k_input: f64,
    pub price_per_1k_output: f64,
    pub price_per_1k_cache_read: f64,
    pub price_per_1k_cache_creation: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RerankerConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub candidate_multiplier: usize,
    pub rerank_shortlist_cap: usize,
    pub rrf_k: u32,
    pub search_deadline_ms: u64,
    pub context_soft_budget_ms: u64,
    pub max_context_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.3,
            chunk_size_tokens: 800,
            chunk_overlap_tokens: 80,
            candidate_multiplier: 3,
            rerank_shortlist_cap: 20,
            rrf_k: 60,
            search_deadline_ms: 150,
            context_soft_budget_ms: 400,
            max_context_chars: 4000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextualConfig {
    pub max_daily_requests: u32,
    pub max_tokens_per_document: u64,
    /// Chunk count at/above which ingest dispatches a batch job instead of
    /// streaming per-chunk calls (spec §4.3, §9 open question).
    pub batch_threshold: usize,
    pub streaming_concurrency: usize,
}

impl Default for ContextualConfig {
    fn default() -> Self {
        Self {
            max_daily_requests: 1_000,
            max_tokens_per_document: 200_000,
            batch_threshold: 10,
            streaming_concurrency: 4,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitsConfig {
    pub embedding_concurrency: usize,
    pub contextualization_concurrency: usize,
    pub db_search_concurrency: usize,
    pub rerank_concurrency: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            embedding_concurrency: 8,
            contextualization_concurrency: 4,
            db_search_concurrency: 16,
            rerank_concurrency: 4,
            acquire_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub metadata_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl_seconds: 300,
        }
    }
}

/// Feature flags named in spec §6. Absence of an environment variable means
/// the feature is off; the system must remain fully functional either way.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FeatureFlags {
    pub use_hybrid_search: bool,
    pub use_rerank: bool,
    pub enable_contextual_retrieval: bool,
}

impl FeatureFlags {
    /// Reads the exact environment variable names from spec §6, independent
    /// of the `APP__`-prefixed config overlay (those control tuning knobs;
    /// these are On/Off switches operators expect to set directly).
    pub fn from_env() -> Self {
        Self {
            use_hybrid_search: env_flag("USE_HYBRID_SEARCH"),
            use_rerank: env_flag("USE_RERANK"),
            enable_contextual_retrieval: env_flag("ENABLE_CONTEXTUAL_RETRIEVAL"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;

        // Named on/off switches (spec §6) overlay whatever the file/APP__
        // source produced — their exact, unprefixed names are load-bearing.
        if let Ok(v) = std::env::var("MAX_DAILY_CONTEXTUAL_REQUESTS") {
            if let Ok(n) = v.parse() {
                settings.contextual.max_daily_requests = n;
            }
        }
        if let Ok(v) = std::env::var("MAX_CONTEXTUAL_TOKENS_PER_DOCUMENT") {
            if let Ok(n) = v.parse() {
                settings.contextual.max_tokens_per_document = n;
            }
        }
        settings.features = FeatureFlags::from_env();

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_flags_default_off() {
        // No environment variables set: every flag is off, and the system
        // is expected to remain fully functional (spec §6).
        let flags = FeatureFlags::default();
        assert!(!flags.use_hybrid_search);
        assert!(!flags.use_rerank);
        assert!(!flags.enable_contextual_retrieval);
    }

    #[test]
    fn rag_config_default_matches_spec() {
        let rag = RagConfig::default();
        assert_eq!(rag.top_k, 5);
        assert!((rag.similarity_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(rag.rrf_k, 60);
        assert_eq!(rag.search_deadline_ms, 150);
    }
}
