pub mod settings;

pub use settings::{
    CacheConfig, ContextualConfig, DatabaseConfig, EmbeddingConfig, FeatureFlags, LimitsConfig,
    RagConfig, RerankerConfig, ServerConfig, Settings, SummarizerConfig,
};
