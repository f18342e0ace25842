use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use retrieval_core::cache::MetadataCache;
use retrieval_core::config::Settings;
use retrieval_core::database::{DbPool, MemoryStore, PgStore};
use retrieval_core::document::{Contextualizer, TextChunker};
use retrieval_core::logging::{self, ActivityLogger};
use retrieval_core::router::build_router;
use retrieval_core::search::{Bm25Registry, Reranker};
use retrieval_core::services::{
    AgentService, ContextService, DocumentService, EmbeddingService, Retriever, SummarizerService,
};
use retrieval_core::state::AppState;
use retrieval_core::utils::limiters::Limiters;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    info!("starting retrieval core");

    let settings = Settings::load()?;
    info!(port = settings.server.port, "configuration loaded");

    let limiters = Arc::new(Limiters::new(&settings.limits));

    let store: Arc<dyn retrieval_core::database::DocumentStore> =
        if settings.database.url.trim().is_empty() {
            info!("no database.url configured, running against an in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            let db_pool = DbPool::new(&settings.database).await?;
            info!("database connection established");
            Arc::new(PgStore::new(db_pool))
        };

    let embedding = Arc::new(EmbeddingService::new(settings.embedding.clone(), limiters.clone()));
    let summarizer = SummarizerService::new(settings.summarizer.clone(), limiters.clone());
    let contextualizer = Some(Arc::new(Contextualizer::new(summarizer, settings.contextual.clone())));

    let chunker = Arc::new(TextChunker::new(
        settings.rag.chunk_size_tokens,
        settings.rag.chunk_overlap_tokens,
    )?);

    let bm25 = Arc::new(Bm25Registry::new());
    let metadata_cache = Arc::new(MetadataCache::new(std::time::Duration::from_secs(
        settings.cache.metadata_ttl_seconds,
    )));
    let activity = ActivityLogger::spawn();

    let reranker = if settings.features.use_rerank {
        let reranker = Arc::new(Reranker::new(settings.reranker.clone(), limiters.clone()));
        if reranker.health_check().await {
            info!("reranker backend reachable");
        } else {
            tracing::warn!(
                "reranker enabled but unreachable at startup; calls will fall back to fused order"
            );
        }
        Some(reranker)
    } else {
        None
    };

    let documents = Arc::new(DocumentService::new(
        store.clone(),
        embedding.clone(),
        contextualizer,
        chunker,
        bm25.clone(),
        metadata_cache.clone(),
        activity.clone(),
        settings.features.clone(),
    ));

    let retriever = Arc::new(Retriever::new(
        store.clone(),
        embedding.clone(),
        bm25.clone(),
        reranker.clone(),
        limiters.clone(),
        settings.rag.clone(),
        settings.features.clone(),
    ));

    let context = Arc::new(ContextService::new(
        retriever.clone(),
        metadata_cache.clone(),
        store.clone(),
        activity.clone(),
        settings.rag.clone(),
    ));

    let agents = Arc::new(AgentService::new(store.clone()));

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState {
        settings: Arc::new(settings),
        store,
        embedding,
        bm25,
        reranker,
        limiters,
        activity,
        documents,
        retriever,
        context,
        agents,
    };

    let app = build_router(state);

    info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
