//! End-to-end HTTP surface tests, driven through the real `axum::Router`
//! (`retrieval_core::router::build_router`) over an in-memory `MemoryStore`
//! with no database. Exercises owner isolation, agent link-set scoping,
//! and the shape of the wire responses (spec §6, §8 invariants 4-5).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use retrieval_core::cache::MetadataCache;
use retrieval_core::config::{
    CacheConfig, ContextualConfig, DatabaseConfig, EmbeddingConfig, FeatureFlags, LimitsConfig,
    RagConfig, RerankerConfig, ServerConfig, Settings, SummarizerConfig,
};
use retrieval_core::database::store::DocumentStore;
use retrieval_core::database::MemoryStore;
use retrieval_core::document::TextChunker;
use retrieval_core::logging::ActivityLogger;
use retrieval_core::router::build_router;
use retrieval_core::search::Bm25Registry;
use retrieval_core::services::{AgentService, ContextService, DocumentService, EmbeddingService, Retriever};
use retrieval_core::state::AppState;
use retrieval_core::utils::limiters::Limiters;

/// A throwaway HTTP server standing in for the embedding backend, so these
/// tests exercise a real `reqwest` round trip inside ingestion/retrieval
/// instead of mocking `EmbeddingService` away. Always returns the same
/// 3-dim vector, which is enough to drive cosine-similarity ranking.
async fn spawn_embedding_stub() -> String {
    use axum::{routing::post, Json, Router};

    async fn handler(Json(_): Json<Value>) -> Json<Value> {
        Json(json!({ "data": [{ "embedding": [1.0, 0.0, 0.0] }] }))
    }

    let app = Router::new().route("/v1/embeddings", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn test_state(embedding_base_url: String) -> AppState {
    let settings = Settings {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: String::new(),
            pool_max_size: 1,
            pool_timeout_seconds: 5,
        },
        embedding: EmbeddingConfig {
            base_url: embedding_base_url,
            model: "test-embed".to_string(),
            dimension: 3,
            api_key: None,
            request_timeout_seconds: 5,
            batch_size: 8,
        },
        summarizer: SummarizerConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            model: "test-summarizer".to_string(),
            api_key: None,
            timeout_seconds: 5,
            max_output_tokens: 256,
            price_per_1k_input: 0.0,
            price_per_1k_output: 0.0,
            price_per_1k_cache_read: 0.0,
            price_per_1k_cache_creation: 0.0,
        },
        reranker: RerankerConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            model: "test-reranker".to_string(),
            timeout_seconds: 5,
        },
        rag: RagConfig::default(),
        contextual: ContextualConfig::default(),
        limits: LimitsConfig::default(),
        cache: CacheConfig::default(),
        features: FeatureFlags::default(),
    };

    let limiters = Arc::new(Limiters::new(&settings.limits));
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let embedding = Arc::new(EmbeddingService::new(settings.embedding.clone(), limiters.clone()));
    let chunker = Arc::new(
        TextChunker::new(settings.rag.chunk_size_tokens, settings.rag.chunk_overlap_tokens).unwrap(),
    );
    let bm25 = Arc::new(Bm25Registry::new());
    let metadata_cache = Arc::new(MetadataCache::new(Duration::from_secs(
        settings.cache.metadata_ttl_seconds,
    )));
    let activity = ActivityLogger::spawn();

    let documents = Arc::new(DocumentService::new(
        store.clone(),
        embedding.clone(),
        None,
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
        None,
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

    AppState {
        settings: Arc::new(settings),
        store,
        embedding,
        bm25,
        reranker: None,
        limiters,
        activity,
        documents,
        retriever,
        context,
        agents,
    }
}

fn multipart_body(owner_id: &str, title: &str, file_name: &str, content: &str) -> (String, Vec<u8>) {
    let boundary = "api-test-boundary".to_string();
    let mut body = Vec::new();
    for (name, value) in [("owner_id", owner_id), ("title", title)] {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (boundary, body)
}

fn upload_request(owner_id: &str, title: &str, file_name: &str, content: &str) -> Request<Body> {
    let (boundary, body) = multipart_body(owner_id, title, file_name, content);
    Request::builder()
        .method("POST")
        .uri("/api/documents")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_returns_ok() {
    let state = test_state("http://127.0.0.1:1".to_string()).await;
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_list_and_delete_document_round_trip() {
    let base_url = spawn_embedding_stub().await;
    let state = test_state(base_url).await;
    let app = build_router(state);

    let upload_response = app
        .clone()
        .oneshot(upload_request(
            "owner-a",
            "Flight Manual",
            "manual.txt",
            "airship fleets require quarterly inspection and careful maintenance routines.",
        ))
        .await
        .unwrap();
    assert_eq!(upload_response.status(), StatusCode::OK);
    let upload_json = json_body(upload_response).await;
    let document_id = upload_json["document_id"].as_str().unwrap().to_string();
    assert!(upload_json["chunk_count"].as_u64().unwrap() >= 1);

    let list_response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/documents?owner_id=owner-a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);
    let list_json = json_body(list_response).await;
    assert_eq!(list_json.as_array().unwrap().len(), 1);

    let delete_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/documents/{document_id}?owner_id=owner-a"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete_response.status(), StatusCode::OK);

    let list_after_delete = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/documents?owner_id=owner-a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let list_after_delete_json = json_body(list_after_delete).await;
    assert!(list_after_delete_json.as_array().unwrap().is_empty());
}

/// spec §8 invariant 4: a query scoped to one owner never returns another
/// owner's documents, even when both corpora are non-empty.
#[tokio::test]
async fn list_documents_never_crosses_owner_boundary() {
    let base_url = spawn_embedding_stub().await;
    let state = test_state(base_url).await;
    let app = build_router(state);

    for (owner, title) in [("owner-a", "A doc"), ("owner-b", "B doc")] {
        let response = app
            .clone()
            .oneshot(upload_request(
                owner,
                title,
                "doc.txt",
                "some airship content about maintenance schedules and routines.",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let list_response = app
        .oneshot(
            Request::builder()
                .uri("/api/documents?owner_id=owner-a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let list_json = json_body(list_response).await;
    let docs = list_json.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["title"], "A doc");
}

/// spec §8 invariant 5: an agent only ever sees the subset of its owner's
/// documents it has been explicitly linked to.
#[tokio::test]
async fn agent_link_set_restricts_search_results() {
    let base_url = spawn_embedding_stub().await;
    let state = test_state(base_url).await;
    let app = build_router(state);

    let allowed_upload = app
        .clone()
        .oneshot(upload_request(
            "owner-a",
            "Allowed",
            "allowed.txt",
            "airship fleet maintenance routines for quarterly inspection.",
        ))
        .await
        .unwrap();
    let allowed_json = json_body(allowed_upload).await;
    let allowed_id = allowed_json["document_id"].as_str().unwrap().to_string();

    let blocked_upload = app
        .clone()
        .oneshot(upload_request(
            "owner-a",
            "Blocked",
            "blocked.txt",
            "a completely unrelated bread recipe discussion.",
        ))
        .await
        .unwrap();
    assert_eq!(blocked_upload.status(), StatusCode::OK);

    let create_agent = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agents")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({"owner_id": "owner-a", "name": "Support"})).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_agent.status(), StatusCode::OK);
    let agent_json = json_body(create_agent).await;
    let agent_id = agent_json["id"].as_str().unwrap().to_string();

    let link_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/agents/{agent_id}/documents"))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({"owner_id": "owner-a", "document_ids": [allowed_id]}))
                        .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(link_response.status(), StatusCode::OK);

    let search_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/documents/search")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "owner_id": "owner-a",
                        "query": "airship",
                        "agent_id": agent_id,
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(search_response.status(), StatusCode::OK);
    let results = json_body(search_response).await;
    let hits = results.as_array().unwrap();
    assert!(!hits.is_empty());
    for hit in hits {
        assert_eq!(hit["document_id"].as_str().unwrap(), allowed_id);
    }
}

/// An agent with no linked documents sees nothing, not the owner's whole
/// corpus (spec §9 Open Question).
#[tokio::test]
async fn zero_link_agent_sees_no_documents_through_context_endpoint() {
    let base_url = spawn_embedding_stub().await;
    let state = test_state(base_url).await;
    let app = build_router(state);

    app.clone()
        .oneshot(upload_request(
            "owner-a",
            "Doc",
            "doc.txt",
            "airship fleet maintenance routines for quarterly inspection.",
        ))
        .await
        .unwrap();

    let create_agent = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agents")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({"owner_id": "owner-a", "name": "Empty"})).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let agent_json = json_body(create_agent).await;
    let agent_id = agent_json["id"].as_str().unwrap().to_string();

    let context_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/documents/context")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "owner_id": "owner-a",
                        "query": "airship",
                        "agent_id": agent_id,
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(context_response.status(), StatusCode::OK);
    let context_json = json_body(context_response).await;
    assert_eq!(context_json["has_context"], false);
    assert_eq!(context_json["context"], "");
}

#[tokio::test]
async fn list_agents_includes_built_in_default_agent() {
    let state = test_state("http://127.0.0.1:1".to_string()).await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/agents?owner_id=owner-a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let agents = json["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["owner_id"], "_default");
}
