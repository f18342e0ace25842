use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::handlers;
use crate::state::AppState;

const MAX_UPLOAD_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Assembles the full HTTP surface (spec §5) over a constructed [`AppState`].
/// Lives in the library, not `main.rs`, so integration tests can build and
/// drive the same router the binary serves.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let document_routes = Router::new()
        .route(
            "/api/documents",
            post(handlers::upload::upload_handler).get(handlers::documents::list_documents_handler),
        )
        .route("/api/documents/{id}", delete(handlers::documents::delete_document_handler))
        .route("/api/documents/search", post(handlers::search::search_handler))
        .route("/api/documents/context", post(handlers::search::context_handler))
        .route("/api/contextual/stats", get(handlers::documents::stats_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES));

    let agent_routes = Router::new()
        .route(
            "/api/agents",
            post(handlers::agents::create_agent_handler).get(handlers::agents::list_agents_handler),
        )
        .route("/api/agents/{id}", delete(handlers::agents::delete_agent_handler))
        .route(
            "/api/agents/{id}/documents",
            post(handlers::agents::link_documents_handler),
        )
        .route(
            "/api/agents/{id}/documents/{doc_id}",
            delete(handlers::agents::unlink_document_handler),
        );

    Router::new()
        .merge(public_routes)
        .merge(document_routes)
        .merge(agent_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .with_state(state)
}
