pub mod agent_service;
pub mod context_service;
pub mod document_service;
pub mod embedding_service;
pub mod retriever;
pub mod summarizer_service;

pub use agent_service::AgentService;
pub use context_service::{ContextReply, ContextService};
pub use document_service::{DocumentService, IngestResult};
pub use embedding_service::EmbeddingService;
pub use retriever::{RetrievalOutcome, Retriever, RetrievedChunk};
pub use summarizer_service::SummarizerService;
