use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Text,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Text => "text",
        }
    }
}

/// One uploaded source (spec §3 "Document").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub doc_type: DocumentType,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persona configurable by an owner (spec §3 "Agent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub instructions: String,
    pub voice_id: String,
    pub greeting: String,
    pub is_default: bool,
}

pub const DEFAULT_AGENT_OWNER: &str = "_default";

/// An append-only record of one ingest's contextualization cost
/// (spec §3 "ProcessingStat").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStat {
    pub document_id: Uuid,
    pub owner_id: String,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub failed_chunks: usize,
    pub tokens: TokenUsage,
    pub processing_time_seconds: f64,
    pub cost_estimate_usd: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.cache_creation += other.cache_creation;
        self.cache_read += other.cache_read;
    }
}

/// One hit from a vector or BM25 search, before fusion (spec §4.5, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub score: f32,
    pub is_contextualized: bool,
}

/// Summary view used by `list_documents` (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub doc_type: DocumentType,
    pub created_at: DateTime<Utc>,
    pub chunk_count: usize,
}

/// Row handed to `insert_chunks` — the store assigns chunk ids.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i32,
    pub content: String,
    pub contextual_content: Option<String>,
    pub is_contextualized: bool,
    pub embedding: Vec<f32>,
    pub metadata: JsonValue,
}

/// Minimal projection used to (re)build the BM25 corpus for an owner.
#[derive(Debug, Clone)]
pub struct CorpusChunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
}
