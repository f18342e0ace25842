use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, Row};
use tracing::debug;
use uuid::Uuid;

use super::models::{
    Agent, ChunkHit, CorpusChunk, Document, DocumentSummary, DocumentType, NewChunk,
    ProcessingStat, DEFAULT_AGENT_OWNER,
};
use super::pool::DbPool;
use super::store::{DocumentStore, StatsSummary};

/// Postgres + pgvector implementation of [`DocumentStore`] (spec §4.5).
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn doc_type_from_str(s: &str) -> DocumentType {
    match s {
        "pdf" => DocumentType::Pdf,
        _ => DocumentType::Text,
    }
}

#[derive(FromRow)]
struct DocumentRow {
    id: Uuid,
    owner_id: String,
    title: String,
    doc_type: String,
    metadata: JsonValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(r: DocumentRow) -> Self {
        Document {
            id: r.id,
            owner_id: r.owner_id,
            title: r.title,
            doc_type: doc_type_from_str(&r.doc_type),
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert_document(
        &self,
        owner_id: &str,
        title: &str,
        doc_type: DocumentType,
        metadata: JsonValue,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"INSERT INTO documents (owner_id, title, doc_type, metadata)
               VALUES ($1, $2, $3, $4)
               RETURNING id"#,
        )
        .bind(owner_id)
        .bind(title)
        .bind(doc_type.as_str())
        .bind(metadata)
        .fetch_one(self.pool.get_pool())
        .await
        .context("insert_document")?;

        Ok(id)
    }

    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<()> {
        let mut tx = self.pool.get_pool().begin().await?;

        for chunk in &chunks {
            let embedding = Vector::from(chunk.embedding.clone());
            sqlx::query(
                r#"INSERT INTO document_sections
                   (document_id, chunk_index, content, contextual_content, is_contextualized, embedding, metadata)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.contextual_content)
            .bind(chunk.is_contextualized)
            .bind(embedding)
            .bind(&chunk.metadata)
            .execute(&mut *tx)
            .await
            .context("insert_chunks")?;
        }

        tx.commit().await?;
        debug!(document_id = %document_id, count = chunks.len(), "inserted chunks");
        Ok(())
    }

    async fn delete_document(&self, owner_id: &str, document_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.get_pool().begin().await?;

        let owned: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM documents WHERE id = $1 AND owner_id = $2")
                .bind(document_id)
                .bind(owner_id)
                .fetch_optional(&mut *tx)
                .await?;

        if owned.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM agent_documents WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM document_sections WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"SELECT d.id, d.title, d.doc_type, d.created_at,
                      COUNT(s.id) AS chunk_count
               FROM documents d
               LEFT JOIN document_sections s ON s.document_id = d.id
               WHERE d.owner_id = $1
               GROUP BY d.id
               ORDER BY d.created_at DESC"#,
        )
        .bind(owner_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DocumentSummary {
                id: row.get("id"),
                title: row.get("title"),
                doc_type: doc_type_from_str(row.get::<String, _>("doc_type").as_str()),
                created_at: row.get("created_at"),
                chunk_count: row.get::<i64, _>("chunk_count") as usize,
            })
            .collect())
    }

    async fn get_document(&self, owner_id: &str, document_id: Uuid) -> Result<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT id, owner_id, title, doc_type, metadata, created_at, updated_at
             FROM documents WHERE id = $1 AND owner_id = $2",
        )
        .bind(document_id)
        .bind(owner_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row.map(Document::from))
    }

    async fn vector_search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        threshold: f32,
        k: usize,
        allowed_document_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ChunkHit>> {
        let embedding = Vector::from(query_vector.to_vec());
        let limit = k as i64;

        let rows = match allowed_document_ids {
            Some(ids) => {
                sqlx::query(
                    r#"SELECT s.id AS chunk_id, s.document_id, s.content, s.is_contextualized,
                              1 - (s.embedding <=> $1) AS similarity
                       FROM document_sections s
                       JOIN documents d ON d.id = s.document_id
                       WHERE d.owner_id = $2
                         AND s.document_id = ANY($3)
                         AND 1 - (s.embedding <=> $1) >= $4
                       ORDER BY s.embedding <=> $1
                       LIMIT $5"#,
                )
                .bind(&embedding)
                .bind(owner_id)
                .bind(ids)
                .bind(threshold)
                .bind(limit)
                .fetch_all(self.pool.get_pool())
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT s.id AS chunk_id, s.document_id, s.content, s.is_contextualized,
                              1 - (s.embedding <=> $1) AS similarity
                       FROM document_sections s
                       JOIN documents d ON d.id = s.document_id
                       WHERE d.owner_id = $2
                         AND 1 - (s.embedding <=> $1) >= $3
                       ORDER BY s.embedding <=> $1
                       LIMIT $4"#,
                )
                .bind(&embedding)
                .bind(owner_id)
                .bind(threshold)
                .bind(limit)
                .fetch_all(self.pool.get_pool())
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| ChunkHit {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                content: row.get("content"),
                score: row.get::<f32, _>("similarity"),
                is_contextualized: row.get("is_contextualized"),
            })
            .collect())
    }

    async fn get_all_chunks(&self, owner_id: &str) -> Result<Vec<CorpusChunk>> {
        let rows = sqlx::query(
            r#"SELECT s.id AS chunk_id, s.document_id,
                      COALESCE(s.contextual_content, s.content) AS content
               FROM document_sections s
               JOIN documents d ON d.id = s.document_id
               WHERE d.owner_id = $1"#,
        )
        .bind(owner_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CorpusChunk {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                content: row.get("content"),
            })
            .collect())
    }

    async fn link_agent_documents(&self, agent_id: Uuid, document_ids: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.get_pool().begin().await?;
        for document_id in document_ids {
            sqlx::query(
                r#"INSERT INTO agent_documents (agent_id, document_id)
                   VALUES ($1, $2)
                   ON CONFLICT (agent_id, document_id) DO NOTHING"#,
            )
            .bind(agent_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn unlink_agent_document(&self, agent_id: Uuid, document_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM agent_documents WHERE agent_id = $1 AND document_id = $2")
            .bind(agent_id)
            .bind(document_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn list_agent_documents(&self, agent_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT document_id FROM agent_documents WHERE agent_id = $1")
                .bind(agent_id)
                .fetch_all(self.pool.get_pool())
                .await?;
        Ok(ids)
    }

    async fn record_processing_stats(&self, stat: ProcessingStat) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO contextual_processing_stats
               (document_id, owner_id, total_chunks, processed_chunks, failed_chunks,
                input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens,
                processing_time_seconds, cost_estimate_usd, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(stat.document_id)
        .bind(&stat.owner_id)
        .bind(stat.total_chunks as i64)
        .bind(stat.processed_chunks as i64)
        .bind(stat.failed_chunks as i64)
        .bind(stat.tokens.input as i64)
        .bind(stat.tokens.output as i64)
        .bind(stat.tokens.cache_creation as i64)
        .bind(stat.tokens.cache_read as i64)
        .bind(stat.processing_time_seconds)
        .bind(stat.cost_estimate_usd)
        .bind(stat.created_at)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    async fn stats_summary(&self, owner_id: &str) -> Result<StatsSummary> {
        let row = sqlx::query(
            r#"SELECT
                 (SELECT COUNT(*) FROM documents WHERE owner_id = $1) AS total_documents,
                 (SELECT COUNT(*) FROM document_sections s
                    JOIN documents d ON d.id = s.document_id WHERE d.owner_id = $1) AS total_chunks,
                 COALESCE(SUM(input_tokens + output_tokens + cache_creation_tokens + cache_read_tokens), 0) AS total_tokens,
                 COALESCE(SUM(cost_estimate_usd), 0.0) AS total_cost
               FROM contextual_processing_stats
               WHERE owner_id = $1"#,
        )
        .bind(owner_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(StatsSummary {
            total_documents: row.get::<i64, _>("total_documents") as usize,
            total_chunks: row.get::<i64, _>("total_chunks") as usize,
            total_tokens: row.get::<i64, _>("total_tokens") as u64,
            estimated_cost_usd: row.get("total_cost"),
        })
    }

    async fn create_agent(&self, agent: Agent) -> Result<Agent> {
        let id: Uuid = sqlx::query_scalar(
            r#"INSERT INTO user_agents (id, owner_id, name, instructions, voice_id, greeting, is_default)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id"#,
        )
        .bind(agent.id)
        .bind(&agent.owner_id)
        .bind(&agent.name)
        .bind(&agent.instructions)
        .bind(&agent.voice_id)
        .bind(&agent.greeting)
        .bind(agent.is_default)
        .fetch_one(self.pool.get_pool())
        .await
        .context("create_agent")?;

        Ok(Agent { id, ..agent })
    }

    /// Every agent the owner created, plus the built-in `_default`-owned
    /// agents no caller owns but every caller can see (spec §3).
    async fn list_agents(&self, owner_id: &str) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            r#"SELECT id, owner_id, name, instructions, voice_id, greeting, is_default
               FROM user_agents WHERE owner_id = $1 OR owner_id = $2
               ORDER BY is_default DESC, name ASC"#,
        )
        .bind(owner_id)
        .bind(DEFAULT_AGENT_OWNER)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Agent {
                id: row.get("id"),
                owner_id: row.get("owner_id"),
                name: row.get("name"),
                instructions: row.get("instructions"),
                voice_id: row.get("voice_id"),
                greeting: row.get("greeting"),
                is_default: row.get("is_default"),
            })
            .collect())
    }

    async fn delete_agent(&self, owner_id: &str, agent_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.get_pool().begin().await?;

        let owned: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM user_agents WHERE id = $1 AND owner_id = $2")
                .bind(agent_id)
                .bind(owner_id)
                .fetch_optional(&mut *tx)
                .await?;

        if owned.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM agent_documents WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_agents WHERE id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
