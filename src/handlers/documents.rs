use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::database::models::{DocumentSummary, DocumentType};
use crate::database::store::StatsSummary;
use crate::state::AppState;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: String,
}

/// The wire shape for one listed document (spec §6): `type` rather than
/// the internal `doc_type`, `chunk_count` nested under `metadata` rather
/// than sitting alongside it.
#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub created_at: DateTime<Utc>,
    pub metadata: DocumentViewMetadata,
}

#[derive(Debug, Serialize)]
pub struct DocumentViewMetadata {
    pub chunk_count: usize,
}

impl From<DocumentSummary> for DocumentView {
    fn from(summary: DocumentSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            doc_type: summary.doc_type,
            created_at: summary.created_at,
            metadata: DocumentViewMetadata {
                chunk_count: summary.chunk_count,
            },
        }
    }
}

/// `GET /api/documents?owner_id=...` (spec §6): `[{id, title, type,
/// created_at, metadata:{chunk_count}}]`.
pub async fn list_documents_handler(
    State(state): State<AppState>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<Vec<DocumentView>>, ApiError> {
    let documents = state.documents.list_documents(&params.owner_id).await?;
    Ok(Json(documents.into_iter().map(DocumentView::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct DeleteDocumentResponse {
    pub deleted: bool,
}

/// `DELETE /api/documents/{id}?owner_id=...` (spec §6). `Ok(false)` on a
/// missing or not-owned document maps to a 404, not a silent success.
pub async fn delete_document_handler(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<DeleteDocumentResponse>, ApiError> {
    info!(owner_id = %params.owner_id, %document_id, "delete document request received");

    let deleted = state
        .documents
        .delete_document(&params.owner_id, document_id)
        .await?;

    if !deleted {
        return Err(ApiError::NotFound(format!(
            "document {document_id} not found for this owner"
        )));
    }

    Ok(Json(DeleteDocumentResponse { deleted }))
}

/// `GET /api/contextual/stats?owner_id=...` (spec §6): aggregate ingest
/// and contextualization cost counters for one owner.
pub async fn stats_handler(
    State(state): State<AppState>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<StatsSummary>, ApiError> {
    let summary = state
        .store
        .stats_summary(&params.owner_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(summary))
}
