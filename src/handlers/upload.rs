use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::database::models::DocumentType;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Response shape for `POST /api/documents` (spec §6): `{document_id,
/// chunk_count}`. `contextualized_chunks` rides along as extra detail a
/// caller may ignore.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: uuid::Uuid,
    pub chunk_count: usize,
    pub contextualized_chunks: usize,
}

/// `POST /api/documents`: multipart form with `file`, `owner_id`, `title`,
/// and an optional `doc_type` override (spec §6). `owner_id` is a bare
/// form field rather than an auth header — authentication is out of
/// scope (spec Non-goals).
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut owner_id: Option<String> = None;
    let mut title: Option<String> = None;
    let mut doc_type: Option<DocumentType> = None;
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "owner_id" => {
                owner_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidInput(e.to_string()))?,
                );
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidInput(e.to_string()))?,
                );
            }
            "doc_type" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
                doc_type = Some(match raw.to_lowercase().as_str() {
                    "pdf" => DocumentType::Pdf,
                    "text" | "txt" => DocumentType::Text,
                    other => {
                        return Err(ApiError::InvalidInput(format!(
                            "unsupported doc_type: {other}"
                        )))
                    }
                });
            }
            "file" => {
                file_name = field.file_name().map(str::to_string);
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::InvalidInput(format!("failed to read file: {e}")))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let owner_id = owner_id.ok_or_else(|| ApiError::InvalidInput("owner_id is required".to_string()))?;
    let file_bytes = file_bytes.ok_or_else(|| ApiError::InvalidInput("file is required".to_string()))?;
    let file_name = file_name.unwrap_or_default();
    let title = title.unwrap_or_else(|| file_name.clone());

    info!(owner_id, file_name, bytes = file_bytes.len(), "ingest request received");

    let result = state
        .documents
        .ingest_document(&owner_id, &title, &file_name, file_bytes, doc_type, &state.settings.rag)
        .await?;

    Ok(Json(UploadResponse {
        document_id: result.document_id,
        chunk_count: result.chunks_created,
        contextualized_chunks: result.contextualized_chunks,
    }))
}
