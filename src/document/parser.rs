use std::path::Path;

use crate::database::models::DocumentType;
use crate::utils::ApiError;

#[derive(Debug)]
pub struct ParsedDocument {
    pub content: String,
    pub page_count: Option<usize>,
}

pub struct DocumentParser;

impl DocumentParser {
    /// Extracts plain text from a byte blob according to `doc_type` (spec
    /// §4.1). Only `pdf` and `text` are supported; anything else is rejected
    /// by [`Self::infer_type`] before this is ever called.
    pub fn parse(bytes: &[u8], doc_type: DocumentType) -> Result<ParsedDocument, ApiError> {
        let parsed = match doc_type {
            DocumentType::Pdf => Self::parse_pdf(bytes)?,
            DocumentType::Text => Self::parse_text(bytes)?,
        };

        if parsed.content.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "document produced no extractable text".to_string(),
            ));
        }

        Ok(parsed)
    }

    /// Infers a [`DocumentType`] from a filename extension, rejecting
    /// anything not in the supported set rather than silently falling back
    /// to plain-text parsing.
    pub fn infer_type(file_name: &str) -> Result<DocumentType, ApiError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "txt" | "md" => Ok(DocumentType::Text),
            other => Err(ApiError::InvalidInput(format!(
                "unsupported document type: .{other}"
            ))),
        }
    }

    /// Extracts page text in order, joining pages with a blank line. A page
    /// lopdf can't extract text from contributes the empty string rather
    /// than being skipped, so chunk positions never drift relative to the
    /// source PDF's page numbering (spec §4.1 "no silently dropped pages").
    fn parse_pdf(bytes: &[u8]) -> Result<ParsedDocument, ApiError> {
        use lopdf::Document;

        let doc = Document::load_mem(bytes)
            .map_err(|e| ApiError::InvalidInput(format!("corrupt PDF: {e}")))?;
        let page_count = doc.get_pages().len();

        let mut pages = Vec::with_capacity(page_count);
        for page_num in 1..=page_count as u32 {
            pages.push(doc.extract_text(&[page_num]).unwrap_or_default());
        }

        Ok(ParsedDocument {
            content: pages.join("\n\n"),
            page_count: Some(page_count),
        })
    }

    fn parse_text(bytes: &[u8]) -> Result<ParsedDocument, ApiError> {
        let content = String::from_utf8(bytes.to_vec())
            .map_err(|e| ApiError::InvalidInput(format!("invalid utf-8: {e}")))?;

        Ok(ParsedDocument {
            content,
            page_count: None,
        })
    }
}
