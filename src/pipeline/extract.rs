//! Document extraction: turn a tagged input file into something the model can read.
//!
//! Two payload forms exist because the two call shapes want different
//! things. A session attaches the raw file once and lets the model read the
//! PDF itself; stateless requests inline the decoded text into every prompt.
//!
//! PDF decoding runs on the blocking pool (`spawn_blocking`): it is CPU-bound
//! and the decoder can panic on malformed files. A panic surfaces as a
//! `JoinError`, which becomes a [`DocumentError`] instead of taking down the
//! batch.

use crate::error::DocumentError;
use crate::pipeline::input::{DocumentKind, DocumentRef};
use crate::pipeline::llm::Attachment;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Reads document content for the orchestrator.
///
/// Implementations never panic or abort the batch: every failure is a
/// [`DocumentError`] the caller logs before moving to the next document.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Raw bytes plus MIME type, for the attach-once session shape.
    async fn load_attachment(&self, doc: &DocumentRef) -> Result<Attachment, DocumentError>;

    /// Plain text, for the stateless shape and for PDF prompt files.
    async fn extract_text(&self, doc: &DocumentRef) -> Result<String, DocumentError>;
}

/// Reads documents from the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExtractor;

#[async_trait]
impl DocumentExtractor for FileExtractor {
    async fn load_attachment(&self, doc: &DocumentRef) -> Result<Attachment, DocumentError> {
        let bytes = read_bytes(&doc.path).await?;
        if bytes.is_empty() {
            return Err(DocumentError::EmptyContent {
                path: doc.path.clone(),
            });
        }
        debug!("Loaded {} ({} bytes)", doc.name(), bytes.len());
        Ok(Attachment::new(doc.kind.mime_type(), bytes))
    }

    async fn extract_text(&self, doc: &DocumentRef) -> Result<String, DocumentError> {
        let text = match doc.kind {
            DocumentKind::PlainText => tokio::fs::read_to_string(&doc.path)
                .await
                .map_err(|e| DocumentError::Unreadable {
                    path: doc.path.clone(),
                    detail: e.to_string(),
                })?,
            DocumentKind::Pdf => {
                let bytes = read_bytes(&doc.path).await?;
                pdf_text(&doc.path, bytes).await?
            }
        };

        if text.trim().is_empty() {
            return Err(DocumentError::EmptyContent {
                path: doc.path.clone(),
            });
        }
        debug!("Extracted {} chars from {}", text.len(), doc.name());
        Ok(text)
    }
}

async fn read_bytes(path: &Path) -> Result<Vec<u8>, DocumentError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| DocumentError::Unreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}

/// Decode every page in order and concatenate the text.
///
/// A scanned PDF without a text layer decodes to an empty string; that is
/// not an error at this level.
async fn pdf_text(path: &Path, bytes: Vec<u8>) -> Result<String, DocumentError> {
    let joined = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| DocumentError::PdfDecode {
            path: path.to_path_buf(),
            detail: format!("decoder panicked: {e}"),
        })?;

    joined.map_err(|e| DocumentError::PdfDecode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}
