//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Every variant aborts the single operation that raised it. Nothing in
//! the core retries; the caller decides whether to re-run an operation
//! (re-ingestion is idempotent, so retrying is always safe).

use thiserror::Error;

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The source could not be parsed, or every extraction backend failed.
    #[error("text extraction failed for {mime}: {cause}")]
    Extraction { mime: String, cause: String },

    /// Non-empty input normalized and chunked down to nothing.
    #[error("document {doc_id} has no text content after processing")]
    EmptyContent { doc_id: String },

    /// Malformed caller input (page ranges, offsets, queries, ids).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown document id, or a registry entry whose backing file is gone.
    #[error("not found: {0}")]
    NotFound(String),

    /// Slice bounds outside the physical page count of the document.
    #[error("page range {start}-{end} is outside the document (pages 1-{page_count})")]
    Range {
        start: i64,
        end: i64,
        page_count: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure inside an external collaborator (embedder, vector store, registry).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl IngestError {
    pub fn extraction(mime: &str, cause: impl std::fmt::Display) -> Self {
        IngestError::Extraction {
            mime: mime.to_string(),
            cause: cause.to_string(),
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
