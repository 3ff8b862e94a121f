//! Core data models used throughout Folio Harness.
//!
//! These types represent the documents, chunks, TOC entries, and search
//! results that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Intended reader of a document.
///
/// Anything unrecognized normalizes to [`Audience::Both`]; see
/// [`crate::metadata::normalize_audience`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Audience {
    SocialWorker,
    Client,
    #[default]
    Both,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::SocialWorker => "SOCIAL_WORKER",
            Audience::Client => "CLIENT",
            Audience::Both => "BOTH",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Origin {
    #[default]
    File,
    Url,
}

/// Text of one physical page. `page` is 1-indexed when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page: Option<u32>,
    pub text: String,
}

impl PageText {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page: Some(page),
            text: text.into(),
        }
    }
}

/// Output of text extraction: flat text or page-tagged text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedContent {
    PlainText(String),
    PagedText(Vec<PageText>),
}

impl ExtractedContent {
    /// True when no page (or the flat text) carries any non-whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            ExtractedContent::PlainText(text) => text.trim().is_empty(),
            ExtractedContent::PagedText(pages) => pages.iter().all(|p| p.text.trim().is_empty()),
        }
    }

    /// Pages of paginated content, or `None` for flat text.
    pub fn pages(&self) -> Option<&[PageText]> {
        match self {
            ExtractedContent::PagedText(pages) => Some(pages),
            ExtractedContent::PlainText(_) => None,
        }
    }
}

/// Normalized bibliographic metadata of a document.
///
/// Optional fields are omitted when serialized, so registry entries and
/// JSON output only carry what is actually known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub audience: Audience,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_range: Option<String>,
}

/// Provenance of a document's content, persisted so it can be re-ingested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Path of the stored source file; reindex reads it back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// SHA-256 of the raw source bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Issue document an article was sliced from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_doc_id: Option<String>,
    /// Physical first page of an article within its parent issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_page: Option<i64>,
    /// Physical last page of an article within its parent issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_page: Option<i64>,
    /// Printed page number of the article's first page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_start: Option<u32>,
}

/// A chunk of a document, ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `{document_id}::{ordinal}::{hash prefix}`.
    pub id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub page: Option<u32>,
    /// Bibliographic prefix followed by the cleaned fragment.
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// Flat, scalar-only metadata stored alongside each chunk in the vector store.
///
/// List-valued fields (`authors`, `pages`) are encoded as JSON array strings
/// because vector stores only accept scalar metadata values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub chunk: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(rename = "type")]
    pub origin: Origin,
    pub audience: Audience,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_doc_id: Option<String>,
    pub hash: String,
}

/// One parsed table-of-contents line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocItem {
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Page number as printed in the magazine.
    pub page: u32,
}

/// A TOC entry (or explicit input) resolved to physical pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRange {
    pub item: TocItem,
    /// Last printed page, if known.
    pub print_end: Option<u32>,
    /// Physical first page (1-indexed) in the issue PDF.
    pub start: i64,
    /// Physical last page (inclusive); `None` for an unterminated final article.
    pub end: Option<i64>,
}

impl ArticleRange {
    /// Printed range label such as `"7–12"` or `"27"`.
    pub fn print_label(&self) -> String {
        match self.print_end {
            Some(end) if end != self.item.page => format!("{}–{}", self.item.page, end),
            _ => self.item.page.to_string(),
        }
    }
}

/// A ranked retrieval hit with its chunk metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub document_id: String,
    pub metadata: ChunkMetadata,
    pub text: String,
    pub distance: Option<f32>,
}

/// Hits collapsed into one citable source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationGroup {
    pub key: String,
    pub document_id: Option<String>,
    pub article_id: Option<String>,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal_title: Option<String>,
    pub issue_label: Option<String>,
    pub section: Option<String>,
    pub url: Option<String>,
    pub hits: usize,
    pub best_distance: Option<f32>,
    /// Compacted page list, e.g. `"3–4, 28"`.
    pub pages: Option<String>,
    pub short_ref: Option<String>,
    pub chunk_ids: Vec<String>,
}
