//! Semantic search over ingested chunks, with citation grouping.
//!
//! A query is embedded with the configured [`Embedder`](crate::embedding::Embedder),
//! matched against the vector store (optionally restricted by audience or
//! document), and the ranked hits are grouped into citable sources by
//! [`crate::grouping::group_hits`].

use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::embedding::embed_query;
use crate::error::{IngestError, Result};
use crate::grouping::group_hits;
use crate::ingest::Pipeline;
use crate::models::{Audience, CitationGroup, SearchHit};
use crate::store::Filter;

/// A search request.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    /// Defaults to `retrieval.default_top_k`; clamped to `1..=max_top_k`.
    pub top_k: Option<usize>,
    /// Reader role. `None` searches every audience.
    pub audience: Option<Audience>,
    /// Restrict hits to one document.
    pub doc_id: Option<String>,
}

/// Ranked hits plus the same hits grouped into citations.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub groups: Vec<CitationGroup>,
}

/// Resolve the requested result count against the configured bounds.
pub fn clamp_top_k(requested: Option<usize>, config: &RetrievalConfig) -> usize {
    requested
        .unwrap_or(config.default_top_k)
        .clamp(1, config.max_top_k.max(1))
}

/// Chunks visible to `audience`: its own plus those meant for both.
pub fn audience_filter(audience: Audience) -> Filter {
    let mut visible = vec![audience.as_str()];
    if audience != Audience::Both {
        visible.push(Audience::Both.as_str());
    }
    Filter::in_set("audience", visible)
}

/// Combine the optional restrictions of a request into one filter.
pub fn request_filter(request: &SearchRequest) -> Option<Filter> {
    let mut filters: Vec<Filter> = Vec::new();
    if let Some(audience) = request.audience {
        filters.push(audience_filter(audience));
    }
    if let Some(doc_id) = request.doc_id.as_deref().filter(|d| !d.trim().is_empty()) {
        filters.push(Filter::doc_id(doc_id.trim()));
    }
    match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(Filter::And(filters)),
    }
}

impl Pipeline {
    /// Embed `request.query`, fetch the nearest chunks, and group them.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(IngestError::Validation("query is required".into()));
        }

        let top_k = clamp_top_k(request.top_k, &self.config().retrieval);
        let filter = request_filter(request);

        let vector = embed_query(self.embedder(), query).await?;
        let hits = self.vectors().query(&vector, top_k, filter.as_ref()).await?;
        tracing::info!(top_k, hits = hits.len(), audience = ?request.audience, "search finished");

        let groups = group_hits(&hits);
        Ok(SearchResponse { hits, groups })
    }
}
