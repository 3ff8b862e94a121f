//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the narrow contract the pipeline needs from
//! a similarity index: upsert records, list and delete them by metadata
//! filter or id, and query the nearest neighbours of a vector with an
//! optional filter. Filters only
//! use equality and set-membership over flat scalar metadata fields.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Config Value | Store |
//! |-------------|-------|
//! | `"memory"` | [`memory::InMemoryVectorStore`] |
//! | `"chroma"` | [`chroma::ChromaStore`] |

pub mod chroma;
pub mod memory;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::VectorStoreConfig;
use crate::models::{ChunkMetadata, SearchHit};

/// Metadata predicate understood by every backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq(String, Value),
    /// `field ∈ values`
    In(String, Vec<Value>),
    /// Every inner filter holds.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn in_set<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    /// All chunks of one document.
    pub fn doc_id(doc_id: &str) -> Self {
        Filter::eq("docId", doc_id)
    }

    /// Evaluate against a chunk's metadata.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match serde_json::to_value(metadata) {
            Ok(value) => self.matches_value(&value),
            Err(_) => false,
        }
    }

    fn matches_value(&self, metadata: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => metadata.get(field) == Some(value),
            Filter::In(field, values) => metadata
                .get(field)
                .is_some_and(|v| values.contains(v)),
            Filter::And(filters) => filters.iter().all(|f| f.matches_value(metadata)),
        }
    }

    /// Render as a Chroma `where` clause.
    pub fn to_chroma_where(&self) -> Value {
        match self {
            Filter::Eq(field, value) => json!({ field: { "$eq": value } }),
            Filter::In(field, values) => json!({ field: { "$in": values } }),
            Filter::And(filters) if filters.len() == 1 => filters[0].to_chroma_where(),
            Filter::And(filters) => json!({
                "$and": filters.iter().map(Filter::to_chroma_where).collect::<Vec<_>>()
            }),
        }
    }
}

/// One chunk as stored in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

/// Abstract similarity index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records by id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Remove every record matching `filter`.
    async fn delete(&self, filter: &Filter) -> Result<()>;

    /// Ids of every record matching `filter`.
    async fn ids(&self, filter: &Filter) -> Result<Vec<String>>;

    /// Remove the records with these ids; unknown ids are ignored.
    async fn delete_ids(&self, ids: &[String]) -> Result<()>;

    /// The `k` records nearest to `vector`, closest first.
    async fn query(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<SearchHit>>;
}

/// Create the configured [`VectorStore`].
pub fn create_vector_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(memory::InMemoryVectorStore::new())),
        "chroma" => Ok(Arc::new(chroma::ChromaStore::new(config)?)),
        other => bail!("Unknown vector store provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Audience;

    fn meta(doc: &str, audience: Audience) -> ChunkMetadata {
        ChunkMetadata {
            doc_id: doc.into(),
            audience,
            ..Default::default()
        }
    }

    #[test]
    fn test_eq_and_in_filters() {
        let m = meta("doc-1", Audience::Client);
        assert!(Filter::doc_id("doc-1").matches(&m));
        assert!(!Filter::doc_id("doc-2").matches(&m));
        assert!(Filter::in_set("audience", ["CLIENT", "BOTH"]).matches(&m));
        assert!(!Filter::in_set("audience", ["SOCIAL_WORKER", "BOTH"]).matches(&m));
    }

    #[test]
    fn test_and_filter() {
        let m = meta("doc-1", Audience::Both);
        let f = Filter::And(vec![Filter::doc_id("doc-1"), Filter::eq("audience", "BOTH")]);
        assert!(f.matches(&m));
        let g = Filter::And(vec![Filter::doc_id("doc-1"), Filter::eq("audience", "CLIENT")]);
        assert!(!g.matches(&m));
    }

    #[test]
    fn test_missing_field_never_matches() {
        assert!(!Filter::eq("articleId", "a").matches(&ChunkMetadata::default()));
    }

    #[test]
    fn test_chroma_where_shapes() {
        assert_eq!(
            Filter::doc_id("d").to_chroma_where(),
            json!({"docId": {"$eq": "d"}})
        );
        assert_eq!(
            Filter::in_set("audience", ["CLIENT", "BOTH"]).to_chroma_where(),
            json!({"audience": {"$in": ["CLIENT", "BOTH"]}})
        );
        assert_eq!(
            Filter::And(vec![Filter::doc_id("d"), Filter::eq("chunk", 0)]).to_chroma_where(),
            json!({"$and": [{"docId": {"$eq": "d"}}, {"chunk": {"$eq": 0}}]})
        );
    }
}
