//! [`VectorStore`] backed by a Chroma server over its REST API.
//!
//! The collection is resolved (created if missing) on first use and its id
//! cached for the lifetime of the store. Embeddings are always supplied by
//! the caller; the server-side embedding function is never used.
//!
//! | Operation | Endpoint                                   |
//! |-----------|--------------------------------------------|
//! | resolve   | `POST /api/v1/collections` (get_or_create) |
//! | upsert    | `POST /api/v1/collections/{id}/upsert`     |
//! | delete    | `POST /api/v1/collections/{id}/delete`     |
//! | ids       | `POST /api/v1/collections/{id}/get`        |
//! | query     | `POST /api/v1/collections/{id}/query`      |

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use super::{Filter, VectorRecord, VectorStore};
use crate::config::VectorStoreConfig;
use crate::models::{ChunkMetadata, SearchHit};

pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GetResponse {
    ids: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    documents: Option<Vec<Vec<Option<String>>>>,
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl ChromaStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            collection_id: OnceCell::new(),
        })
    }

    async fn collection_id(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/api/v1/collections", self.base_url);
                let body = json!({ "name": self.collection, "get_or_create": true });
                let response: CollectionResponse = self.post_json(&url, &body).await?;
                tracing::debug!(collection = %self.collection, id = %response.id, "resolved Chroma collection");
                Ok::<_, anyhow::Error>(response.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn collection_url(&self, action: &str) -> Result<String> {
        let id = self.collection_id().await?;
        Ok(format!("{}/api/v1/collections/{}/{}", self.base_url, id, action))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Chroma request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Chroma API error {}: {}", status, body_text);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let metadatas = records
            .iter()
            .map(|r| serde_json::to_value(&r.metadata))
            .collect::<serde_json::Result<Vec<_>>>()?;
        let body = json!({
            "ids": records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            "embeddings": records.iter().map(|r| r.vector.as_slice()).collect::<Vec<_>>(),
            "documents": records.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
            "metadatas": metadatas,
        });
        let url = self.collection_url("upsert").await?;
        let _: Value = self.post_json(&url, &body).await?;
        Ok(())
    }

    async fn delete(&self, filter: &Filter) -> Result<()> {
        let url = self.collection_url("delete").await?;
        let body = json!({ "where": filter.to_chroma_where() });
        let _: Value = self.post_json(&url, &body).await?;
        Ok(())
    }

    async fn ids(&self, filter: &Filter) -> Result<Vec<String>> {
        let url = self.collection_url("get").await?;
        let body = json!({ "where": filter.to_chroma_where(), "include": [] });
        let response: GetResponse = self.post_json(&url, &body).await?;
        Ok(response.ids)
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = self.collection_url("delete").await?;
        let _: Value = self.post_json(&url, &json!({ "ids": ids })).await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<SearchHit>> {
        let url = self.collection_url("query").await?;
        let mut body = json!({
            "query_embeddings": [vector],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = filter {
            body["where"] = filter.to_chroma_where();
        }

        let response: QueryResponse = self.post_json(&url, &body).await?;
        parse_query_response(response)
    }
}

fn parse_query_response(response: QueryResponse) -> Result<Vec<SearchHit>> {
    let ids = response.ids.into_iter().next().unwrap_or_default();
    let documents = response.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
    let metadatas = response.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
    let distances = response.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();

    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            let metadata: ChunkMetadata = match metadatas.get(i).cloned().flatten() {
                Some(value) => serde_json::from_value(value)
                    .map_err(|e| anyhow!("unreadable metadata for {}: {}", id, e))?,
                None => ChunkMetadata::default(),
            };
            Ok(SearchHit {
                document_id: metadata.doc_id.clone(),
                text: documents.get(i).cloned().flatten().unwrap_or_default(),
                distance: distances.get(i).copied().flatten(),
                metadata,
                id,
            })
        })
        .collect()
}
