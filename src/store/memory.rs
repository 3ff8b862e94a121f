//! In-memory [`VectorStore`] for tests and single-process use.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over all records; the reported distance is
//! `1 - similarity`, so `0.0` is an exact match.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{Filter, VectorRecord, VectorStore};
use crate::embedding::cosine_similarity;
use crate::models::SearchHit;

/// Brute-force similarity index held in memory.
pub struct InMemoryVectorStore {
    records: RwLock<BTreeMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the records matching `filter`, in id order.
    pub fn ids_matching(&self, filter: &Filter) -> Vec<String> {
        self.records
            .read()
            .map(|records| {
                records
                    .values()
                    .filter(|r| filter.matches(&r.metadata))
                    .map(|r| r.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A stored record by id.
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.read().ok()?.get(id).cloned()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, filter: &Filter) -> Result<()> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        stored.retain(|_, r| !filter.matches(&r.metadata));
        Ok(())
    }

    async fn ids(&self, filter: &Filter) -> Result<Vec<String>> {
        let stored = self.records.read().map_err(|_| poisoned())?;
        Ok(stored
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| r.id.clone())
            .collect())
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<SearchHit>> {
        let stored = self.records.read().map_err(|_| poisoned())?;

        let mut scored: Vec<(f32, &VectorRecord)> = stored
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| (1.0 - cosine_similarity(vector, &r.vector), r))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, r)| SearchHit {
                id: r.id.clone(),
                document_id: r.metadata.doc_id.clone(),
                metadata: r.metadata.clone(),
                text: r.text.clone(),
                distance: Some(distance),
            })
            .collect())
    }
}
