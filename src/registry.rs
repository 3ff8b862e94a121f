//! Document registry: the persisted record of every ingested document.
//!
//! The registry is a key-value store of [`RegistryEntry`] values keyed by
//! document id, accessed through the [`RegistryStore`] trait.
//!
//! # Concurrency contract
//!
//! Ingestion, metadata updates and deletes may run concurrently. Every
//! operation on [`JsonFileRegistry`] holds one async mutex from the moment
//! it reads the file until its write has landed, so read-modify-write
//! sequences never interleave. Writes go to a temporary file in the same
//! directory which is then renamed over the registry, so a crash leaves
//! either the old or the new file, never a torn one.
//!
//! The registry is not transactional with the vector store. A failure
//! between the two leaves them out of step until the document is
//! re-ingested.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{DocumentMeta, Origin, SourceRef};

/// A persisted document record.
///
/// Metadata and source fields are flattened, so the JSON form is one flat
/// object (`docId`, `type`, `title`, `audience`, `fileName`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub doc_id: String,
    #[serde(rename = "type")]
    pub origin: Origin,
    #[serde(flatten)]
    pub meta: DocumentMeta,
    #[serde(flatten)]
    pub source: SourceRef,
    /// Chunks written by the last successful ingestion.
    #[serde(default)]
    pub chunks: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ingested: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched: Option<DateTime<Utc>>,
}

/// Fields to change on [`RegistryStore::put`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub origin: Option<Origin>,
    pub meta: Option<DocumentMeta>,
    pub source: Option<SourceRef>,
    pub chunks: Option<usize>,
    pub last_ingested: Option<DateTime<Utc>>,
    pub last_fetched: Option<DateTime<Utc>>,
}

impl EntryPatch {
    fn apply(self, entry: &mut RegistryEntry) {
        if let Some(origin) = self.origin {
            entry.origin = origin;
        }
        if let Some(meta) = self.meta {
            entry.meta = meta;
        }
        if let Some(source) = self.source {
            entry.source = source;
        }
        if let Some(chunks) = self.chunks {
            entry.chunks = chunks;
        }
        if self.last_ingested.is_some() {
            entry.last_ingested = self.last_ingested;
        }
        if self.last_fetched.is_some() {
            entry.last_fetched = self.last_fetched;
        }
    }
}

/// Registry operations.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn get(&self, doc_id: &str) -> Result<Option<RegistryEntry>>;

    /// Create or update an entry, returning it as stored.
    async fn put(&self, doc_id: &str, patch: EntryPatch) -> Result<RegistryEntry>;

    /// Remove an entry; `false` if it did not exist.
    async fn delete(&self, doc_id: &str) -> Result<bool>;

    /// Every entry, most recently updated first.
    async fn list(&self) -> Result<Vec<RegistryEntry>>;
}

type Entries = BTreeMap<String, RegistryEntry>;

/// Registry persisted as one JSON object in a file.
pub struct JsonFileRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Entries> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read registry: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse registry: {}", self.path.display()))
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create registry directory: {}", dir.display()))?;

        let json = serde_json::to_string_pretty(entries)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace registry: {}", self.path.display()))?;
        Ok(())
    }

    /// Run `f` on the loaded entries under the lock, persisting if it reports a change.
    async fn update<T>(&self, f: impl FnOnce(&mut Entries) -> (T, bool)) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load()?;
        let (out, changed) = f(&mut entries);
        if changed {
            self.save(&entries)?;
        }
        Ok(out)
    }
}

#[async_trait]
impl RegistryStore for JsonFileRegistry {
    async fn get(&self, doc_id: &str) -> Result<Option<RegistryEntry>> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.remove(doc_id))
    }

    async fn put(&self, doc_id: &str, patch: EntryPatch) -> Result<RegistryEntry> {
        let entry = self
            .update(|entries| {
                let now = Utc::now();
                let entry = entries
                    .entry(doc_id.to_string())
                    .or_insert_with(|| RegistryEntry {
                        doc_id: doc_id.to_string(),
                        origin: Origin::default(),
                        meta: DocumentMeta::default(),
                        source: SourceRef::default(),
                        chunks: 0,
                        created_at: now,
                        updated_at: now,
                        last_ingested: None,
                        last_fetched: None,
                    });
                patch.apply(entry);
                entry.updated_at = now;
                (entry.clone(), true)
            })
            .await?;
        tracing::debug!(doc_id, "registry entry written");
        Ok(entry)
    }

    async fn delete(&self, doc_id: &str) -> Result<bool> {
        self.update(|entries| {
            let removed = entries.remove(doc_id).is_some();
            (removed, removed)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<RegistryEntry>> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<RegistryEntry> = self.load()?.into_values().collect();
        entries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Audience;
    use std::sync::Arc;

    fn registry() -> (tempfile::TempDir, JsonFileRegistry) {
        let dir = tempfile::TempDir::new().unwrap();
        let reg = JsonFileRegistry::new(dir.path().join("nested").join("registry.json"));
        (dir, reg)
    }

    #[tokio::test]
    async fn test_put_creates_then_updates() {
        let (_dir, reg) = registry();
        let created = reg
            .put(
                "doc",
                EntryPatch {
                    origin: Some(Origin::Url),
                    meta: Some(DocumentMeta {
                        title: Some("First".into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.origin, Origin::Url);

        let updated = reg
            .put("doc", EntryPatch { chunks: Some(4), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.meta.title.as_deref(), Some("First"));
        assert_eq!(updated.chunks, 4);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_json_is_flat_and_sparse() {
        let (_dir, reg) = registry();
        reg.put(
            "doc",
            EntryPatch {
                meta: Some(DocumentMeta {
                    title: Some("T".into()),
                    audience: Audience::Client,
                    ..Default::default()
                }),
                source: Some(SourceRef {
                    file_name: Some("a.pdf".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(reg.path()).unwrap()).unwrap();
        let entry = &raw["doc"];
        assert_eq!(entry["docId"], "doc");
        assert_eq!(entry["type"], "FILE");
        assert_eq!(entry["title"], "T");
        assert_eq!(entry["audience"], "CLIENT");
        assert_eq!(entry["fileName"], "a.pdf");
        assert!(entry.get("description").is_none());
        assert!(entry.get("url").is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let (_dir, reg) = registry();
        reg.put("doc", EntryPatch::default()).await.unwrap();
        assert!(reg.delete("doc").await.unwrap());
        assert!(!reg.delete("doc").await.unwrap());
        assert!(reg.get("doc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_registry() {
        let (_dir, reg) = registry();
        assert!(reg.list().await.unwrap().is_empty());
        assert!(!reg.path().exists());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (dir, reg) = registry();
        reg.put("a", EntryPatch::default()).await.unwrap();
        reg.put("b", EntryPatch::default()).await.unwrap();
        let files: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("registry.json")]);
    }

    #[tokio::test]
    async fn test_concurrent_puts_are_serialized() {
        let (_dir, reg) = registry();
        let reg = Arc::new(reg);
        let mut handles = Vec::new();
        for i in 0..16 {
            let reg = Arc::clone(&reg);
            handles.push(tokio::spawn(async move {
                reg.put(&format!("doc-{i}"), EntryPatch::default()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(reg.list().await.unwrap().len(), 16);
    }
}
