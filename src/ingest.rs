//! Ingestion pipeline orchestration.
//!
//! Coordinates the per-document flow: extraction → normalization →
//! chunking → prefixing → embedding → vector upsert → registry update.
//!
//! Everything that can fail on bad input (extraction, empty content,
//! embedding) happens before the vector store or the registry is touched,
//! so a failed ingestion leaves the document at its previous state. New
//! vectors are upserted before the stale ones are removed, so a backend
//! failure mid-write never leaves the document without chunks. After that
//! the stale-chunk removal or the registry update can still fail; the two
//! stores are then out of step until the document is ingested again, which
//! is always safe because chunk ids are content-addressed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;

use crate::chunk::{chunk_content, ChunkParams};
use crate::config::Config;
use crate::embedding::{create_embedder, embed_all, BatchPolicy, Embedder};
use crate::error::{IngestError, Result};
use crate::extract::{self, detect_mime, has_pdf_magic, MIME_HTML, MIME_OCTET, MIME_PDF};
use crate::metadata::{
    build_chunks, chunk_metadata, content_hash, merge_metadata, normalize_metadata, MetadataInput,
};
use crate::models::{Chunk, DocumentMeta, ExtractedContent, Origin, SourceRef};
use crate::registry::{EntryPatch, JsonFileRegistry, RegistryEntry, RegistryStore};
use crate::store::{create_vector_store, Filter, VectorRecord, VectorStore};

/// Everything needed to (re)populate one document.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub doc_id: String,
    pub origin: Origin,
    pub meta: DocumentMeta,
    pub source: SourceRef,
    pub content: ExtractedContent,
    /// Set when the content was just downloaded.
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub doc_id: String,
    pub chunks: usize,
    pub chunk_ids: Vec<String>,
    pub ingested_at: DateTime<Utc>,
}

/// A local file to ingest.
#[derive(Debug, Clone, Default)]
pub struct FileIngest {
    pub path: PathBuf,
    /// Generated when absent.
    pub doc_id: Option<String>,
    /// Detected from the file extension when absent.
    pub mime_type: Option<String>,
    pub meta: MetadataInput,
}

/// A web page (or any fetchable document) to ingest.
#[derive(Debug, Clone, Default)]
pub struct UrlIngest {
    pub url: String,
    pub doc_id: Option<String>,
    pub meta: MetadataInput,
}

/// The ingestion pipeline and its collaborators.
pub struct Pipeline {
    config: Config,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    registry: Arc<dyn RegistryStore>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        registry: Arc<dyn RegistryStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            vectors,
            registry,
        }
    }

    /// Build the pipeline with the collaborators named in `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let vectors = create_vector_store(&config.vector_store)?;
        let registry = Arc::new(JsonFileRegistry::new(config.storage.registry_path.clone()));
        Ok(Self::new(config, embedder, vectors, registry))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn vectors(&self) -> &dyn VectorStore {
        self.vectors.as_ref()
    }

    pub fn registry(&self) -> &dyn RegistryStore {
        self.registry.as_ref()
    }

    /// Chunk and prefix `content` without touching any store.
    pub fn prepare_chunks(
        &self,
        doc_id: &str,
        meta: &DocumentMeta,
        content: &ExtractedContent,
    ) -> Result<Vec<Chunk>> {
        let params = ChunkParams::from(&self.config.chunking);
        let fragments = chunk_content(content, &params);
        if fragments.is_empty() {
            return Err(IngestError::EmptyContent {
                doc_id: doc_id.to_string(),
            });
        }
        Ok(build_chunks(doc_id, meta, &fragments))
    }

    /// Replace a document's chunks and registry entry with `job`.
    pub async fn ingest(&self, job: IngestJob) -> Result<IngestReport> {
        let doc_id = job.doc_id.as_str();
        if doc_id.trim().is_empty() {
            return Err(IngestError::Validation("document id must not be empty".into()));
        }

        let chunks = self.prepare_chunks(doc_id, &job.meta, &job.content)?;
        tracing::debug!(doc_id, chunks = chunks.len(), "document chunked");

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let policy = BatchPolicy::from(&self.config.embedding);
        let vectors = embed_all(self.embedder.as_ref(), &texts, &policy).await?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: chunk_metadata(job.origin, &job.meta, &job.source, chunk),
                vector,
            })
            .collect();

        // A failed upsert must leave the previous chunks in place.
        let previous = self.vectors.ids(&Filter::doc_id(doc_id)).await?;
        self.vectors.upsert(&records).await?;
        let stale: Vec<String> = previous
            .into_iter()
            .filter(|id| !chunks.iter().any(|c| &c.id == id))
            .collect();
        self.vectors.delete_ids(&stale).await?;

        let now = Utc::now();
        self.registry
            .put(
                doc_id,
                EntryPatch {
                    origin: Some(job.origin),
                    meta: Some(job.meta.clone()),
                    source: Some(job.source.clone()),
                    chunks: Some(chunks.len()),
                    last_ingested: Some(now),
                    last_fetched: job.fetched_at,
                },
            )
            .await?;

        tracing::info!(doc_id, chunks = chunks.len(), "document ingested");

        Ok(IngestReport {
            doc_id: doc_id.to_string(),
            chunks: chunks.len(),
            chunk_ids: chunks.into_iter().map(|c| c.id).collect(),
            ingested_at: now,
        })
    }

    /// Ingest a local file, recording its path so it can be reindexed.
    pub async fn ingest_file(&self, request: FileIngest) -> Result<IngestReport> {
        let (bytes, source) = self.read_file(&request.path, request.mime_type.as_deref()).await?;
        let mime = source.mime_type.clone().unwrap_or_default();
        let content = extract::extract(&bytes, &mime)?;

        self.ingest(IngestJob {
            doc_id: request.doc_id.unwrap_or_else(new_doc_id),
            origin: Origin::File,
            meta: normalize_metadata(&request.meta),
            source,
            content,
            fetched_at: None,
        })
        .await
    }

    /// Fetch and ingest a URL. The page title is used when none is given.
    pub async fn ingest_url(&self, request: UrlIngest) -> Result<IngestReport> {
        let url = request.url.trim();
        if url.is_empty() {
            return Err(IngestError::Validation("url must not be empty".into()));
        }
        let (content, mime, page_title) = self.fetch(&parse_url(url)?).await?;

        let mut meta = normalize_metadata(&request.meta);
        if meta.title.is_none() {
            meta.title = page_title;
        }

        self.ingest(IngestJob {
            doc_id: request.doc_id.unwrap_or_else(new_doc_id),
            origin: Origin::Url,
            meta,
            source: SourceRef {
                url: Some(url.to_string()),
                mime_type: Some(mime),
                ..Default::default()
            },
            content,
            fetched_at: Some(Utc::now()),
        })
        .await
    }

    /// Rebuild a document from its recorded source.
    ///
    /// Files are re-read from their recorded path, URLs re-fetched, and
    /// articles re-sliced from their parent issue.
    pub async fn reindex(&self, doc_id: &str) -> Result<IngestReport> {
        let entry = self.require_entry(doc_id).await?;
        let meta = entry.meta.clone();
        self.reingest(entry, meta).await
    }

    /// Merge `patch` into a document's metadata and re-ingest it so chunk
    /// prefixes and metadata snapshots reflect the change.
    pub async fn update_metadata(&self, doc_id: &str, patch: &MetadataInput) -> Result<IngestReport> {
        let entry = self.require_entry(doc_id).await?;
        let meta = merge_metadata(&entry.meta, patch);
        self.reingest(entry, meta).await
    }

    /// Remove a document's chunks and registry entry.
    ///
    /// Chunks are deleted even when the registry has no entry, so stale
    /// vectors left by an interrupted ingestion can be cleared. Returns
    /// whether a registry entry existed.
    pub async fn delete_document(&self, doc_id: &str) -> Result<bool> {
        self.vectors.delete(&Filter::doc_id(doc_id)).await?;
        let existed = self.registry.delete(doc_id).await?;
        tracing::info!(doc_id, existed, "document deleted");
        Ok(existed)
    }

    /// All registry entries.
    pub async fn list(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self.registry.list().await?)
    }

    pub(crate) async fn require_entry(&self, doc_id: &str) -> Result<RegistryEntry> {
        self.registry
            .get(doc_id)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("document {}", doc_id)))
    }

    async fn reingest(&self, entry: RegistryEntry, meta: DocumentMeta) -> Result<IngestReport> {
        if entry.source.parent_doc_id.is_some() {
            return self.reslice_article(&entry, meta).await;
        }

        match entry.origin {
            Origin::File => {
                let path = entry.source.source_path.as_deref().ok_or_else(|| {
                    IngestError::NotFound(format!("document {} has no stored file", entry.doc_id))
                })?;
                let (bytes, source) = self
                    .read_file(Path::new(path), entry.source.mime_type.as_deref())
                    .await?;
                let mime = source.mime_type.clone().unwrap_or_default();
                let content = extract::extract(&bytes, &mime)?;
                self.ingest(IngestJob {
                    doc_id: entry.doc_id,
                    origin: Origin::File,
                    meta,
                    source: SourceRef {
                        file_name: entry.source.file_name.or(source.file_name),
                        ..source
                    },
                    content,
                    fetched_at: None,
                })
                .await
            }
            Origin::Url => {
                let url = entry.source.url.clone().ok_or_else(|| {
                    IngestError::NotFound(format!("document {} has no recorded url", entry.doc_id))
                })?;
                let (content, mime, _) = self.fetch(&parse_url(&url)?).await?;
                self.ingest(IngestJob {
                    doc_id: entry.doc_id,
                    origin: Origin::Url,
                    meta,
                    source: SourceRef {
                        mime_type: Some(mime),
                        ..entry.source
                    },
                    content,
                    fetched_at: Some(Utc::now()),
                })
                .await
            }
        }
    }

    /// Read a source file, enforcing the size limit and the PDF header.
    pub(crate) async fn read_file(
        &self,
        path: &Path,
        declared_mime: Option<&str>,
    ) -> Result<(Vec<u8>, SourceRef)> {
        let missing = || IngestError::NotFound(format!("file {}", path.display()));
        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => missing(),
            _ => IngestError::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(missing());
        }

        let limit = self.config.ingest.max_file_bytes();
        if metadata.len() > limit {
            return Err(IngestError::Validation(format!(
                "file {} exceeds limit of {} MB",
                path.display(),
                self.config.ingest.max_file_mb
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = detect_mime(&file_name, declared_mime);
        if mime == MIME_PDF && !has_pdf_magic(&bytes) {
            return Err(IngestError::Validation(format!(
                "{} is not a PDF (missing %PDF header)",
                file_name
            )));
        }

        let source_path = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        let source = SourceRef {
            file_name: Some(file_name),
            mime_type: Some(mime),
            source_path: Some(source_path.to_string_lossy().into_owned()),
            content_hash: Some(content_hash(&bytes)),
            ..Default::default()
        };

        Ok((bytes, source))
    }

    /// Download a URL and extract its text, plus the HTML title when present.
    async fn fetch(&self, url: &Url) -> Result<(ExtractedContent, String, Option<String>)> {
        let fetch = &self.config.fetch;
        let client = reqwest::Client::builder()
            .user_agent(fetch.user_agent.clone())
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .build()
            .map_err(anyhow::Error::from)?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch {}: {}", url, e))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IngestError::NotFound(format!("url {}", url)));
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!("Failed to fetch {}: HTTP {}", url, status).into());
        }
        if response.content_length().is_some_and(|len| len > fetch.max_bytes) {
            return Err(IngestError::Validation(format!(
                "{} exceeds the fetch limit of {} bytes",
                url, fetch.max_bytes
            )));
        }

        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(anyhow::Error::from)?;
        if bytes.len() as u64 > fetch.max_bytes {
            return Err(IngestError::Validation(format!(
                "{} exceeds the fetch limit of {} bytes",
                url, fetch.max_bytes
            )));
        }

        let mime = match detect_mime(url.path(), declared.as_deref()) {
            m if m == MIME_OCTET && declared.is_none() => MIME_HTML.to_string(),
            m => m,
        };

        let title = (mime == MIME_HTML)
            .then(|| extract::html_title(&String::from_utf8_lossy(&bytes)))
            .flatten();
        let content = extract::extract(&bytes, &mime)?;
        tracing::info!(%url, %mime, bytes = bytes.len(), "fetched");
        Ok((content, mime, title))
    }
}

/// Parse an absolute `http(s)` URL.
fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|e| IngestError::Validation(format!("invalid url {:?}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(IngestError::Validation(format!(
            "unsupported url scheme {:?} in {}",
            other, url
        ))),
    }
}

/// A fresh random document id.
pub fn new_doc_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
