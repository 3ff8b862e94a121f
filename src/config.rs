use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub toc: TocConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// JSON file holding the document registry.
    pub registry_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_single_chunk_threshold")]
    pub single_chunk_threshold: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            single_chunk_threshold: default_single_chunk_threshold(),
        }
    }
}

fn default_chunk_size() -> usize {
    1200
}
fn default_overlap() -> usize {
    200
}
fn default_single_chunk_threshold() -> usize {
    1500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound on the summed characters of one request.
    #[serde(default = "default_max_batch_chars")]
    pub max_batch_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_embedding_base_url(),
            batch_size: default_batch_size(),
            max_batch_chars: default_max_batch_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_batch_chars() -> usize {
    200_000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default = "default_chroma_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            url: default_chroma_url(),
            collection: default_collection(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_vector_provider() -> String {
    "memory".to_string()
}
fn default_chroma_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_collection() -> String {
    "folio".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_max_top_k() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct TocConfig {
    /// Leader lines ("Title .... 12") needed to call a page a TOC without a keyword.
    #[serde(default = "default_min_entry_lines")]
    pub min_entry_lines: usize,
    /// Leading pages considered when nothing else looks like a TOC.
    #[serde(default = "default_fallback_pages")]
    pub fallback_pages: usize,
    #[serde(default = "default_fallback_min_chars")]
    pub fallback_min_chars: usize,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Leading title words used when searching pages for an article start.
    #[serde(default = "default_phrase_words")]
    pub phrase_words: usize,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            min_entry_lines: default_min_entry_lines(),
            fallback_pages: default_fallback_pages(),
            fallback_min_chars: default_fallback_min_chars(),
            max_items: default_max_items(),
            phrase_words: default_phrase_words(),
        }
    }
}

fn default_min_entry_lines() -> usize {
    6
}
fn default_fallback_pages() -> usize {
    3
}
fn default_fallback_min_chars() -> usize {
    500
}
fn default_max_items() -> usize {
    80
}
fn default_phrase_words() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Responses larger than this are rejected.
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_bytes: default_fetch_max_bytes(),
        }
    }
}

fn default_fetch_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_user_agent() -> String {
    concat!("folio-harness/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_mb: default_max_file_mb(),
        }
    }
}

impl IngestConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }
}

fn default_max_file_mb() -> u64 {
    25
}

impl Config {
    /// A config with every section at its default and the registry at `registry_path`.
    pub fn minimal(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                registry_path: registry_path.into(),
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            toc: TocConfig::default(),
            fetch: FetchConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        tracing::warn!(
            chunk_size = config.chunking.chunk_size,
            overlap = config.chunking.overlap,
            "chunking.overlap is not smaller than chunk_size; windows will advance one character at a time"
        );
    }

    // Validate retrieval
    if config.retrieval.max_top_k == 0 {
        bail!("retrieval.max_top_k must be >= 1");
    }
    if config.retrieval.default_top_k == 0 {
        bail!("retrieval.default_top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.vector_store.provider.as_str() {
        "memory" | "chroma" => {}
        other => bail!(
            "Unknown vector store provider: '{}'. Must be memory or chroma.",
            other
        ),
    }

    if config.toc.min_entry_lines == 0 {
        bail!("toc.min_entry_lines must be > 0");
    }
    if config.toc.phrase_words == 0 {
        bail!("toc.phrase_words must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = parse("[storage]\nregistry_path = \"./data/registry.json\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 1200);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.default_top_k, 4);
        assert_eq!(config.toc.min_entry_lines, 6);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = parse(
            "[storage]\nregistry_path = \"r.json\"\n[chunking]\nchunk_size = 0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_overlap_equal_to_size_is_allowed() {
        let config = parse(
            "[storage]\nregistry_path = \"r.json\"\n[chunking]\nchunk_size = 100\noverlap = 100\n",
        )
        .unwrap();
        assert_eq!(config.chunking.overlap, 100);
    }

    #[test]
    fn test_openai_requires_model() {
        let err = parse("[storage]\nregistry_path = \"r.json\"\n[embedding]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_unknown_vector_store_rejected() {
        let err = parse("[storage]\nregistry_path = \"r.json\"\n[vector_store]\nprovider = \"faiss\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("faiss"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse(include_str!("../config/folio.example.toml")).unwrap();
        assert_eq!(config.vector_store.provider, "chroma");
        assert_eq!(config.fetch.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.ingest.max_file_bytes(), 25 * 1024 * 1024);
    }
}
