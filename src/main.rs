//! # Folio CLI (`folio`)
//!
//! The `folio` binary ingests documents and magazine issues, maintains the
//! document registry, and runs searches.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio ingest-file <path>` | Extract, chunk, embed and register a local file |
//! | `folio ingest-url <url>` | Fetch and ingest a web page |
//! | `folio reindex <id>` | Rebuild a document from its recorded source |
//! | `folio update-meta <id> <json>` | Merge metadata and re-ingest |
//! | `folio delete <id>` | Remove a document and its chunks |
//! | `folio list` | List registered documents |
//! | `folio parse-issue <id>` | Propose article drafts from an issue's TOC |
//! | `folio ingest-articles <id> <json>` | Slice and ingest articles of an issue |
//! | `folio article-pdf <id> -o out.pdf` | Write an article's PDF |
//! | `folio slice <pdf> <range>` | Cut printed pages out of a local PDF |
//! | `folio search "<query>"` | Search ingested chunks |
//! | `folio chunk <path>` | Preview chunking without storing anything |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `folio_harness=info`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use folio_harness::commands;
use folio_harness::config;
use folio_harness::metadata::{normalize_audience, MetadataInput};
use folio_harness::models::Audience;
use folio_harness::Pipeline;

/// Folio: document ingestion and retrieval chunking for magazine archives.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/folio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio: document ingestion and retrieval chunking for magazine archives",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    /// Print structured JSON instead of a text report.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Metadata given on the command line, optionally on top of a JSON file.
#[derive(clap::Args)]
struct MetaArgs {
    /// JSON file with metadata fields (camelCase: title, authors, year, ...).
    #[arg(long)]
    meta: Option<PathBuf>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// SOCIAL_WORKER, CLIENT or BOTH.
    #[arg(long)]
    audience: Option<String>,
}

impl MetaArgs {
    fn to_input(&self) -> anyhow::Result<MetadataInput> {
        let mut input = commands::read_metadata(self.meta.as_deref())?;
        if self.title.is_some() {
            input.title = self.title.clone();
        }
        if self.description.is_some() {
            input.description = self.description.clone();
        }
        if let Some(audience) = &self.audience {
            input.audience = Some(audience.replace('-', "_"));
        }
        Ok(input)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a local file (PDF, DOCX, HTML, text).
    IngestFile {
        path: PathBuf,

        /// Document id; a random UUID when omitted.
        #[arg(long)]
        doc_id: Option<String>,

        /// MIME type; detected from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,

        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Fetch a URL and ingest its text.
    IngestUrl {
        url: String,

        #[arg(long)]
        doc_id: Option<String>,

        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Re-extract a document from its recorded source and re-ingest it.
    Reindex { doc_id: String },

    /// Merge a metadata patch into a document and re-ingest it.
    ///
    /// Fields present in the patch replace the stored ones; an empty string
    /// clears a field.
    UpdateMeta {
        doc_id: String,

        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Delete a document and all of its chunks.
    Delete { doc_id: String },

    /// List registered documents.
    List,

    /// Detect the table of contents of a registered issue PDF.
    ParseIssue {
        doc_id: String,

        /// Print-to-physical page offset; inferred when omitted.
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<i64>,

        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Slice and ingest articles of an issue from a JSON array.
    IngestArticles { issue_id: String, articles: PathBuf },

    /// Write the PDF of an ingested article.
    ArticlePdf {
        doc_id: String,

        #[arg(short, long, default_value = "article.pdf")]
        output: PathBuf,
    },

    /// Cut a printed page range (e.g. `7-12`) out of a local PDF.
    Slice {
        input: PathBuf,
        range: String,

        /// Print-to-physical page offset.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,

        #[arg(short, long, default_value = "slice.pdf")]
        output: PathBuf,
    },

    /// Search ingested chunks.
    Search {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Reader role (SOCIAL_WORKER, CLIENT, BOTH). All audiences when omitted.
        #[arg(long)]
        audience: Option<String>,

        /// Only search this document.
        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Show how a file would be chunked, without storing anything.
    Chunk {
        path: PathBuf,

        #[arg(long)]
        mime: Option<String>,

        #[command(flatten)]
        meta: MetaArgs,
    },
}

fn parse_audience(value: Option<String>) -> Option<Audience> {
    value.map(|v| normalize_audience(Some(&v.replace('-', "_"))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("folio_harness=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Slice {
        input,
        range,
        offset,
        output,
    } = &cli.command
    {
        return commands::run_slice(input, range, *offset, output);
    }

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::warn!(path = %cli.config.display(), "config file not found; using defaults");
        config::Config::minimal("./data/registry.json")
    };

    if let Commands::Chunk { path, mime, meta } = &cli.command {
        return commands::run_chunk(&cfg, path, meta.to_input()?, mime.as_deref());
    }

    let pipeline = Pipeline::from_config(cfg)?;
    let json = cli.json;

    match cli.command {
        Commands::IngestFile {
            path,
            doc_id,
            mime,
            meta,
        } => {
            commands::run_ingest_file(&pipeline, path, doc_id, mime, meta.to_input()?, json)
                .await?;
        }
        Commands::IngestUrl { url, doc_id, meta } => {
            commands::run_ingest_url(&pipeline, url, doc_id, meta.to_input()?, json).await?;
        }
        Commands::Reindex { doc_id } => {
            commands::run_reindex(&pipeline, &doc_id, json).await?;
        }
        Commands::UpdateMeta { doc_id, meta } => {
            commands::run_update_meta(&pipeline, &doc_id, meta.to_input()?, json).await?;
        }
        Commands::Delete { doc_id } => {
            commands::run_delete(&pipeline, &doc_id).await?;
        }
        Commands::List => {
            commands::run_list(&pipeline, json).await?;
        }
        Commands::ParseIssue {
            doc_id,
            offset,
            max_items,
        } => {
            commands::run_parse_issue(&pipeline, &doc_id, offset, max_items, json).await?;
        }
        Commands::IngestArticles { issue_id, articles } => {
            commands::run_ingest_articles(&pipeline, &issue_id, &articles, json).await?;
        }
        Commands::ArticlePdf { doc_id, output } => {
            commands::run_article_pdf(&pipeline, &doc_id, &output).await?;
        }
        Commands::Search {
            query,
            top_k,
            audience,
            doc_id,
        } => {
            commands::run_search(&pipeline, &query, top_k, parse_audience(audience), doc_id, json)
                .await?;
        }
        Commands::Slice { .. } | Commands::Chunk { .. } => {
            // Handled above
            unreachable!()
        }
    }

    Ok(())
}
