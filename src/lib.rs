//! # Folio Harness
//!
//! Document ingestion and retrieval chunking for magazine archives.
//!
//! Folio Harness turns files, web pages, and above all paginated magazine
//! PDFs into retrieval-ready chunks that carry bibliographic metadata, and
//! groups raw retrieval hits back into citable sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │ Extract  │──▶│ Normalize │──▶│  Chunk  │──▶│ Metadata │──▶│ Embed+Store │
//! │ PDF/HTML │   │           │   │         │   │ + ids    │   │ + Registry  │
//! └────┬─────┘   └───────────┘   └─────────┘   └──────────┘   └──────┬──────┘
//!      │                                                             │
//!      ▼                                                             ▼
//! ┌──────────┐   ┌───────────┐   ┌─────────┐                  ┌────────────┐
//! │   TOC    │──▶│  Ranges   │──▶│  Slice  │── per article    │   Search   │
//! │ + offset │   │           │   │         │                  │ + grouping │
//! └──────────┘   └───────────┘   └─────────┘                  └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! folio ingest-file ./issue-2021-3.pdf --doc-id sotsiaaltoo-2021-3
//! folio parse-issue sotsiaaltoo-2021-3
//! folio ingest-articles sotsiaaltoo-2021-3 ./articles.json
//! folio search "home care for the elderly" --audience social-worker
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`extract`] | Text extraction (PDF, DOCX, HTML, plain text) |
//! | [`normalize`] | Whitespace and hyphenation cleanup |
//! | [`chunk`] | Sentence-aware sliding-window chunking |
//! | [`metadata`] | Bibliographic normalization, prefixes, chunk ids |
//! | [`toc`] | Magazine TOC detection and offset inference |
//! | [`ranges`] | Article page-range resolution |
//! | [`slice`] | Per-article PDF slicing |
//! | [`grouping`] | Hit grouping and short references |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store abstraction |
//! | [`registry`] | Persisted document registry |
//! | [`ingest`] | Ingestion pipeline |
//! | [`issue`] | Issue parsing and article ingestion |
//! | [`search`] | Semantic search |
//! | [`commands`] | CLI command handlers |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod grouping;
pub mod ingest;
pub mod issue;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod ranges;
pub mod registry;
pub mod search;
pub mod slice;
pub mod store;
pub mod toc;

pub use error::{IngestError, Result};
pub use ingest::Pipeline;
