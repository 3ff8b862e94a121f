//! CLI command handlers.
//!
//! Each `run_*` function backs one `folio` subcommand: it drives the
//! [`Pipeline`] and prints a human-readable report to stdout. With `--json`
//! the structured result is printed instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::chunk::{chunk_content, ChunkParams};
use crate::config::Config;
use crate::extract::{self, detect_mime};
use crate::ingest::{FileIngest, IngestReport, Pipeline, UrlIngest};
use crate::issue::ArticleInput;
use crate::metadata::{build_chunks, build_prefix, normalize_metadata, MetadataInput};
use crate::models::{Audience, Origin};
use crate::ranges::{parse_range, shift_page};
use crate::search::SearchRequest;
use crate::slice::slice_pdf;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_ingest(report: &IngestReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!("Ingested {}: {} chunk(s)", report.doc_id, report.chunks);
    Ok(())
}

/// Read an optional JSON metadata file.
pub fn read_metadata(path: Option<&Path>) -> Result<MetadataInput> {
    match path {
        None => Ok(MetadataInput::default()),
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read metadata file: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid metadata JSON in {}", path.display()))
        }
    }
}

pub async fn run_ingest_file(
    pipeline: &Pipeline,
    path: PathBuf,
    doc_id: Option<String>,
    mime_type: Option<String>,
    meta: MetadataInput,
    json: bool,
) -> Result<()> {
    let report = pipeline
        .ingest_file(FileIngest {
            path,
            doc_id,
            mime_type,
            meta,
        })
        .await?;
    print_ingest(&report, json)
}

pub async fn run_ingest_url(
    pipeline: &Pipeline,
    url: String,
    doc_id: Option<String>,
    meta: MetadataInput,
    json: bool,
) -> Result<()> {
    let report = pipeline.ingest_url(UrlIngest { url, doc_id, meta }).await?;
    print_ingest(&report, json)
}

pub async fn run_reindex(pipeline: &Pipeline, doc_id: &str, json: bool) -> Result<()> {
    let report = pipeline.reindex(doc_id).await?;
    print_ingest(&report, json)
}

pub async fn run_update_meta(
    pipeline: &Pipeline,
    doc_id: &str,
    patch: MetadataInput,
    json: bool,
) -> Result<()> {
    let report = pipeline.update_metadata(doc_id, &patch).await?;
    print_ingest(&report, json)
}

pub async fn run_delete(pipeline: &Pipeline, doc_id: &str) -> Result<()> {
    if pipeline.delete_document(doc_id).await? {
        println!("Deleted {}", doc_id);
    } else {
        println!("{} was not registered; removed any stray chunks.", doc_id);
    }
    Ok(())
}

pub async fn run_list(pipeline: &Pipeline, json: bool) -> Result<()> {
    let entries = pipeline.list().await?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!(
        "{:<40} {:<5} {:>6}  {:<20} TITLE",
        "DOC ID", "TYPE", "CHUNKS", "UPDATED"
    );
    for entry in &entries {
        let origin = match entry.origin {
            Origin::File => "FILE",
            Origin::Url => "URL",
        };
        println!(
            "{:<40} {:<5} {:>6}  {:<20} {}",
            entry.doc_id,
            origin,
            entry.chunks,
            entry.updated_at.format("%Y-%m-%d %H:%M:%S"),
            entry.meta.title.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} document(s)", entries.len());
    Ok(())
}

pub async fn run_parse_issue(
    pipeline: &Pipeline,
    doc_id: &str,
    offset: Option<i64>,
    max_items: Option<usize>,
    json: bool,
) -> Result<()> {
    let parsed = pipeline.parse_issue(doc_id, offset, max_items).await?;
    if json {
        return print_json(&parsed);
    }

    println!(
        "{}: {} page(s), TOC on {:?}, {} entr{}",
        parsed.doc_id,
        parsed.page_count,
        parsed.toc_pages,
        parsed.found_toc_items,
        if parsed.found_toc_items == 1 { "y" } else { "ies" }
    );
    match parsed.auto_offset {
        Some(auto) => println!("offset: inferred {}, using {}", auto, parsed.using_offset),
        None => println!("offset: not inferred, using {}", parsed.using_offset),
    }
    for draft in &parsed.drafts {
        let physical = match draft.end_page {
            Some(end) => format!("{}-{}", draft.start_page, end),
            None => format!("{}-?", draft.start_page),
        };
        println!("  p. {:<9} pdf {:<9} {}", draft.page_range, physical, draft.title);
        if !draft.authors.is_empty() {
            println!("  {:<24} {}", "", draft.authors.join("; "));
        }
    }
    Ok(())
}

pub async fn run_ingest_articles(
    pipeline: &Pipeline,
    issue_id: &str,
    articles_path: &Path,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(articles_path)
        .with_context(|| format!("Failed to read articles file: {}", articles_path.display()))?;
    let articles: Vec<ArticleInput> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid articles JSON in {}", articles_path.display()))?;

    let report = pipeline.ingest_articles(issue_id, &articles).await?;
    if json {
        return print_json(&report);
    }
    for inserted in &report.inserted {
        println!("  {} ({} chunks)", inserted.doc_id, inserted.chunks);
    }
    if !report.skipped.is_empty() {
        println!("Skipped input(s) without title or page range: {:?}", report.skipped);
    }
    println!("{} article(s) ingested from {}", report.count, report.issue_id);
    Ok(())
}

pub async fn run_article_pdf(pipeline: &Pipeline, doc_id: &str, output: &Path) -> Result<()> {
    let pdf = pipeline.article_pdf(doc_id).await?;
    std::fs::write(output, &pdf)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), pdf.len());
    Ok(())
}

/// Cut a printed page range out of a local PDF.
pub fn run_slice(input: &Path, range: &str, offset: i64, output: &Path) -> Result<()> {
    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let (start, end) = parse_range(range)?;
    let pdf = slice_pdf(&bytes, shift_page(start, offset)?, shift_page(end, offset)?)?;
    std::fs::write(output, &pdf)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), pdf.len());
    Ok(())
}

pub async fn run_search(
    pipeline: &Pipeline,
    query: &str,
    top_k: Option<usize>,
    audience: Option<Audience>,
    doc_id: Option<String>,
    json: bool,
) -> Result<()> {
    let response = pipeline
        .search(&SearchRequest {
            query: query.to_string(),
            top_k,
            audience,
            doc_id,
        })
        .await?;
    if json {
        return print_json(&response);
    }
    if response.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("Sources:");
    for (i, group) in response.groups.iter().enumerate() {
        let label = group
            .short_ref
            .clone()
            .or_else(|| group.title.clone())
            .or_else(|| group.document_id.clone())
            .unwrap_or_else(|| group.key.clone());
        println!("  {}. {} [{} hit(s)]", i + 1, label, group.hits);
    }

    println!("\nMatches:");
    for hit in &response.hits {
        let distance = hit
            .distance
            .map(|d| format!("{:.4}", d))
            .unwrap_or_else(|| "-".into());
        let page = hit
            .metadata
            .page
            .map(|p| format!(" p.{}", p))
            .unwrap_or_default();
        println!("  {} ({}{})", hit.id, distance, page);
        let preview: String = hit.text.chars().take(160).collect();
        println!("    {}", preview.replace('\n', " "));
    }
    Ok(())
}

/// Dry run: extract and chunk a file without embedding or storing anything.
pub fn run_chunk(config: &Config, path: &Path, meta: MetadataInput, mime: Option<&str>) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = detect_mime(&file_name, mime);
    let content = extract::extract(&bytes, &mime)?;

    let fragments = chunk_content(&content, &ChunkParams::from(&config.chunking));
    let meta = normalize_metadata(&meta);
    let chunks = build_chunks("preview", &meta, &fragments);

    let prefix = build_prefix(&meta);
    if !prefix.is_empty() {
        println!("Prefix:\n{}\n", prefix);
    }
    for chunk in &chunks {
        let page = chunk.page.map(|p| format!("p.{}", p)).unwrap_or_else(|| "-".into());
        println!(
            "#{:<3} {:<6} {:>5} chars  {}",
            chunk.ordinal,
            page,
            chunk.text.chars().count(),
            chunk.id
        );
    }
    println!("\n{} chunk(s) from {} ({})", chunks.len(), file_name, mime);
    Ok(())
}
