//! Bibliographic metadata normalization and chunk identity.
//!
//! Loose caller input ([`MetadataInput`]) is normalized into a
//! [`DocumentMeta`]: audiences outside the known set become `BOTH`, author
//! and page lists accept delimited strings, JSON-array strings, or lists,
//! and every string field is trimmed and capped.
//!
//! Before embedding, each fragment is prefixed with a labelled block of the
//! document's bibliographic fields so that even chunks whose body never
//! names the article still carry its title, authors, and issue.
//!
//! Chunk ids are `{doc_id}::{ordinal}::{hash}` where `hash` is the first 12
//! hex digits of the SHA-256 of the final (prefixed) text. Re-ingesting
//! unchanged content reproduces the same ids; editing one chunk changes
//! only that chunk's id.

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::chunk::Fragment;
use crate::grouping::collapse_pages;
use crate::models::{Audience, Chunk, ChunkMetadata, DocumentMeta, Origin, SourceRef};

pub const MAX_AUTHORS: usize = 12;
pub const MAX_PAGES: usize = 50;
pub const MAX_TITLE_CHARS: usize = 255;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_PAGE_RANGE_CHARS: usize = 120;
pub const MAX_ISSUE_CHARS: usize = 160;
pub const MAX_ARTICLE_ID_CHARS: usize = 200;
const MAX_FIELD_CHARS: usize = 255;

const YEAR_RANGE: std::ops::RangeInclusive<i64> = 1800..=2100;
const ID_HASH_LEN: usize = 12;

/// A list given either as one delimited string or as a JSON list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ListInput {
    Text(String),
    Items(Vec<Value>),
}

impl From<&str> for ListInput {
    fn from(s: &str) -> Self {
        ListInput::Text(s.to_string())
    }
}

impl From<Vec<String>> for ListInput {
    fn from(items: Vec<String>) -> Self {
        ListInput::Items(items.into_iter().map(Value::String).collect())
    }
}

/// Raw, unvalidated bibliographic input.
///
/// `None` means "not supplied". When merged onto existing metadata a
/// supplied empty string clears the field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub audience: Option<String>,
    pub authors: Option<ListInput>,
    pub year: Option<Value>,
    pub section: Option<String>,
    pub journal_title: Option<String>,
    pub issue_id: Option<String>,
    pub issue_label: Option<String>,
    pub article_id: Option<String>,
    pub pages: Option<ListInput>,
    pub page_range: Option<String>,
}

/// Map any audience string onto the known set; everything else is `BOTH`.
pub fn normalize_audience(value: Option<&str>) -> Audience {
    match value.map(|v| v.trim().to_uppercase()).as_deref() {
        Some("SOCIAL_WORKER") => Audience::SocialWorker,
        Some("CLIENT") => Audience::Client,
        _ => Audience::Both,
    }
}

/// Trim, drop if empty, and cap at `max_chars` characters.
pub fn trim_or_none(value: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect::<String>().trim_end().to_string())
}

/// Author list from a delimited string (`,` `;` or newline), a JSON-array
/// string, or a list.
pub fn parse_authors(input: &ListInput) -> Vec<String> {
    let items: Vec<String> = match input {
        ListInput::Items(values) => values.iter().filter_map(value_as_text).collect(),
        ListInput::Text(text) => {
            let trimmed = text.trim();
            match parse_json_array(trimmed) {
                Some(values) => values.iter().filter_map(value_as_text).collect(),
                None => trimmed
                    .split([',', ';', '\n'])
                    .map(str::to_string)
                    .collect(),
            }
        }
    };

    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_AUTHORS)
        .collect()
}

/// Page list from a delimited string (`,` `;` or whitespace), a JSON-array
/// string, or a list. Only positive integers are kept.
pub fn parse_pages(input: &ListInput) -> Vec<u32> {
    let values: Vec<Value> = match input {
        ListInput::Items(values) => values.clone(),
        ListInput::Text(text) => {
            let trimmed = text.trim();
            match parse_json_array(trimmed) {
                Some(values) => values,
                None => trimmed
                    .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            }
        }
    };

    values
        .iter()
        .filter_map(value_as_int)
        .filter_map(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .take(MAX_PAGES)
        .collect()
}

/// A plausible publication year, or `None`.
pub fn parse_year(value: &Value) -> Option<i32> {
    let year = value_as_int(value)?;
    if YEAR_RANGE.contains(&year) {
        i32::try_from(year).ok()
    } else {
        None
    }
}

fn parse_json_array(text: &str) -> Option<Vec<Value>> {
    if !text.starts_with('[') {
        return None;
    }
    serde_json::from_str::<Vec<Value>>(text).ok()
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn value_as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Normalize caller input into document metadata.
pub fn normalize_metadata(input: &MetadataInput) -> DocumentMeta {
    merge_metadata(&DocumentMeta::default(), input)
}

/// Apply the supplied fields of `patch` on top of `base`.
pub fn merge_metadata(base: &DocumentMeta, patch: &MetadataInput) -> DocumentMeta {
    let mut meta = base.clone();

    if let Some(title) = &patch.title {
        meta.title = trim_or_none(Some(title), MAX_TITLE_CHARS);
    }
    if let Some(description) = &patch.description {
        meta.description = trim_or_none(Some(description), MAX_DESCRIPTION_CHARS);
    }
    if let Some(audience) = &patch.audience {
        meta.audience = normalize_audience(Some(audience));
    }
    if let Some(authors) = &patch.authors {
        meta.authors = parse_authors(authors);
    }
    if let Some(year) = &patch.year {
        meta.year = parse_year(year);
    }
    if let Some(section) = &patch.section {
        meta.section = trim_or_none(Some(section), MAX_FIELD_CHARS);
    }
    if let Some(journal) = &patch.journal_title {
        meta.journal_title = trim_or_none(Some(journal), MAX_FIELD_CHARS);
    }
    if let Some(issue_id) = &patch.issue_id {
        meta.issue_id = trim_or_none(Some(issue_id), MAX_ISSUE_CHARS);
    }
    if let Some(issue_label) = &patch.issue_label {
        meta.issue_label = trim_or_none(Some(issue_label), MAX_ISSUE_CHARS);
    }
    if let Some(article_id) = &patch.article_id {
        meta.article_id = trim_or_none(Some(article_id), MAX_ARTICLE_ID_CHARS);
    }
    if let Some(pages) = &patch.pages {
        meta.pages = parse_pages(pages);
    }
    if let Some(page_range) = &patch.page_range {
        meta.page_range = trim_or_none(Some(page_range), MAX_PAGE_RANGE_CHARS);
    }

    meta
}

/// Labelled bibliographic block, one line per present field.
pub fn build_prefix(meta: &DocumentMeta) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(title) = &meta.title {
        lines.push(format!("Title: {}", title));
    }
    if let Some(description) = &meta.description {
        lines.push(format!("Description: {}", description));
    }
    if !meta.authors.is_empty() {
        lines.push(format!("Authors: {}", meta.authors.join("; ")));
    }
    if let Some(journal) = &meta.journal_title {
        lines.push(format!("Journal: {}", journal));
    }
    if let Some(issue) = meta.issue_label.as_ref().or(meta.issue_id.as_ref()) {
        lines.push(format!("Issue: {}", issue));
    }
    if let Some(section) = &meta.section {
        lines.push(format!("Section: {}", section));
    }
    if let Some(year) = meta.year {
        lines.push(format!("Year: {}", year));
    }
    let pages = meta
        .page_range
        .clone()
        .or_else(|| (!meta.pages.is_empty()).then(|| collapse_pages(&meta.pages)));
    if let Some(pages) = pages {
        lines.push(format!("Pages: {}", pages));
    }

    lines.join("\n")
}

/// Prefix block followed by the fragment.
pub fn compose_chunk_text(prefix: &str, fragment: &str) -> String {
    if prefix.is_empty() {
        fragment.to_string()
    } else {
        format!("{}\n\n{}", prefix, fragment)
    }
}

/// SHA-256 of `data` as lowercase hex.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Stable chunk id derived from document, position, and final text.
pub fn chunk_id(doc_id: &str, ordinal: usize, final_text: &str) -> String {
    chunk_id_from_hash(doc_id, ordinal, &content_hash(final_text.as_bytes()))
}

fn chunk_id_from_hash(doc_id: &str, ordinal: usize, hash: &str) -> String {
    format!("{}::{}::{}", doc_id, ordinal, &hash[..ID_HASH_LEN])
}

/// Turn cleaned fragments into prefixed, identified chunks.
pub fn build_chunks(doc_id: &str, meta: &DocumentMeta, fragments: &[Fragment]) -> Vec<Chunk> {
    let prefix = build_prefix(meta);
    fragments
        .iter()
        .enumerate()
        .map(|(ordinal, fragment)| {
            let text = compose_chunk_text(&prefix, &fragment.text);
            let hash = content_hash(text.as_bytes());
            Chunk {
                id: chunk_id_from_hash(doc_id, ordinal, &hash),
                document_id: doc_id.to_string(),
                ordinal,
                page: fragment.page,
                text,
                hash,
            }
        })
        .collect()
}

/// Metadata snapshot stored next to a chunk in the vector store.
pub fn chunk_metadata(
    origin: Origin,
    meta: &DocumentMeta,
    source: &SourceRef,
    chunk: &Chunk,
) -> ChunkMetadata {
    ChunkMetadata {
        doc_id: chunk.document_id.clone(),
        chunk: chunk.ordinal,
        page: chunk.page,
        origin,
        audience: meta.audience,
        title: meta.title.clone(),
        description: meta.description.clone(),
        authors: (!meta.authors.is_empty())
            .then(|| serde_json::to_string(&meta.authors).unwrap_or_default()),
        year: meta.year,
        section: meta.section.clone(),
        journal_title: meta.journal_title.clone(),
        issue_id: meta.issue_id.clone(),
        issue_label: meta.issue_label.clone(),
        article_id: meta.article_id.clone(),
        pages: (!meta.pages.is_empty())
            .then(|| serde_json::to_string(&meta.pages).unwrap_or_default()),
        page_range: meta.page_range.clone(),
        file_name: source.file_name.clone(),
        mime_type: source.mime_type.clone(),
        url: source.url.clone(),
        parent_doc_id: source.parent_doc_id.clone(),
        hash: chunk.hash.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audience_known_values() {
        assert_eq!(normalize_audience(Some("client")), Audience::Client);
        assert_eq!(normalize_audience(Some(" SOCIAL_WORKER ")), Audience::SocialWorker);
        assert_eq!(normalize_audience(Some("BOTH")), Audience::Both);
    }

    #[test]
    fn test_audience_unknown_defaults_to_both() {
        for value in [None, Some(""), Some("ADMIN"), Some("social worker"), Some("  ")] {
            assert_eq!(normalize_audience(value), Audience::Both, "{:?}", value);
        }
    }

    #[test]
    fn test_authors_delimited_string() {
        let authors = parse_authors(&ListInput::from("Jane Doe; John Roe,  ,Mari Maasikas"));
        assert_eq!(authors, vec!["Jane Doe", "John Roe", "Mari Maasikas"]);
    }

    #[test]
    fn test_authors_json_array_string_keeps_commas() {
        let authors = parse_authors(&ListInput::from(r#"["Doe, Jane", " Roe, John "]"#));
        assert_eq!(authors, vec!["Doe, Jane", "Roe, John"]);
    }

    #[test]
    fn test_authors_native_list_capped() {
        let many: Vec<String> = (0..20).map(|i| format!("Author {}", i)).collect();
        let authors = parse_authors(&ListInput::from(many));
        assert_eq!(authors.len(), MAX_AUTHORS);
        assert_eq!(authors[0], "Author 0");
    }

    #[test]
    fn test_year_range() {
        assert_eq!(parse_year(&json!(2021)), Some(2021));
        assert_eq!(parse_year(&json!(" 1999 ")), Some(1999));
        assert_eq!(parse_year(&json!(1700)), None);
        assert_eq!(parse_year(&json!("2200")), None);
        assert_eq!(parse_year(&json!("next year")), None);
        assert_eq!(parse_year(&json!(2020.5)), None);
    }

    #[test]
    fn test_pages_from_every_form() {
        assert_eq!(parse_pages(&ListInput::from("3, 4;28 30")), vec![3, 4, 28, 30]);
        assert_eq!(parse_pages(&ListInput::from("[5, \"6\", -1, 0]")), vec![5, 6]);
        assert_eq!(
            parse_pages(&ListInput::Items(vec![json!(7), json!("x"), json!(8)])),
            vec![7, 8]
        );
        let long = (1..=80).map(|n| n.to_string()).collect::<Vec<_>>().join(",");
        assert_eq!(parse_pages(&ListInput::Text(long)).len(), MAX_PAGES);
    }

    #[test]
    fn test_trim_or_none_caps_length() {
        assert_eq!(trim_or_none(Some("   "), 10), None);
        assert_eq!(trim_or_none(None, 10), None);
        assert_eq!(trim_or_none(Some(" abcdefghijkl "), 5), Some("abcde".to_string()));
    }

    #[test]
    fn test_merge_keeps_unsupplied_fields() {
        let base = normalize_metadata(&MetadataInput {
            title: Some("Original".into()),
            audience: Some("CLIENT".into()),
            year: Some(json!(2020)),
            ..Default::default()
        });
        let merged = merge_metadata(
            &base,
            &MetadataInput {
                section: Some("Uudised".into()),
                year: Some(json!("")),
                ..Default::default()
            },
        );
        assert_eq!(merged.title.as_deref(), Some("Original"));
        assert_eq!(merged.audience, Audience::Client);
        assert_eq!(merged.section.as_deref(), Some("Uudised"));
        assert_eq!(merged.year, None);
    }

    #[test]
    fn test_prefix_order_and_presence() {
        let meta = normalize_metadata(&MetadataInput {
            title: Some("Social work today".into()),
            authors: Some(ListInput::from("Jane Doe; John Roe")),
            journal_title: Some("Sotsiaaltöö".into()),
            issue_label: Some("2021/3".into()),
            year: Some(json!(2021)),
            pages: Some(ListInput::from("12 13 14")),
            ..Default::default()
        });
        assert_eq!(
            build_prefix(&meta),
            "Title: Social work today\nAuthors: Jane Doe; John Roe\nJournal: Sotsiaaltöö\nIssue: 2021/3\nYear: 2021\nPages: 12–14"
        );
    }

    #[test]
    fn test_empty_metadata_no_prefix() {
        let meta = DocumentMeta::default();
        assert_eq!(build_prefix(&meta), "");
        assert_eq!(compose_chunk_text("", "body"), "body");
    }

    #[test]
    fn test_chunk_ids_are_stable_and_content_addressed() {
        let meta = normalize_metadata(&MetadataInput {
            title: Some("T".into()),
            ..Default::default()
        });
        let fragments = vec![
            Fragment { page: Some(1), text: "one".into() },
            Fragment { page: Some(2), text: "two".into() },
        ];
        let first = build_chunks("doc", &meta, &fragments);
        let again = build_chunks("doc", &meta, &fragments);
        assert_eq!(first, again);
        assert!(first[0].id.starts_with("doc::0::"));
        for chunk in &first {
            assert_eq!(chunk.id, chunk_id("doc", chunk.ordinal, &chunk.text));
            assert!(chunk.id.ends_with(&chunk.hash[..ID_HASH_LEN]));
        }

        let mut edited = fragments.clone();
        edited[1].text = "twO".into();
        let changed = build_chunks("doc", &meta, &edited);
        assert_eq!(changed[0].id, first[0].id);
        assert_ne!(changed[1].id, first[1].id);
    }

    #[test]
    fn test_chunk_metadata_encodes_lists_as_json() {
        let meta = normalize_metadata(&MetadataInput {
            authors: Some(ListInput::from("Doe, Jane")),
            pages: Some(ListInput::from("4 5")),
            ..Default::default()
        });
        let chunks = build_chunks("d", &meta, &[Fragment { page: None, text: "x".into() }]);
        let snapshot = chunk_metadata(Origin::File, &meta, &SourceRef::default(), &chunks[0]);
        assert_eq!(snapshot.authors.as_deref(), Some(r#"["Doe","Jane"]"#));
        assert_eq!(snapshot.pages.as_deref(), Some("[4,5]"));
        assert_eq!(snapshot.hash, chunks[0].hash);
    }
}
