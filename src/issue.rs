//! Magazine issues: TOC drafts, per-article ingestion, and article PDFs.
//!
//! An issue is an ordinary registered PDF document. Parsing it proposes
//! article drafts from its table of contents; ingesting articles slices
//! each one out of the issue and registers it as its own document, with
//! chunks tagged by printed page numbers and a `parentDocId` pointing back
//! at the issue so it can be re-sliced later.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IngestError, Result};
use crate::extract::{extract_pdf, MIME_PDF};
use crate::ingest::{IngestJob, IngestReport, Pipeline};
use crate::metadata::{content_hash, normalize_metadata, ListInput, MetadataInput};
use crate::models::{DocumentMeta, ExtractedContent, Origin, PageText, SourceRef};
use crate::ranges::{choose_offset, parse_range, print_span_end, resolve_ranges, shift_page};
use crate::registry::RegistryEntry;
use crate::slice::{check_bounds, page_count, slice_pdf};
use crate::toc::analyze_issue;

/// Hex characters of the title hash used in generated article ids.
const ARTICLE_HASH_LEN: usize = 8;

/// One proposed article, ready for review before ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Printed range, e.g. `"7–12"`.
    pub page_range: String,
    /// Physical first page in the issue PDF.
    pub start_page: i64,
    /// Physical last page; `None` for the final article.
    pub end_page: Option<i64>,
}

/// Outcome of TOC analysis for an issue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueParse {
    pub doc_id: String,
    pub page_count: u32,
    pub toc_pages: Vec<u32>,
    pub found_toc_items: usize,
    pub auto_offset: Option<i64>,
    pub using_offset: i64,
    pub drafts: Vec<ArticleDraft>,
}

/// Caller description of one article to cut out of an issue.
///
/// `title` and `pageRange` (printed) are required. Physical pages come from
/// `startPage` + `endPage` when both are present, otherwise from the printed
/// range shifted by `offset`, or by the offset inferred from the issue.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleInput {
    pub title: Option<String>,
    pub page_range: Option<String>,
    pub authors: Option<ListInput>,
    pub section: Option<String>,
    pub description: Option<String>,
    pub year: Option<Value>,
    pub journal_title: Option<String>,
    pub issue_label: Option<String>,
    pub audience: Option<String>,
    pub article_id: Option<String>,
    pub start_page: Option<i64>,
    pub end_page: Option<i64>,
    pub offset: Option<i64>,
}

/// Result of [`Pipeline::ingest_articles`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlesReport {
    pub issue_id: String,
    pub count: usize,
    pub inserted: Vec<IngestReport>,
    /// Positions (0-based) of inputs lacking a title or page range.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<usize>,
}

/// A validated article, resolved to physical pages.
struct ArticlePlan {
    doc_id: String,
    meta: DocumentMeta,
    start: i64,
    end: i64,
    print_start: u32,
}

/// `{issue}::{first 8 hex of sha256(lowercased title)}`.
pub fn article_doc_id(issue_id: &str, title: &str) -> String {
    let hash = content_hash(title.trim().to_lowercase().as_bytes());
    format!("{}::{}", issue_id, &hash[..ARTICLE_HASH_LEN])
}

/// Slice `start..=end` out of an issue and extract it with printed page numbers.
pub fn article_content(
    issue_pdf: &[u8],
    start: i64,
    end: i64,
    print_start: Option<u32>,
) -> Result<(Vec<u8>, ExtractedContent)> {
    let sliced = slice_pdf(issue_pdf, start, end)?;
    let printed = print_start
        .map(|first| print_span_end(first, start, end).map(|last| first..=last))
        .transpose()?;
    let content = match (extract_pdf(&sliced)?, printed) {
        (ExtractedContent::PagedText(pages), Some(numbers)) => ExtractedContent::PagedText(
            numbers
                .zip(pages)
                .map(|(number, page)| PageText::new(number, page.text))
                .collect(),
        ),
        (content, _) => content,
    };
    Ok((sliced, content))
}

impl Pipeline {
    /// Detect an issue's TOC and propose article drafts.
    ///
    /// `offset` overrides the inferred print-to-physical offset;
    /// `max_items` overrides the configured cap on TOC entries.
    pub async fn parse_issue(
        &self,
        doc_id: &str,
        offset: Option<i64>,
        max_items: Option<usize>,
    ) -> Result<IssueParse> {
        let entry = self.require_entry(doc_id).await?;
        let bytes = self.issue_pdf(&entry).await?;
        let pages = issue_pages(&bytes)?;

        let mut toc_config = self.config().toc.clone();
        if let Some(max) = max_items {
            toc_config.max_items = max.max(1);
        }
        let report = analyze_issue(&pages, &toc_config);
        let using_offset = choose_offset(offset, report.inferred_offset);

        let drafts = resolve_ranges(&report.items, using_offset, None)?
            .into_iter()
            .map(|range| ArticleDraft {
                page_range: range.print_label(),
                start_page: range.start,
                end_page: range.end,
                title: range.item.title,
                authors: range.item.authors,
            })
            .collect();

        Ok(IssueParse {
            doc_id: doc_id.to_string(),
            page_count: pages.len() as u32,
            toc_pages: report.toc_pages,
            found_toc_items: report.items.len(),
            auto_offset: report.inferred_offset,
            using_offset,
            drafts,
        })
    }

    /// Slice each article out of an issue and ingest it as its own document.
    ///
    /// Inputs without a title or page range are skipped. Every remaining
    /// article is validated (range syntax and physical bounds) before any
    /// is ingested, so one bad range rejects the whole batch.
    pub async fn ingest_articles(
        &self,
        issue_id: &str,
        articles: &[ArticleInput],
    ) -> Result<ArticlesReport> {
        if articles.is_empty() {
            return Err(IngestError::Validation("at least one article is required".into()));
        }
        let issue = self.require_entry(issue_id).await?;
        let bytes = self.issue_pdf(&issue).await?;
        let pages_in_issue = page_count(&bytes)?;

        let mut inferred: Option<Option<i64>> = None;
        let mut plans = Vec::new();
        let mut skipped = Vec::new();

        for (i, article) in articles.iter().enumerate() {
            let title = article.title.as_deref().map(str::trim).unwrap_or_default();
            let page_range = article.page_range.as_deref().map(str::trim).unwrap_or_default();
            if title.is_empty() || page_range.is_empty() {
                tracing::warn!(issue_id, index = i, "article without title or page range skipped");
                skipped.push(i);
                continue;
            }

            let (print_start, print_end) = parse_range(page_range)?;
            let (start, end) = match (article.start_page, article.end_page) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    let offset = match article.offset {
                        Some(offset) => offset,
                        None => {
                            if inferred.is_none() {
                                let pages = issue_pages(&bytes)?;
                                inferred = Some(analyze_issue(&pages, &self.config().toc).inferred_offset);
                            }
                            choose_offset(None, inferred.flatten())
                        }
                    };
                    (shift_page(print_start, offset)?, shift_page(print_end, offset)?)
                }
            };
            check_bounds(start, end, pages_in_issue)?;
            print_span_end(print_start, start, end)?;

            plans.push(self.plan_article(&issue, article, title, page_range, start, end, print_start));
        }

        if plans.is_empty() {
            return Err(IngestError::Validation(
                "no article has both a title and a page range".into(),
            ));
        }

        let mut inserted = Vec::with_capacity(plans.len());
        for plan in plans {
            let (sliced, content) = article_content(&bytes, plan.start, plan.end, Some(plan.print_start))?;
            let report = self
                .ingest(IngestJob {
                    doc_id: plan.doc_id,
                    origin: Origin::File,
                    meta: plan.meta,
                    source: SourceRef {
                        file_name: issue.source.file_name.clone(),
                        mime_type: Some(MIME_PDF.to_string()),
                        content_hash: Some(content_hash(&sliced)),
                        parent_doc_id: Some(issue.doc_id.clone()),
                        start_page: Some(plan.start),
                        end_page: Some(plan.end),
                        print_start: Some(plan.print_start),
                        ..Default::default()
                    },
                    content,
                    fetched_at: None,
                })
                .await?;
            inserted.push(report);
        }

        tracing::info!(issue_id, articles = inserted.len(), skipped = skipped.len(), "articles ingested");

        Ok(ArticlesReport {
            issue_id: issue_id.to_string(),
            count: inserted.len(),
            inserted,
            skipped,
        })
    }

    /// The PDF of an article document, sliced from its parent issue.
    pub async fn article_pdf(&self, doc_id: &str) -> Result<Vec<u8>> {
        let entry = self.require_entry(doc_id).await?;
        let (parent_id, start, end) = article_span(&entry)?;
        let parent = self.require_entry(parent_id).await?;
        let bytes = self.issue_pdf(&parent).await?;
        slice_pdf(&bytes, start, end)
    }

    /// Re-cut an article from its parent issue and re-ingest it with `meta`.
    pub(crate) async fn reslice_article(
        &self,
        entry: &RegistryEntry,
        meta: DocumentMeta,
    ) -> Result<IngestReport> {
        let (parent_id, start, end) = article_span(entry)?;
        let parent = self.require_entry(parent_id).await?;
        let bytes = self.issue_pdf(&parent).await?;
        let (sliced, content) = article_content(&bytes, start, end, entry.source.print_start)?;

        self.ingest(IngestJob {
            doc_id: entry.doc_id.clone(),
            origin: entry.origin,
            meta,
            source: SourceRef {
                content_hash: Some(content_hash(&sliced)),
                ..entry.source.clone()
            },
            content,
            fetched_at: None,
        })
        .await
    }

    async fn issue_pdf(&self, entry: &RegistryEntry) -> Result<Vec<u8>> {
        if entry.source.mime_type.as_deref().is_some_and(|m| m != MIME_PDF) {
            return Err(IngestError::Validation(format!(
                "document {} is not a PDF",
                entry.doc_id
            )));
        }
        let path = entry.source.source_path.as_deref().ok_or_else(|| {
            IngestError::NotFound(format!("document {} has no stored file", entry.doc_id))
        })?;
        let (bytes, _) = self
            .read_file(std::path::Path::new(path), Some(MIME_PDF))
            .await?;
        Ok(bytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_article(
        &self,
        issue: &RegistryEntry,
        article: &ArticleInput,
        title: &str,
        page_range: &str,
        start: i64,
        end: i64,
        print_start: u32,
    ) -> ArticlePlan {
        let doc_id = article
            .article_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| article_doc_id(&issue.doc_id, title));

        let issue_meta = &issue.meta;
        let input = MetadataInput {
            title: Some(title.to_string()),
            description: article.description.clone(),
            audience: article
                .audience
                .clone()
                .or_else(|| Some(issue_meta.audience.as_str().to_string())),
            authors: article.authors.clone(),
            year: article
                .year
                .clone()
                .or_else(|| issue_meta.year.map(Value::from)),
            section: article.section.clone(),
            journal_title: article
                .journal_title
                .clone()
                .or_else(|| issue_meta.journal_title.clone()),
            issue_id: Some(issue.doc_id.clone()),
            issue_label: article
                .issue_label
                .clone()
                .or_else(|| issue_meta.issue_label.clone()),
            article_id: Some(doc_id.clone()),
            pages: None,
            page_range: Some(page_range.to_string()),
        };

        ArticlePlan {
            meta: normalize_metadata(&input),
            doc_id,
            start,
            end,
            print_start,
        }
    }
}

fn issue_pages(bytes: &[u8]) -> Result<Vec<PageText>> {
    match extract_pdf(bytes)? {
        ExtractedContent::PagedText(pages) => Ok(pages),
        ExtractedContent::PlainText(text) => Ok(vec![PageText::new(1, text)]),
    }
}

fn article_span(entry: &RegistryEntry) -> Result<(&str, i64, i64)> {
    let source = &entry.source;
    match (source.parent_doc_id.as_deref(), source.start_page, source.end_page) {
        (Some(parent), Some(start), Some(end)) => Ok((parent, start, end)),
        _ => Err(IngestError::Validation(format!(
            "document {} is not an article of an issue",
            entry.doc_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::fixtures::text_pdf;

    #[test]
    fn test_article_doc_id_ignores_title_case() {
        let a = article_doc_id("issue-2021-3", "Care at Home");
        let b = article_doc_id("issue-2021-3", "  care at home ");
        assert_eq!(a, b);
        assert!(a.starts_with("issue-2021-3::"));
        assert_eq!(a.len(), "issue-2021-3::".len() + ARTICLE_HASH_LEN);
    }

    #[test]
    fn test_article_content_uses_printed_pages() {
        let pdf = text_pdf(&["cover", "contents", "First article page", "Second article page"]);
        let (sliced, content) = article_content(&pdf, 3, 4, Some(27)).unwrap();
        assert_eq!(page_count(&sliced).unwrap(), 2);

        let pages = content.pages().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page, Some(27));
        assert_eq!(pages[1].page, Some(28));
        assert!(pages[0].text.contains("First"));
    }

    #[test]
    fn test_article_content_rejects_out_of_bounds() {
        let pdf = text_pdf(&["a", "b"]);
        assert!(matches!(
            article_content(&pdf, 2, 3, None),
            Err(IngestError::Range { .. })
        ));
    }

    #[test]
    fn test_article_content_rejects_printed_pages_past_u32() {
        let pdf = text_pdf(&["a", "b"]);
        assert!(matches!(
            article_content(&pdf, 1, 2, Some(u32::MAX)),
            Err(IngestError::Validation(_))
        ));
        let (_, content) = article_content(&pdf, 2, 2, Some(u32::MAX)).unwrap();
        assert_eq!(content.pages().unwrap()[0].page, Some(u32::MAX));
    }

    #[test]
    fn test_article_input_accepts_camel_case_json() {
        let input: ArticleInput = serde_json::from_str(
            r#"{"title":"A","pageRange":"7–12","authors":["X"],"startPage":12,"endPage":17}"#,
        )
        .unwrap();
        assert_eq!(input.page_range.as_deref(), Some("7–12"));
        assert_eq!(input.start_page, Some(12));
        assert!(input.offset.is_none());
    }
}
