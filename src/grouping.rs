//! Grouping of ranked search hits into citable sources.
//!
//! Hits are merged on `(article id, document id, trimmed title)`, missing
//! parts counting as empty strings. Titles are compared exactly: two chunks
//! of one article whose titles differ in case or spacing end up in
//! separate groups, and differing article ids never merge.
//!
//! Each group collects every page it saw (chunk pages and document page
//! lists) and renders them compactly (`"3–4, 28, 30"`), then synthesizes a
//! short reference from whatever bibliographic fields are present.

use std::collections::{BTreeSet, HashMap};

use crate::metadata::{parse_authors, parse_pages, ListInput};
use crate::models::{CitationGroup, SearchHit};

/// Render page numbers as sorted, deduplicated runs: `[3,4,28] → "3–4, 28"`.
pub fn collapse_pages(pages: &[u32]) -> String {
    let sorted: BTreeSet<u32> = pages.iter().copied().collect();
    let mut runs: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter();

    let Some(first) = iter.next() else {
        return String::new();
    };
    let (mut start, mut prev) = (first, first);

    let mut push_run = |start: u32, end: u32| {
        runs.push(if start == end {
            start.to_string()
        } else {
            format!("{}–{}", start, end)
        });
    };

    for page in iter {
        if page == prev + 1 {
            prev = page;
            continue;
        }
        push_run(start, prev);
        start = page;
        prev = page;
    }
    push_run(start, prev);

    runs.join(", ")
}

/// `(article id, document id, title)`, empty where absent.
type GroupKey = (String, String, String);

#[derive(Default)]
struct Accumulator {
    group: Option<CitationGroup>,
    pages: BTreeSet<u32>,
    ranges: Vec<String>,
}

/// Group hits into citations, most-cited first.
pub fn group_hits(hits: &[SearchHit]) -> Vec<CitationGroup> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, Accumulator> = HashMap::new();

    for hit in hits {
        let meta = &hit.metadata;
        let title = meta.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let document_id = (!hit.document_id.is_empty()).then(|| hit.document_id.clone());
        let key: GroupKey = (
            meta.article_id.clone().unwrap_or_default(),
            document_id.clone().unwrap_or_default(),
            title.unwrap_or_default().to_string(),
        );

        let acc = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Accumulator::default()
        });

        let group = acc.group.get_or_insert_with(|| CitationGroup {
            key: format!("{}|{}|{}", key.0, key.1, key.2),
            document_id: document_id.clone(),
            article_id: meta.article_id.clone(),
            title: title.map(str::to_string),
            authors: Vec::new(),
            year: None,
            journal_title: None,
            issue_label: None,
            section: None,
            url: None,
            hits: 0,
            best_distance: None,
            pages: None,
            short_ref: None,
            chunk_ids: Vec::new(),
        });

        group.hits += 1;
        group.chunk_ids.push(hit.id.clone());
        if let Some(distance) = hit.distance {
            group.best_distance = Some(group.best_distance.map_or(distance, |d| d.min(distance)));
        }
        if group.authors.is_empty() {
            if let Some(authors) = &meta.authors {
                group.authors = parse_authors(&ListInput::Text(authors.clone()));
            }
        }
        group.year = group.year.or(meta.year);
        fill(&mut group.journal_title, &meta.journal_title);
        fill(&mut group.issue_label, &meta.issue_label);
        fill(&mut group.issue_label, &meta.issue_id);
        fill(&mut group.section, &meta.section);
        fill(&mut group.url, &meta.url);

        if let Some(page) = meta.page {
            acc.pages.insert(page);
        }
        if let Some(pages) = &meta.pages {
            acc.pages.extend(parse_pages(&ListInput::Text(pages.clone())));
        }
        if let Some(range) = meta.page_range.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            if !acc.ranges.iter().any(|r| r == range) {
                acc.ranges.push(range.to_string());
            }
        }
    }

    let mut result: Vec<CitationGroup> = order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .filter_map(|acc| {
            let mut group = acc.group?;
            let pages: Vec<u32> = acc.pages.into_iter().collect();
            group.pages = if !pages.is_empty() {
                Some(collapse_pages(&pages))
            } else if !acc.ranges.is_empty() {
                Some(acc.ranges.join(", "))
            } else {
                None
            };
            group.short_ref = short_ref(&group);
            Some(group)
        })
        .collect();

    result.sort_by(|a, b| {
        b.hits
            .cmp(&a.hits)
            .then_with(|| a.title.as_deref().unwrap_or_default().cmp(b.title.as_deref().unwrap_or_default()))
    });
    result
}

fn fill(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        *slot = value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }
}

/// Short citation text built from the first rule whose fields are all present:
///
/// 1. authors, year, title, pages: `"Doe (2021). Title, pp. 3–4"`
/// 2. authors, title: `"Doe. Title"`
/// 3. authors, issue or pages: `"Doe, Sotsiaaltöö 2021/3"`
/// 4. title, issue or pages: `"Title, pp. 12"`
/// 5. issue or pages alone
pub fn short_ref(group: &CitationGroup) -> Option<String> {
    let authors = (!group.authors.is_empty()).then(|| group.authors.join("; "));
    let title = group.title.as_deref();
    let pages = group.pages.as_deref().map(|p| format!("pp. {}", p));
    let issue = [group.journal_title.as_deref(), group.issue_label.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let issue_or_pages = if issue.is_empty() { pages.clone() } else { Some(issue) };

    match (authors, group.year, title, pages, issue_or_pages) {
        (Some(a), Some(y), Some(t), Some(p), _) => Some(format!("{} ({}). {}, {}", a, y, t, p)),
        (Some(a), _, Some(t), _, _) => Some(format!("{}. {}", a, t)),
        (Some(a), _, None, _, Some(ip)) => Some(format!("{}, {}", a, ip)),
        (None, _, Some(t), _, Some(ip)) => Some(format!("{}, {}", t, ip)),
        (_, _, _, _, ip) => ip,
    }
}
