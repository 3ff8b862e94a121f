//! Magazine table-of-contents detection, parsing, and page-offset inference.
//!
//! # Detection
//!
//! Each physical page is classified on its own. A page is a TOC candidate
//! when it contains a contents keyword in one of the supported languages,
//! or when at least `min_entry_lines` of its lines look like
//! `"Title ........ 12"` or `"Title — Author 12"`: a label joined to its
//! trailing page number by a dotted leader, or split by a dash. Lines that
//! merely end in a number (bibliography years, prose) do not count.
//!
//! Lines of a page already classified as TOC are parsed more loosely: any
//! label followed by a trailing page number is an entry.
//!
//! Many issues print an unlabeled TOC on the inside cover, so when no page
//! qualifies the first `fallback_pages` pages with at least
//! `fallback_min_chars` characters of text are used instead.
//!
//! # Parsing
//!
//! The trailing integer of an entry line is the printed page. If the label
//! splits on its last dash-like separator into a title and a short
//! alphabetic tail (six words or fewer), the tail is read as the author
//! list. Dotted leaders and stray punctuation are stripped from titles, and
//! entries are deduplicated on `(lowercased title, page)`.
//!
//! # Offset inference
//!
//! Print numbering and physical page order diverge by a constant when front
//! matter is unnumbered. For each entry, in TOC order, the first few title
//! words are searched for (case-insensitively) in the physical pages; the
//! first hit gives `offset = physical_page - printed_page`. The first match
//! wins; there is no vote across entries.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::TocConfig;
use crate::models::{PageText, TocItem};
use crate::normalize::normalize_text;

static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(sisukord|table of contents|contents|содержание|оглавление|inhaltsverzeichnis|inhalt|sisällysluettelo|sisällys)\b",
    )
    .expect("valid contents keyword regex")
});

static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<label>.+?)[\s.·…_]+(?P<page>\d{1,4})$")
        .expect("valid entry regex")
});

static LEADER_PAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(?:\s*[.·_]){2,}|\s*…+)\s*\d{1,4}$").expect("valid leader page regex")
});

static LEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\s*[.·…_]){2,}\s*").expect("valid leader regex")
});

/// Maximum words in a trailing segment still read as an author list.
const MAX_AUTHOR_WORDS: usize = 6;

/// Shortest search phrase (in characters) worth matching against pages.
const MIN_PHRASE_CHARS: usize = 4;

/// Result of running the detector over an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TocReport {
    /// Physical page numbers treated as TOC.
    pub toc_pages: Vec<u32>,
    pub items: Vec<TocItem>,
    pub inferred_offset: Option<i64>,
}

/// True when the text mentions a table-of-contents keyword.
pub fn has_contents_keyword(text: &str) -> bool {
    KEYWORD_RE.is_match(text)
}

/// Number of lines shaped like `"label ... 12"` or `"title — author 12"`.
pub fn count_entry_lines(text: &str) -> usize {
    text.lines().filter(|line| is_entry_line(line)).count()
}

fn is_entry_line(line: &str) -> bool {
    let line = line.trim();
    match split_entry_line(line) {
        Some((label, _)) => LEADER_PAGE_RE.is_match(line) || last_separator(label).is_some(),
        None => false,
    }
}

/// Classify a single page.
pub fn is_toc_page(text: &str, min_entry_lines: usize) -> bool {
    has_contents_keyword(text) || count_entry_lines(text) >= min_entry_lines
}

/// Indices (into `pages`) of the pages treated as TOC.
pub fn find_toc_pages(pages: &[PageText], config: &TocConfig) -> Vec<usize> {
    let matched: Vec<usize> = pages
        .iter()
        .enumerate()
        .filter(|(_, p)| is_toc_page(&p.text, config.min_entry_lines))
        .map(|(i, _)| i)
        .collect();
    if !matched.is_empty() {
        return matched;
    }

    let fallback: Vec<usize> = pages
        .iter()
        .enumerate()
        .take(config.fallback_pages)
        .filter(|(_, p)| p.text.trim().chars().count() >= config.fallback_min_chars)
        .map(|(i, _)| i)
        .collect();
    if !fallback.is_empty() {
        tracing::debug!(pages = ?fallback, "no TOC page found; using dense leading pages");
    }
    fallback
}

/// Split a line into `(label, printed page)` when it looks like a TOC entry.
fn split_entry_line(line: &str) -> Option<(&str, u32)> {
    let caps = ENTRY_RE.captures(line.trim())?;
    let label = caps.name("label")?.as_str();
    let page: u32 = caps.name("page")?.as_str().parse().ok()?;
    if page == 0 || !label.chars().any(char::is_alphabetic) {
        return None;
    }
    Some((label, page))
}

/// Parse one TOC line.
pub fn parse_toc_line(line: &str) -> Option<TocItem> {
    let (label, page) = split_entry_line(line)?;
    let (title_part, authors) = split_authors(label);
    let title = clean_title(title_part);
    if !title.chars().any(char::is_alphabetic) {
        return None;
    }
    Some(TocItem {
        title,
        authors,
        page,
    })
}

/// Parse entries from the given TOC page texts, deduplicated and capped.
pub fn parse_toc<'a>(texts: impl IntoIterator<Item = &'a str>, max_items: usize) -> Vec<TocItem> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    let mut items = Vec::new();

    for text in texts {
        for line in text.lines() {
            if items.len() >= max_items {
                return items;
            }
            let Some(item) = parse_toc_line(line) else {
                continue;
            };
            if seen.insert((item.title.to_lowercase(), item.page)) {
                items.push(item);
            }
        }
    }
    items
}

/// Byte offset and length of the last dash-like separator in `label`.
///
/// En and em dashes always count; a hyphen counts only with whitespace on
/// both sides, so compounds such as `"COVID-19"` are never split.
fn last_separator(label: &str) -> Option<(usize, usize)> {
    let chars: Vec<(usize, char)> = label.char_indices().collect();
    chars.iter().enumerate().rev().find_map(|(i, &(pos, c))| {
        let spaced = i > 0
            && chars[i - 1].1.is_whitespace()
            && chars.get(i + 1).is_some_and(|(_, n)| n.is_whitespace());
        match c {
            '—' | '–' => Some((pos, c.len_utf8())),
            '-' if spaced => Some((pos, 1)),
            _ => None,
        }
    })
}

fn split_authors(label: &str) -> (&str, Vec<String>) {
    let Some((pos, len)) = last_separator(label) else {
        return (label, Vec::new());
    };
    let head = &label[..pos];
    let tail = clean_title(&label[pos + len..]);

    if tail.is_empty() {
        return (head, Vec::new());
    }
    let words = tail
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphabetic))
        .count();
    if words > MAX_AUTHOR_WORDS || !tail.chars().any(char::is_alphabetic) || head.trim().is_empty() {
        return (label, Vec::new());
    }

    let authors = tail
        .split([',', ';', '/'])
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    (head, authors)
}

fn clean_title(raw: &str) -> String {
    let without_leaders = LEADER_RE.replace_all(raw, " ");
    let collapsed = without_leaders.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | '·' | '…' | '_' | '-' | '–' | '—' | ':' | ';' | ',' | '|')
        })
        .to_string()
}

/// Lowercased search phrase built from the first `words` words of a title.
pub fn search_phrase(title: &str, words: usize) -> Option<String> {
    let phrase = title
        .split_whitespace()
        .take(words)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    (phrase.chars().count() >= MIN_PHRASE_CHARS).then_some(phrase)
}

/// Infer `physical - printed` from the first entry whose title shows up on a page.
///
/// Pages whose index is in `excluded` (the TOC itself) are not searched.
pub fn infer_offset(
    entries: &[TocItem],
    pages: &[PageText],
    excluded: &[usize],
    phrase_words: usize,
) -> Option<i64> {
    let haystacks: Vec<(i64, String)> = pages
        .iter()
        .enumerate()
        .filter(|(i, _)| !excluded.contains(i))
        .map(|(i, p)| {
            let physical = p.page.map_or(i as i64 + 1, i64::from);
            (physical, normalize_text(&p.text).to_lowercase())
        })
        .collect();

    entries.iter().find_map(|entry| {
        let phrase = search_phrase(&normalize_text(&entry.title), phrase_words)?;
        let (physical, _) = haystacks.iter().find(|(_, text)| text.contains(&phrase))?;
        Some(physical - i64::from(entry.page))
    })
}

/// Detect, parse, and infer the offset for an issue in one pass.
pub fn analyze_issue(pages: &[PageText], config: &TocConfig) -> TocReport {
    let toc_indices = find_toc_pages(pages, config);
    let items = parse_toc(
        toc_indices.iter().map(|&i| pages[i].text.as_str()),
        config.max_items,
    );
    let inferred_offset = infer_offset(&items, pages, &toc_indices, config.phrase_words);

    let toc_pages = toc_indices
        .iter()
        .map(|&i| pages[i].page.unwrap_or(i as u32 + 1))
        .collect();

    tracing::info!(
        toc_pages = ?toc_pages,
        items = items.len(),
        offset = ?inferred_offset,
        "TOC analysis finished"
    );

    TocReport {
        toc_pages,
        items,
        inferred_offset,
    }
}
