//! Article page-range resolution.
//!
//! TOC entries only carry the page an article starts on. Sorted by printed
//! page, each entry runs up to the page before the next entry begins; the
//! last entry stays open unless the caller knows where the issue ends.
//! Adding the print-to-physical offset turns those spans into page numbers
//! of the PDF itself.

use crate::error::{IngestError, Result};
use crate::models::{ArticleRange, TocItem};

/// Resolve printed spans for `entries` and shift them by `offset`.
///
/// `last_end` is the printed last page of the final article, when known.
pub fn resolve_ranges(
    entries: &[TocItem],
    offset: i64,
    last_end: Option<u32>,
) -> Result<Vec<ArticleRange>> {
    let mut sorted: Vec<&TocItem> = entries.iter().collect();
    sorted.sort_by_key(|e| e.page);

    sorted
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let print_end = match sorted.get(i + 1) {
                // Two entries on the same page share it.
                Some(next) => Some(next.page.saturating_sub(1).max(entry.page)),
                None => last_end.map(|end| end.max(entry.page)),
            };
            Ok(ArticleRange {
                item: (*entry).clone(),
                print_end,
                start: shift_page(entry.page, offset)?,
                end: print_end.map(|end| shift_page(end, offset)).transpose()?,
            })
        })
        .collect()
}

/// `page + offset` as a physical page number.
pub fn shift_page(page: u32, offset: i64) -> Result<i64> {
    i64::from(page).checked_add(offset).ok_or_else(|| {
        IngestError::Validation(format!("page {} shifted by {} is out of range", page, offset))
    })
}

/// Printed number of the last page when physical `start..=end` is labelled
/// from `print_start`.
pub fn print_span_end(print_start: u32, start: i64, end: i64) -> Result<u32> {
    u32::try_from(end - start)
        .ok()
        .and_then(|span| print_start.checked_add(span))
        .ok_or_else(|| {
            IngestError::Validation(format!(
                "printed pages from {} cannot cover physical pages {}-{}",
                print_start, start, end
            ))
        })
}

/// The caller's explicit offset beats the inferred one; neither means zero.
pub fn choose_offset(explicit: Option<i64>, inferred: Option<i64>) -> i64 {
    explicit.or(inferred).unwrap_or(0)
}

/// Parse `"a-b"`, `"a–b"`, `"a—b"`, or `"a"` into an inclusive range.
///
/// Reversed bounds are swapped. Zero, negative, or unparseable input is a
/// [`IngestError::Validation`].
pub fn parse_range(input: &str) -> Result<(u32, u32)> {
    let trimmed = input.trim();
    let invalid = || IngestError::Validation(format!("invalid page range: {:?}", input));

    let mut parts = trimmed.splitn(2, ['-', '–', '—']);
    let first = parts.next().ok_or_else(invalid)?;
    let second = parts.next();

    let a = parse_page(first).ok_or_else(invalid)?;
    let b = match second {
        Some(s) => parse_page(s).ok_or_else(invalid)?,
        None => a,
    };

    Ok(if b < a { (b, a) } else { (a, b) })
}

fn parse_page(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|n| *n > 0)
}
