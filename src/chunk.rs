//! Sentence-aware sliding-window chunker.
//!
//! Splits normalized document text into fragments of at most
//! `chunk_size` characters. Consecutive windows start `chunk_size - overlap`
//! characters apart (at least one), and each window that does not reach the
//! end of the text is shortened to the last sentence terminator in its
//! second half, so sentences are rarely severed.
//!
//! # Algorithm
//!
//! 1. Normalize the text (see [`crate::normalize`]).
//! 2. If it is no longer than `single_chunk_threshold`, emit it whole.
//! 3. Otherwise slide the window: `end = start + chunk_size`; look for the
//!    last `". "`, `"! "`, `"? "` or paragraph break past the window's
//!    midpoint and cut after it.
//! 4. The next window starts at `min(start + step, cut)`, so no character is
//!    skipped even when the cut pulled the window short.
//! 5. Each fragment is normalized again; empty fragments are dropped.
//!
//! Paginated content is chunked page by page so that fragments never span
//! a page boundary, unless the whole document fits in a single chunk.
//!
//! # Example
//!
//! ```rust
//! use folio_harness::chunk::{chunk_text, ChunkParams};
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", &ChunkParams::default());
//! assert_eq!(chunks, vec!["Hello world. Second paragraph.".to_string()]);
//! ```

use std::ops::Range;

use crate::config::ChunkingConfig;
use crate::models::{ExtractedContent, PageText};
use crate::normalize::normalize_text;

/// Chunking parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub overlap: usize,
    /// Texts up to this many characters are emitted as one chunk.
    pub single_chunk_threshold: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 200,
            single_chunk_threshold: 1500,
        }
    }
}

impl From<&ChunkingConfig> for ChunkParams {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
            single_chunk_threshold: config.single_chunk_threshold,
        }
    }
}

impl ChunkParams {
    /// Distance between consecutive window starts; never zero.
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

/// A cleaned fragment of document text, tagged with its page when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub page: Option<u32>,
    pub text: String,
}

/// Compute the character windows the chunker cuts `chars` into.
///
/// The windows are ordered, start at 0, end at `chars.len()`, and each one
/// starts no later than the previous one ends.
pub fn chunk_windows(chars: &[char], params: &ChunkParams) -> Vec<Range<usize>> {
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let size = params.chunk_size.max(1);
    if len <= params.single_chunk_threshold || len <= size {
        return vec![0..len];
    }

    let step = params.step();
    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(len);
        if end >= len {
            windows.push(start..len);
            break;
        }

        let cut = sentence_cut(&chars[start..end]).map_or(end, |offset| start + offset);
        windows.push(start..cut);

        // cut > start always holds, so this advances by at least one.
        start = (start + step).min(cut);
    }

    windows
}

/// Offset just past the last sentence terminator in the window's second half.
///
/// Windows hold normalized text, where paragraph breaks have already become
/// single spaces, so only `.`, `!` and `?` followed by a space end a sentence.
fn sentence_cut(window: &[char]) -> Option<usize> {
    let mid = window.len() / 2;
    if window.len() < 2 {
        return None;
    }

    (mid..window.len() - 1).rev().find_map(|i| {
        (matches!(window[i], '.' | '!' | '?') && window[i + 1] == ' ').then_some(i + 1)
    })
}

/// Normalize `text` and split it into chunk texts.
pub fn chunk_text(text: &str, params: &ChunkParams) -> Vec<String> {
    let normalized = normalize_text(text);
    chunk_normalized(&normalized, params)
}

fn chunk_normalized(normalized: &str, params: &ChunkParams) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    chunk_windows(&chars, params)
        .into_iter()
        .map(|range| normalize_text(&chars[range].iter().collect::<String>()))
        .filter(|fragment| !fragment.is_empty())
        .collect()
}

/// Chunk paginated text, keeping every fragment within a single page.
///
/// When the whole document fits under the single-chunk threshold it is
/// emitted as one fragment tagged with the first page that has text.
pub fn chunk_pages(pages: &[PageText], params: &ChunkParams) -> Vec<Fragment> {
    let normalized: Vec<(Option<u32>, String)> = pages
        .iter()
        .map(|p| (p.page, normalize_text(&p.text)))
        .collect();

    let joined = normalized
        .iter()
        .map(|(_, text)| text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.chars().count() <= params.single_chunk_threshold {
        if joined.is_empty() {
            return Vec::new();
        }
        let page = normalized
            .iter()
            .find(|(_, text)| !text.is_empty())
            .and_then(|(page, _)| *page);
        return vec![Fragment { page, text: joined }];
    }

    let mut fragments = Vec::new();
    for (page, text) in &normalized {
        for piece in chunk_normalized(text, params) {
            fragments.push(Fragment {
                page: *page,
                text: piece,
            });
        }
    }
    fragments
}

/// Chunk either kind of extracted content.
pub fn chunk_content(content: &ExtractedContent, params: &ChunkParams) -> Vec<Fragment> {
    match content {
        ExtractedContent::PlainText(text) => chunk_text(text, params)
            .into_iter()
            .map(|text| Fragment { page: None, text })
            .collect(),
        ExtractedContent::PagedText(pages) => chunk_pages(pages, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(chunk_size: usize, overlap: usize, threshold: usize) -> ChunkParams {
        ChunkParams {
            chunk_size,
            overlap,
            single_chunk_threshold: threshold,
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", &ChunkParams::default());
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", &ChunkParams::default()).is_empty());
        assert!(chunk_text(" \n\n ", &ChunkParams::default()).is_empty());
    }

    #[test]
    fn test_threshold_bypass_ignores_chunk_size() {
        let text = "word ".repeat(100);
        let chunks = chunk_text(&text, &params(50, 10, 1000));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_cut_snaps_to_sentence_end() {
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta iota kappa lambda mu.";
        let chunks = chunk_text(text, &params(40, 0, 0));
        assert_eq!(chunks[0], "Alpha beta gamma delta.");
        assert!(chunks[1].starts_with("Epsilon"));
        assert!(chunks.last().is_some_and(|c| c.ends_with("mu.")));
    }

    #[test]
    fn test_terminator_before_midpoint_is_ignored() {
        let text = format!("Hi. {}", "x".repeat(80));
        let chars: Vec<char> = text.chars().collect();
        let windows = chunk_windows(&chars, &params(40, 0, 0));
        assert_eq!(windows[0], 0..40);
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let text = "abcdefghij".repeat(10);
        let chars: Vec<char> = text.chars().collect();
        let windows = chunk_windows(&chars, &params(30, 10, 0));
        assert_eq!(windows, vec![0..30, 20..50, 40..70, 60..90, 80..100]);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_still_terminates() {
        let text = "a".repeat(100);
        let chars: Vec<char> = text.chars().collect();
        for overlap in [10, 50, usize::MAX] {
            let windows = chunk_windows(&chars, &params(10, overlap, 0));
            assert_eq!(windows.len(), 91);
            assert_eq!(windows.last(), Some(&(90..100)));
        }
    }

    #[test]
    fn test_sentence_cut_only_on_terminators() {
        let chars: Vec<char> = "the first sentence here. end".chars().collect();
        assert_eq!(sentence_cut(&chars), Some(24));
        let unbroken: Vec<char> = "no terminator in this window at all".chars().collect();
        assert_eq!(sentence_cut(&unbroken), None);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Sotsiaaltöö õiguslik raamistik. ".repeat(20);
        let chunks = chunk_text(&text, &params(100, 20, 0));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
    }

    #[test]
    fn test_paged_below_threshold_single_chunk_first_page() {
        let pages = vec![PageText::new(1, "Hello world."), PageText::new(2, "Second page.")];
        let fragments = chunk_pages(&pages, &ChunkParams::default());
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].page, Some(1));
        assert_eq!(fragments[0].text, "Hello world. Second page.");
    }

    #[test]
    fn test_paged_single_chunk_skips_blank_leading_pages() {
        let pages = vec![PageText::new(1, "  "), PageText::new(2, "Only text here.")];
        let fragments = chunk_pages(&pages, &ChunkParams::default());
        assert_eq!(fragments[0].page, Some(2));
    }

    #[test]
    fn test_paged_chunks_never_span_pages() {
        let pages = vec![
            PageText::new(3, "First page sentence. ".repeat(10)),
            PageText::new(4, "Second page sentence. ".repeat(10)),
        ];
        let fragments = chunk_pages(&pages, &params(80, 10, 100));
        assert!(fragments.len() > 2);
        for f in &fragments {
            match f.page {
                Some(3) => assert!(!f.text.contains("Second")),
                Some(4) => assert!(!f.text.contains("First")),
                other => panic!("unexpected page {:?}", other),
            }
        }
    }

    #[test]
    fn test_paged_all_blank_yields_nothing() {
        let pages = vec![PageText::new(1, ""), PageText::new(2, "\n")];
        assert!(chunk_pages(&pages, &ChunkParams::default()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_windows_cover_every_char(
            text in "[a-z .!?]{1,400}",
            size in 1usize..60,
            overlap in 0usize..80,
        ) {
            let chars: Vec<char> = text.chars().collect();
            let windows = chunk_windows(&chars, &params(size, overlap, 0));
            prop_assert_eq!(windows[0].start, 0);
            prop_assert_eq!(windows.last().map(|w| w.end), Some(chars.len()));
            for pair in windows.windows(2) {
                prop_assert!(pair[1].start <= pair[0].end);
                prop_assert!(pair[1].start > pair[0].start);
            }
            prop_assert!(windows.len() <= chars.len());
        }
    }
}
