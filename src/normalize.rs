//! Deterministic text cleanup applied before chunking.
//!
//! 1. `\r\n` and `\r` become `\n`.
//! 2. A hyphen at a line end joins the two lines. The hyphen is dropped
//!    only when the letters on both sides are lowercase (`"sotsiaal-\ntöö"`
//!    becomes `"sotsiaaltöö"`); otherwise it stays (`"COVID-\n19"` becomes
//!    `"COVID-19"`).
//! 3. Every other run of whitespace, line breaks included, becomes one space.
//! 4. Leading and trailing whitespace is dropped.
//!
//! The output contains no line breaks, so normalizing twice is a no-op.

/// Normalize whitespace and repair word-wrap hyphenation.
pub fn normalize_text(input: &str) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");
    let chars: Vec<char> = unified.chars().collect();

    let mut out = String::with_capacity(unified.len());
    let mut last: Option<char> = None;
    let mut pending_space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '-' && !pending_space && last.is_some_and(char::is_alphanumeric) {
            if let Some(resume) = skip_line_break(&chars, i + 1) {
                let before_lower = last.is_some_and(char::is_lowercase);
                let after_lower = chars.get(resume).copied().is_some_and(char::is_lowercase);
                if !(before_lower && after_lower) {
                    out.push('-');
                    last = Some('-');
                }
                i = resume;
                continue;
            }
        }

        if c.is_whitespace() {
            pending_space = last.is_some();
            i += 1;
            continue;
        }

        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
        last = Some(c);
        i += 1;
    }

    out
}

/// If `chars[start..]` is horizontal whitespace, one `\n`, and horizontal
/// whitespace again, return the index just past it.
fn skip_line_break(chars: &[char], start: usize) -> Option<usize> {
    let is_horizontal = |c: char| c.is_whitespace() && c != '\n';

    let mut j = start;
    while j < chars.len() && is_horizontal(chars[j]) {
        j += 1;
    }
    if chars.get(j) != Some(&'\n') {
        return None;
    }
    j += 1;
    while j < chars.len() && is_horizontal(chars[j]) {
        j += 1;
    }
    Some(j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lowercase_hyphenation_is_repaired() {
        assert_eq!(normalize_text("sotsiaal-\ntöö"), "sotsiaaltöö");
    }

    #[test]
    fn test_hyphen_kept_before_digit() {
        assert_eq!(normalize_text("COVID-\n19"), "COVID-19");
    }

    #[test]
    fn test_hyphen_kept_before_uppercase() {
        assert_eq!(normalize_text("Tallinna-\nTartu maantee"), "Tallinna-Tartu maantee");
    }

    #[test]
    fn test_crlf_and_trailing_spaces_in_break() {
        assert_eq!(normalize_text("kogu-  \r\n  kond"), "kogukond");
    }

    #[test]
    fn test_chained_hyphenation() {
        assert_eq!(normalize_text("ab-\ncd-\nef"), "abcdef");
    }

    #[test]
    fn test_dash_after_space_becomes_spaced() {
        assert_eq!(normalize_text("word -\nnext"), "word - next");
    }

    #[test]
    fn test_whitespace_collapse_and_trim() {
        assert_eq!(
            normalize_text("  First line\n\nsecond\t\tline  \r\n"),
            "First line second line"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" \n\t "), "");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(s in "[a-zA-Z0-9õäöü .!?\\-\\r\\n\\t]{0,200}") {
            let once = normalize_text(&s);
            prop_assert_eq!(normalize_text(&once), once.clone());
        }

        #[test]
        fn prop_output_has_no_line_breaks(s in "\\PC{0,120}") {
            let out = normalize_text(&s);
            prop_assert!(!out.contains('\n'));
            prop_assert!(!out.contains('\r'));
            prop_assert_eq!(out.trim(), out.as_str());
        }
    }
}
