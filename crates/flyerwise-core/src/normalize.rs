//! Canonicalization of query and catalog text before similarity scoring.
//!
//! Flyer text arrives from OCR/AI extraction with inconsistent casing,
//! accents, stray control characters and punctuation. Both sides of every
//! comparison go through [`normalize_text`] so that `"Crème  Fraîche 30%"`
//! and `"creme fraiche 30 %"` compare equal token-for-token.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalizes free text into the canonical form used for matching.
///
/// - Unicode compatibility decomposition (NFKD), then combining marks dropped
/// - lowercased
/// - control characters and punctuation become spaces, except a `.`/`,`
///   sitting between two digits (decimal separators)
/// - `%` is kept as a token of its own
/// - whitespace runs collapsed, result trimmed
#[must_use]
pub fn normalize_text(input: &str) -> String {
    let chars: Vec<char> = input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();

    let mut out = String::with_capacity(chars.len());
    let mut pending_space = false;

    for (idx, &c) in chars.iter().enumerate() {
        if c == '%' {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push('%');
            pending_space = true;
            continue;
        }

        let keep = if c.is_alphanumeric() {
            true
        } else if c == '.' || c == ',' {
            let prev_digit = idx > 0 && chars[idx - 1].is_ascii_digit();
            let next_digit = chars.get(idx + 1).is_some_and(char::is_ascii_digit);
            prev_digit && next_digit
        } else {
            false
        };

        if keep {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }

    out
}

/// Splits normalized text into its tokens.
#[must_use]
pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}
