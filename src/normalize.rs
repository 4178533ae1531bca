//! Title and link normalization for deduplication.
//!
//! Listing pages show the same song under slightly different titles
//! ("Wonderwall (ver 2)", "Wonderwall (Acoustic)"), and the same chart can be
//! linked with or without a fragment. These helpers produce the keys used to
//! collapse such duplicates.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Trailing parenthetical qualifier: "(ver 2)", "(Acoustic)", "(Oasis cover)"
pub static PARENTHETICAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[\(\[][^\(\)\[\]]*[\)\]]\s*$").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// TEXT FOLDING
// ============================================================================

pub fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' |
             '\u{1DC0}'..='\u{1DFF}' | '\u{20D0}'..='\u{20FF}' |
             '\u{FE20}'..='\u{FE2F}')
}

/// Strip diacritics, transliterate to ASCII, lowercase.
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Curly quotes and backticks to plain apostrophes/quotes.
pub fn normalize_punctuation(s: &str) -> String {
    s.replace(['\u{2018}', '\u{2019}', '\u{00B4}', '`'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
}

// ============================================================================
// TITLES
// ============================================================================

/// Title with every trailing parenthetical qualifier removed, whitespace
/// collapsed. Case and accents are preserved.
pub fn strip_qualifiers(title: &str) -> String {
    let mut result = title.trim().to_string();
    loop {
        let stripped = PARENTHETICAL_SUFFIX.replace(&result, "").to_string();
        // Keep the original when the whole title is a parenthetical
        if stripped == result || stripped.trim().is_empty() {
            break;
        }
        result = stripped;
    }
    MULTI_SPACE.replace_all(result.trim(), " ").to_string()
}

/// Deduplication key for a song title within one category.
pub fn normalize_title(title: &str) -> String {
    let stripped = strip_qualifiers(&normalize_punctuation(title));
    fold_to_ascii(&stripped)
}

// ============================================================================
// LINKS
// ============================================================================

/// Trimmed link without its `#fragment`; `None` for blank input.
pub fn canonical_link(link: &str) -> Option<String> {
    let link = link.trim();
    let link = link.split_once('#').map_or(link, |(before, _)| before);
    (!link.is_empty()).then(|| link.to_string())
}

/// Resolve a possibly relative `href` against the page it was found on.
pub fn resolve_link(base: &str, href: &str) -> Option<String> {
    let href = canonical_link(href)?;
    if href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    let resolved = match Url::parse(&href) {
        Ok(url) => url,
        Err(_) => Url::parse(base).ok()?.join(&href).ok()?,
    };
    canonical_link(resolved.as_str())
}

// ============================================================================
// TESTS
// ============================================================================
