//! Hashtag extraction from recognized text
//!
//! Social media screenshots and posters often carry `#tags` (or the
//! full-width `＃`). They become tags verbatim, no inference needed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[#＃](\w+)").expect("valid hashtag regex"));

/// Hashtags in first-seen order, without the `#`
///
/// Duplicates are detected case-insensitively; the first spelling wins.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    HASHTAG_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .map(str::to_string)
        .collect()
}
