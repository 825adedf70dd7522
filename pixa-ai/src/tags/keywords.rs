//! Rule-based keyword extraction from recognized text
//!
//! A cheap noun picker that needs no model. Text is split into runs of one
//! script; each run is classified noun-like or not:
//! - Latin words: kept unless a stop word, too short, or shaped like a verb
//!   or adverb (`-ing`, `-ed`, `-ly`)
//! - Kanji and katakana runs: nouns
//! - Hiragana runs: particles and inflections, dropped

use std::collections::HashSet;

/// Keywords returned at most
pub const MAX_KEYWORDS: usize = 5;

const MIN_LATIN_CHARS: usize = 3;
const MIN_CJK_CHARS: usize = 2;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old",
    "see", "two", "way", "who", "its", "did", "let", "put", "say", "she", "too", "use", "with",
    "this", "that", "from", "have", "they", "will", "your", "what", "when", "here", "there",
    "been", "were", "more", "some", "than", "then", "them", "these", "those", "into", "only",
    "also", "very", "just", "about", "would", "could", "should", "their", "which", "other",
    "www", "com", "http", "https",
];

/// Suffixes that mark verbs or adverbs (applied to words longer than 4 chars)
const NON_NOUN_SUFFIXES: &[&str] = &["ing", "ed", "ly"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Kanji,
    Katakana,
    Hiragana,
    Other,
}

fn script_of(c: char) -> Script {
    match c {
        'a'..='z' | 'A'..='Z' => Script::Latin,
        '\u{00C0}'..='\u{024F}' if c.is_alphabetic() => Script::Latin,
        '\u{3040}'..='\u{309F}' => Script::Hiragana,
        // Katakana, prolonged sound mark, half-width katakana
        '\u{30A0}'..='\u{30FF}' | '\u{FF66}'..='\u{FF9F}' => Script::Katakana,
        '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '々' => Script::Kanji,
        _ => Script::Other,
    }
}

/// Split text into maximal single-script runs
fn script_runs(text: &str) -> Vec<(Script, String)> {
    let mut runs: Vec<(Script, String)> = Vec::new();
    for c in text.chars() {
        let script = script_of(c);
        match runs.last_mut() {
            Some((last, run)) if *last == script && script != Script::Other => run.push(c),
            _ => runs.push((script, c.to_string())),
        }
    }
    runs
}

fn is_noun_like(script: Script, run: &str) -> bool {
    let length = run.chars().count();
    match script {
        Script::Kanji | Script::Katakana => length >= MIN_CJK_CHARS,
        Script::Latin => {
            let lowered = run.to_lowercase();
            length >= MIN_LATIN_CHARS
                && !STOP_WORDS.contains(&lowered.as_str())
                && !(length > 4
                    && NON_NOUN_SUFFIXES
                        .iter()
                        .any(|suffix| lowered.ends_with(suffix)))
        }
        Script::Hiragana | Script::Other => false,
    }
}

/// Up to [`MAX_KEYWORDS`] noun-like keywords in first-seen order
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    script_runs(text)
        .into_iter()
        .filter(|(script, run)| is_noun_like(*script, run))
        .map(|(_, run)| run)
        .filter(|run| seen.insert(run.to_lowercase()))
        .take(MAX_KEYWORDS)
        .collect()
}
