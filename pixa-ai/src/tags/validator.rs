//! Tag validation
//!
//! Rejects tags no one would search for: fragments, overlong phrases,
//! pure numbers or symbols, and placeholder words models emit when they have
//! nothing to say.

const MIN_TAG_CHARS: usize = 2;
const MAX_TAG_CHARS: usize = 20;

/// Placeholder tags, compared case-insensitively
const TAG_DENYLIST: &[&str] = &[
    // Placeholders
    "unknown", "tag", "tag1", "tag2", "tag3", "other", "none", "n/a", "null", "misc",
    // Generic image terms
    "photo", "image", "picture",
    // Japanese equivalents
    "不明", "その他", "なし", "写真", "画像", "タグ",
];

/// Whether a tag is worth keeping
pub fn validate_tag(tag: &str) -> bool {
    let tag = tag.trim();

    let length = tag.chars().count();
    let single_ideograph = length == 1 && tag.chars().all(is_ideograph);
    if !single_ideograph && !(MIN_TAG_CHARS..=MAX_TAG_CHARS).contains(&length) {
        return false;
    }

    // Needs at least one letter or ideograph
    if !tag.chars().any(char::is_alphabetic) {
        return false;
    }

    let lowered = tag.to_lowercase();
    !TAG_DENYLIST.iter().any(|denied| *denied == lowered)
}

/// A lone kanji is a complete word (猫, 海, 空)
fn is_ideograph(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}
