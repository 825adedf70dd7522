//! Tag normalization
//!
//! Backends disagree on language, script and casing for the same concept
//! ("cat", "Cat", "ネコ", "猫"). Normalization folds them onto one canonical
//! token so deduplication and search work across engines.
//!
//! `normalize` is idempotent: canonical tokens are lowercase and map to
//! themselves.

use super::validator::validate_tag;
use crate::types::ExtractedResult;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Synonym → canonical token (keys lowercase)
static SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(build_synonyms);

fn build_synonyms() -> HashMap<&'static str, &'static str> {
    let groups: &[(&str, &[&str])] = &[
        ("猫", &["cat", "cats", "kitten", "ネコ", "ねこ", "キャット"]),
        ("犬", &["dog", "dogs", "puppy", "イヌ", "いぬ", "ドッグ"]),
        ("鳥", &["bird", "birds", "トリ", "とり"]),
        ("花", &["flower", "flowers", "はな", "ハナ"]),
        ("桜", &["cherry blossom", "cherry blossoms", "sakura", "さくら", "サクラ"]),
        ("海", &["sea", "ocean", "うみ"]),
        ("山", &["mountain", "mountains", "やま"]),
        ("空", &["sky", "そら"]),
        ("雪", &["snow", "ゆき"]),
        ("夕焼け", &["sunset", "夕日", "夕暮れ", "ゆうやけ"]),
        ("夜景", &["night view", "nightscape", "city lights"]),
        ("花火", &["fireworks", "はなび", "ハナビ"]),
        ("人物", &["person", "people", "human", "portrait"]),
        ("建物", &["building", "buildings", "ビル"]),
        ("車", &["car", "cars", "くるま", "クルマ"]),
        ("電車", &["train", "でんしゃ"]),
        ("食べ物", &["food", "たべもの", "料理"]),
        ("ラーメン", &["ramen", "らーめん"]),
        ("寿司", &["sushi", "すし", "スシ"]),
        ("メニュー", &["menu", "めにゅー"]),
        ("レシート", &["receipt", "れしーと"]),
        ("看板", &["sign", "signboard", "billboard", "かんばん"]),
        ("ポスター", &["poster", "ぽすたー"]),
    ];

    let mut map = HashMap::new();
    for (canonical, synonyms) in groups {
        for synonym in *synonyms {
            map.insert(*synonym, *canonical);
        }
    }
    map
}

/// Canonical form of a tag: trimmed, whitespace collapsed, synonyms folded,
/// lowercased
pub fn normalize(tag: &str) -> String {
    let collapsed = tag.split_whitespace().collect::<Vec<_>>().join(" ");
    let lowered = collapsed.to_lowercase();

    match SYNONYMS.get(lowered.as_str()) {
        Some(canonical) => canonical.to_lowercase(),
        None => lowered,
    }
}

/// Normalize, validate and deduplicate tags, keeping first-seen order
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| normalize(tag.as_ref()))
        .filter(|tag| validate_tag(tag))
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Apply [`normalize_tags`] to a backend result
pub fn normalize_result(result: ExtractedResult) -> ExtractedResult {
    let tags = normalize_tags(result.tags());
    result.with_tags(tags)
}
