//! Free-form model output → [`ExtractedResult`]
//!
//! Models are asked for JSON but small ones wrap it in Markdown fences, add
//! chatter around it, or ignore the format entirely. Parsing is lenient:
//! structured JSON first, then a plain-text fallback.

use crate::types::ExtractedResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Known taxonomy categories, flattened in this order
const TAG_CATEGORIES: [&str; 4] = ["objects", "scene", "attributes", "mood"];

/// Fixed confidence for tags recovered without valid JSON
pub const PLAIN_TEXT_CONFIDENCE: f32 = 0.3;

/// Bullet and comma tokens at or above this length are prose, not tags
const MAX_FALLBACK_TAG_CHARS: usize = 30;

static TAGS_ARRAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)"tags"\s*:\s*\[([^\]]+)\]"#).expect("valid tags array regex")
});

/// Parse a model answer, falling back to plain-text heuristics
pub fn parse_model_response(response: &str) -> ExtractedResult {
    match parse_json_response(response) {
        Some(result) if result.has_valid_data() => result,
        _ => {
            debug!("JSON parse produced no data, using plain-text fallback");
            parse_plain_text(response)
        }
    }
}

/// Structured parse: fences stripped, outermost `{...}` parsed as an object
///
/// Returns `None` when no JSON object could be parsed.
pub fn parse_json_response(response: &str) -> Option<ExtractedResult> {
    let unfenced = strip_code_fences(response);
    let candidate = outermost_object(unfenced).unwrap_or(unfenced).trim();

    let json: Map<String, Value> = match serde_json::from_str(candidate) {
        Ok(json) => json,
        Err(e) => {
            let preview: String = candidate.chars().take(200).collect();
            debug!(error = %e, preview = %preview, "Model response is not a JSON object");
            return None;
        }
    };

    let description = json
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let tags = match json.get("tags") {
        Some(Value::Object(categories)) => categorized_tags(categories),
        Some(Value::Array(items)) => string_items(items),
        _ => Vec::new(),
    };

    Some(ExtractedResult::new(tags, description))
}

/// Heuristic parse for answers that are not JSON
///
/// Tries, in order: a `"tags": [...]` array literal, bullet lines, then
/// comma-separated tokens.
pub fn parse_plain_text(text: &str) -> ExtractedResult {
    let mut tags = tags_array_literal(text);

    if tags.is_empty() {
        tags = bullet_lines(text);
    }

    if tags.is_empty() {
        tags = text
            .split(',')
            .map(str::trim)
            .filter(|t| is_short_token(t))
            .map(str::to_string)
            .collect();
    }

    let result = ExtractedResult::new(tags, None);
    if result.has_valid_data() {
        result.with_confidence(PLAIN_TEXT_CONFIDENCE)
    } else {
        result
    }
}

/// Remove a ```json or bare ``` fence pair, keeping the fenced body
fn strip_code_fences(response: &str) -> &str {
    for opener in ["```json", "```"] {
        if let Some(start) = response.find(opener) {
            let body_start = start + opener.len();
            if let Some(len) = response[body_start..].find("```") {
                return &response[body_start..body_start + len];
            }
        }
    }
    response
}

/// Substring from the first `{` to the last `}`
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn categorized_tags(categories: &Map<String, Value>) -> Vec<String> {
    let mut tags: Vec<String> = TAG_CATEGORIES
        .iter()
        .filter_map(|category| categories.get(*category))
        .filter_map(Value::as_array)
        .flat_map(|items| string_items(items))
        .collect();

    // Model invented its own categories: take everything
    if tags.is_empty() {
        tags = categories
            .values()
            .filter_map(Value::as_array)
            .flat_map(|items| string_items(items))
            .collect();
    }

    tags
}

fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn tags_array_literal(text: &str) -> Vec<String> {
    TAGS_ARRAY_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|inner| {
            inner
                .as_str()
                .split(',')
                .map(|t| t.trim().trim_matches('"').trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn bullet_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix('-')
                .or_else(|| line.strip_prefix('*'))
                .or_else(|| line.strip_prefix('•'))
        })
        .map(str::trim)
        .filter(|t| is_short_token(t))
        .map(str::to_string)
        .collect()
}

fn is_short_token(token: &str) -> bool {
    !token.is_empty() && token.chars().count() < MAX_FALLBACK_TAG_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorized_json_in_code_fence() {
        let response = r#"Here you go:
```json
{"analysis": "a cat", "tags": {"mood": ["穏やか"], "objects": ["猫", "窓"], "scene": ["室内"]}, "description": "窓辺の猫"}
```"#;
        let result = parse_model_response(response);
        assert_eq!(result.tags(), &["猫", "窓", "室内", "穏やか"]);
        assert_eq!(result.description(), Some("窓辺の猫"));
        assert!((result.confidence() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_flat_tags_with_surrounding_chatter() {
        let response = r#"Sure! {"tags": ["ramen", "shop"], "description": ""} Hope this helps."#;
        let result = parse_model_response(response);
        assert_eq!(result.tags(), &["ramen", "shop"]);
        assert_eq!(result.description(), None);
    }

    #[test]
    fn test_unknown_categories_are_concatenated() {
        let response = r#"{"tags": {"animals": ["dog"], "colors": ["brown"]}}"#;
        let result = parse_json_response(response).unwrap();
        // map values in key order
        assert_eq!(result.tags(), &["dog", "brown"]);
    }

    #[test]
    fn test_bare_fence() {
        let response = "```\n{\"tags\": [\"sea\"]}\n```";
        assert_eq!(parse_model_response(response).tags(), &["sea"]);
    }

    #[test]
    fn test_plain_text_tags_literal() {
        let response = r#"I think "tags": ["beach", "sunset"] would fit"#;
        let result = parse_model_response(response);
        assert_eq!(result.tags(), &["beach", "sunset"]);
        assert_eq!(result.confidence(), PLAIN_TEXT_CONFIDENCE);
    }

    #[test]
    fn test_plain_text_bullets() {
        let response = "Tags:\n- 猫\n* 窓辺\n• this bullet is far too long to be a reasonable tag at all\n";
        let result = parse_model_response(response);
        assert_eq!(result.tags(), &["猫", "窓辺"]);
        assert_eq!(result.description(), None);
    }

    #[test]
    fn test_plain_text_commas() {
        let result = parse_model_response("mountain, lake , , forest");
        assert_eq!(result.tags(), &["mountain", "lake", "forest"]);
    }

    #[test]
    fn test_nothing_recoverable() {
        let result = parse_model_response("   ");
        assert!(!result.has_valid_data());
        assert_eq!(result.confidence(), 0.0);
    }
}
