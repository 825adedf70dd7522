//! Prompt templates shared by every backend
//!
//! All engines receive the same schema and output constraints so their
//! answers go through one parser: a category taxonomy for tags
//! (objects / scene / attributes / mood), an observe-then-tag instruction and
//! worked examples of the expected JSON.

/// System prompt for engines with a system role
pub const SYSTEM_PROMPT: &str = r#"You are a photo analysis expert who produces structured tags and a short description for a photograph.

Rules:
1. Tag only what is actually present. No guessing or free association.
2. Write tags and the description in Japanese.
3. Use 0 to 3 tags per category and 3 to 7 tags in total.
4. Merge tags with the same meaning into one (for example "猫" and "ネコ").
5. Do not use vague tags such as "写真" or "画像". Be specific.
6. Output valid JSON only. No other text.

Tag categories:
- objects: concrete subjects (people, animals, food, vehicles, buildings)
- scene: kind of place (restaurant, park, office, beach, mountain trail)
- attributes: colors, states, features (red, snowy, handwritten, neon)
- mood: atmosphere (lively, quiet, retro, modern)

Output format:
{"analysis": "what you observed", "tags": {"objects": [...], "scene": [...], "attributes": [...], "mood": [...]}, "description": "one or two sentences"}"#;

/// Image prompt for vision-capable engines
pub const IMAGE_PROMPT: &str = r#"Analyze this photo and produce structured tags and a description.

Steps:
1. Look carefully at what the photo shows and write it in "analysis".
2. From that observation, produce tags per category (only things that are visible).
3. Write a one or two sentence description.

Categories:
- objects: concrete subjects (people, animals, food, buildings)
- scene: place or scene (restaurant, park, street)
- attributes: colors, states, features (red, handwritten, neon)
- mood: atmosphere (lively, quiet, retro)

Example:
{"analysis": "A tabby cat curled up on a sunny windowsill", "tags": {"objects": ["猫"], "scene": ["窓辺"], "attributes": ["日差し"], "mood": ["穏やか"]}, "description": "日の当たる窓辺で丸くなる猫"}

Output (JSON only, no other text):"#;

/// User prompt for extraction from recognized text
pub fn text_prompt(recognized_text: &str) -> String {
    format!(
        r#"Using the text recognized in a photo, analyze what the photo is about and produce tags and a description.

Important: base the tags only on what the text says. Do not infer content the text does not contain.

Steps:
1. Read the text and decide what it is about (write this in "analysis").
2. From that analysis, produce tags per category.
3. Write a one or two sentence description.

Text:
{recognized_text}

Example 1:
{{"analysis": "An izakaya menu listing sashimi platters and yakitori with prices", "tags": {{"objects": ["メニュー", "居酒屋"], "scene": ["飲食店"], "attributes": ["和食"], "mood": []}}, "description": "刺身や焼き鳥が並ぶ居酒屋のメニュー表"}}

Example 2:
{{"analysis": "A poster announcing the date and venue of a 2024 fireworks festival", "tags": {{"objects": ["ポスター", "花火大会"], "scene": [], "attributes": [], "mood": []}}, "description": "花火大会の告知ポスター"}}

Output (JSON only, no other text):"#
    )
}

/// Single prompt for engines without a system role
pub fn combined_text_prompt(recognized_text: &str) -> String {
    format!("{}\n\n{}", SYSTEM_PROMPT, text_prompt(recognized_text))
}

/// Wrap a user turn in the chat template of the bundled local text model
pub fn local_chat_prompt(user_prompt: &str) -> String {
    format!(
        "<start_of_turn>user\n{}<end_of_turn>\n<start_of_turn>model\n",
        user_prompt
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_prompt_embeds_text_and_literal_braces() {
        let prompt = text_prompt("営業時間 10:00-20:00");
        assert!(prompt.contains("営業時間 10:00-20:00"));
        assert!(prompt.contains(r#"{"analysis": "An izakaya menu"#));
    }

    #[test]
    fn test_local_chat_prompt_ends_with_model_turn() {
        let prompt = local_chat_prompt("hello");
        assert!(prompt.starts_with("<start_of_turn>user\nhello"));
        assert!(prompt.ends_with("<start_of_turn>model\n"));
    }

    #[test]
    fn test_combined_prompt_carries_rules() {
        let prompt = combined_text_prompt("menu");
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("menu"));
    }
}
