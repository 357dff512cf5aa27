//! Helpers for extracting JSON from model output
//!
//! Models wrap JSON in prose or markdown fences; these helpers locate the
//! outermost object or array and parse it leniently.

use serde_json::Value;

/// Extract the outermost JSON object from free-form text
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Extract the outermost JSON array from free-form text
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Parse model output as JSON, tolerating surrounding prose and code fences.
///
/// Tries a direct parse first, then the outermost object, then the
/// outermost array. Returns `None` when nothing parses.
pub fn parse_json_lenient(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);

    if let Ok(value) = serde_json::from_str::<Value>(stripped.trim()) {
        return Some(value);
    }

    if let Some(object) = extract_json_object(&stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(object) {
            return Some(value);
        }
    }

    if let Some(array) = extract_json_array(&stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(array) {
            return Some(value);
        }
    }

    None
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim_end_matches("```").trim().to_string()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_end_matches("```").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_prose() {
        let text = "Here is the analysis: {\"summary\": \"done\"} hope it helps";
        let value = parse_json_lenient(text).unwrap();
        assert_eq!(value["summary"], "done");
    }

    #[test]
    fn extracts_array_from_fenced_block() {
        let text = "```json\n[\"budget_range\", \"timeline\"]\n```";
        let value = parse_json_lenient(text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn returns_none_for_plain_prose() {
        assert!(parse_json_lenient("no structured content here").is_none());
    }

    #[test]
    fn nested_braces_resolve_to_outermost_object() {
        let text = "{\"a\": {\"b\": 1}} trailing";
        let value = parse_json_lenient(text).unwrap();
        assert_eq!(value["a"]["b"], 1);
    }
}
