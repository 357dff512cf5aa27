//! Input sanitization and size clamping
//!
//! Rejects queries that are empty, oversized, or carry control characters,
//! and clamps free-form strings to the configured bounds before they enter
//! session state.

use crate::config::ValidationSettings;
use crate::error::{CounselError, CounselResult, ErrorContext};

/// Validate and normalize a user research query.
///
/// Returns the trimmed query or an `Input` error; no session is created on
/// failure.
pub fn validate_query(query: &str, settings: &ValidationSettings) -> CounselResult<String> {
    let trimmed = query.trim();

    if trimmed.is_empty() {
        return Err(CounselError::Input {
            message: "Query must not be empty".to_string(),
            field: Some("user_query".to_string()),
            context: ErrorContext::new("sanitize").with_operation("validate_query"),
        });
    }

    if trimmed.chars().count() < settings.query_min_length {
        return Err(CounselError::Input {
            message: format!(
                "Query too short: minimum {} characters",
                settings.query_min_length
            ),
            field: Some("user_query".to_string()),
            context: ErrorContext::new("sanitize").with_operation("validate_query"),
        });
    }

    if trimmed.chars().count() > settings.query_max_length {
        return Err(CounselError::Input {
            message: format!(
                "Query too long: maximum {} characters",
                settings.query_max_length
            ),
            field: Some("user_query".to_string()),
            context: ErrorContext::new("sanitize")
                .with_operation("validate_query")
                .with_suggestion("Shorten the query or raise validation.query_max_length"),
        });
    }

    if trimmed.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return Err(CounselError::Input {
            message: "Query contains control characters".to_string(),
            field: Some("user_query".to_string()),
            context: ErrorContext::new("sanitize").with_operation("validate_query"),
        });
    }

    Ok(collapse_whitespace(trimmed))
}

/// Clamp a free-form answer or profile value to the configured maximum length.
pub fn clamp_text(text: &str, settings: &ValidationSettings) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    truncate_chars(cleaned.trim(), settings.string_max_length)
}

/// Clamp a user-profile key to its configured maximum length.
pub fn clamp_profile_key(key: &str, settings: &ValidationSettings) -> String {
    truncate_chars(key.trim(), settings.personalization_key_max_length)
}

/// Clamp a user-profile value to its configured maximum length.
pub fn clamp_profile_value(value: &str, settings: &ValidationSettings) -> String {
    truncate_chars(value.trim(), settings.personalization_value_max_length)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ValidationSettings {
        ValidationSettings::default()
    }

    #[test]
    fn rejects_empty_query() {
        let err = validate_query("   ", &settings()).unwrap_err();
        assert!(matches!(err, CounselError::Input { .. }));
    }

    #[test]
    fn rejects_oversized_query() {
        let long = "x".repeat(1000);
        assert!(validate_query(&long, &settings()).is_err());
    }

    #[test]
    fn normalizes_internal_whitespace() {
        let query = validate_query("  need   a\tnew  laptop ", &settings()).unwrap();
        assert_eq!(query, "need a new laptop");
    }

    #[test]
    fn clamps_profile_value_length() {
        let value = "v".repeat(500);
        assert_eq!(clamp_profile_value(&value, &settings()).chars().count(), 200);
    }
}
