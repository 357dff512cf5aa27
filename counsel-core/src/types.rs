//! Core data type definitions shared across the workspace

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conversation pacing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// A handful of essential questions, fast decisions
    Quick,
    /// Balanced question budget, thorough but efficient
    Standard,
    /// Comprehensive exploration with a large budget
    Deep,
    /// Dynamic switching based on engagement
    Adaptive,
}

impl std::fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationMode::Quick => write!(f, "quick"),
            ConversationMode::Standard => write!(f, "standard"),
            ConversationMode::Deep => write!(f, "deep"),
            ConversationMode::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Question depth associated with a conversation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionDepth {
    Surface,
    Moderate,
    Comprehensive,
}

/// Question budget and pacing configuration for one conversation mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub min_questions: usize,
    pub max_questions: usize,
    pub time_sensitivity_threshold: f64,
    pub question_depth: QuestionDepth,
}

impl ModeConfig {
    pub fn for_mode(mode: ConversationMode) -> Self {
        match mode {
            ConversationMode::Quick => Self {
                min_questions: 1,
                max_questions: 3,
                time_sensitivity_threshold: 0.8,
                question_depth: QuestionDepth::Surface,
            },
            ConversationMode::Standard => Self {
                min_questions: 3,
                max_questions: 6,
                time_sensitivity_threshold: 0.5,
                question_depth: QuestionDepth::Moderate,
            },
            ConversationMode::Deep => Self {
                min_questions: 4,
                max_questions: 12,
                time_sensitivity_threshold: 0.2,
                question_depth: QuestionDepth::Comprehensive,
            },
            ConversationMode::Adaptive => Self {
                min_questions: 3,
                max_questions: 8,
                time_sensitivity_threshold: 0.5,
                question_depth: QuestionDepth::Moderate,
            },
        }
    }
}

/// A scalar or list value stored in the user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl ProfileValue {
    /// Text content of this value for keyword scanning, joined for lists.
    pub fn as_search_text(&self) -> String {
        match self {
            ProfileValue::Text(s) => s.clone(),
            ProfileValue::List(items) => items.join(" "),
            ProfileValue::Number(n) => n.to_string(),
            ProfileValue::Flag(b) => b.to_string(),
        }
    }
}

impl From<&str> for ProfileValue {
    fn from(value: &str) -> Self {
        ProfileValue::Text(value.to_string())
    }
}

impl From<String> for ProfileValue {
    fn from(value: String) -> Self {
        ProfileValue::Text(value)
    }
}

/// Immutable snapshot of the dialogue handed to the research pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub session_id: String,
    pub user_query: String,
    pub priority_factors: BTreeMap<String, f64>,
    pub information_gaps: Vec<String>,
    pub user_profile: BTreeMap<String, ProfileValue>,
    pub emotional_indicators: BTreeMap<String, f64>,
    pub completion_confidence: f64,
    pub mode: ConversationMode,
}

/// Question shell delivered across the UI boundary (question only, no answer yet)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPrompt {
    pub text: String,
    pub question_type: String,
    pub category: String,
    pub priority: f64,
}

/// Generate a session identifier: `DRA_YYYYMMDD_HHMMSS_micros`.
///
/// The microsecond suffix keeps ids unique within a second.
pub fn generate_session_id() -> String {
    let now = Utc::now();
    format!(
        "DRA_{}_{:06}",
        now.format("%Y%m%d_%H%M%S"),
        now.timestamp_subsec_micros()
    )
}

/// Round a score to 6 decimal places for canonical serialization.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Clamp a weight or score into [0, 1] and round it canonically.
pub fn clamp_score(value: f64) -> f64 {
    round6(value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_expected_shape() {
        let id = generate_session_id();
        assert!(id.starts_with("DRA_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 6);
    }

    #[test]
    fn clamp_score_bounds_and_rounds() {
        assert_eq!(clamp_score(1.7), 1.0);
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(clamp_score(0.123_456_789), 0.123_457);
    }

    #[test]
    fn mode_budgets_match_configuration_table() {
        let quick = ModeConfig::for_mode(ConversationMode::Quick);
        assert_eq!((quick.min_questions, quick.max_questions), (1, 3));
        let deep = ModeConfig::for_mode(ConversationMode::Deep);
        assert_eq!((deep.min_questions, deep.max_questions), (4, 12));
        let adaptive = ModeConfig::for_mode(ConversationMode::Adaptive);
        assert_eq!((adaptive.min_questions, adaptive.max_questions), (3, 8));
    }
}
