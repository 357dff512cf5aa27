//! Conversation state tracking
//!
//! The core data structure maintained across a clarification dialogue:
//! user profile, detected priorities, information gaps, question history,
//! and confidence scores. All mutators are total — out-of-range weights are
//! clamped, duplicate gaps are no-ops with a returned flag — and the
//! canonical JSON serialization round-trips losslessly (maps are ordered,
//! scores rounded to 6 decimals at mutation time).

use crate::memory::{fingerprint, normalize_question};
use chrono::{DateTime, Utc};
use counsel_core::{
    clamp_score, CounselError, CounselResult, ConversationMode, ErrorContext, ProfileValue,
    ResearchContext,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Question categorization used by the generator and memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    OpenEnded,
    Clarification,
    Priority,
    Constraint,
    Preference,
    Validation,
    FollowUp,
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            QuestionType::OpenEnded => "open_ended",
            QuestionType::Clarification => "clarification",
            QuestionType::Priority => "priority",
            QuestionType::Constraint => "constraint",
            QuestionType::Preference => "preference",
            QuestionType::Validation => "validation",
            QuestionType::FollowUp => "follow_up",
        };
        write!(f, "{}", label)
    }
}

impl QuestionType {
    pub fn parse(value: &str) -> Self {
        match value {
            "clarification" => QuestionType::Clarification,
            "priority" => QuestionType::Priority,
            "constraint" => QuestionType::Constraint,
            "preference" => QuestionType::Preference,
            "validation" => QuestionType::Validation,
            "follow_up" => QuestionType::FollowUp,
            _ => QuestionType::OpenEnded,
        }
    }
}

/// A single asked-and-answered turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    /// Stable id derived from the normalized question text
    pub question_id: String,
    pub question_text: String,
    pub answer_text: String,
    pub question_type: QuestionType,
    /// Free-form descriptive tag emitted by the question generator
    pub category: String,
    pub asked_at: DateTime<Utc>,
    pub answered_at: DateTime<Utc>,
    pub priority_score: f64,
    pub follow_up_hint: Option<String>,
}

impl QuestionAnswer {
    pub fn new(
        question_text: &str,
        answer_text: &str,
        question_type: QuestionType,
        category: &str,
        priority_score: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            question_id: fingerprint(question_text),
            question_text: question_text.to_string(),
            answer_text: answer_text.to_string(),
            question_type,
            category: category.to_string(),
            asked_at: now,
            answered_at: now,
            priority_score: clamp_score(priority_score),
            follow_up_hint: None,
        }
    }
}

/// Intensity and triggering phrases for one emotional dimension
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionSignal {
    pub intensity: f64,
    pub triggering_phrases: Vec<String>,
}

/// Deeper understanding of the user's situation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUnderstanding {
    pub detected_topics: Vec<String>,
    pub technical_level: String,
    pub decision_complexity: f64,
}

impl Default for ContextUnderstanding {
    fn default() -> Self {
        Self {
            detected_topics: Vec::new(),
            technical_level: "unknown".to_string(),
            decision_complexity: 0.0,
        }
    }
}

/// Comprehensive conversation state for one research session.
///
/// Created by the orchestrator at session start, mutated only by the
/// orchestrator, context analyzer, and mode intelligence, then frozen and
/// handed to the research pipeline as a [`ResearchContext`] snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    pub user_query: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,

    pub user_profile: BTreeMap<String, ProfileValue>,
    pub information_gaps: Vec<String>,
    pub priority_factors: BTreeMap<String, f64>,
    pub confidence_scores: BTreeMap<String, f64>,

    pub question_history: Vec<QuestionAnswer>,
    pub conversation_mode: ConversationMode,

    pub context_understanding: ContextUnderstanding,
    pub emotional_indicators: BTreeMap<String, EmotionSignal>,

    pub completion_confidence: f64,
    pub next_question_suggestions: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ConversationState {
    /// Create a new state; fails only on an empty query.
    pub fn new(session_id: impl Into<String>, user_query: &str) -> CounselResult<Self> {
        let session_id = session_id.into();
        let query = user_query.trim();
        if query.is_empty() {
            return Err(CounselError::Input {
                message: "user_query must not be empty".to_string(),
                field: Some("user_query".to_string()),
                context: ErrorContext::new("conversation_state").with_operation("new"),
            });
        }

        let now = Utc::now();
        Ok(Self {
            session_id,
            user_query: query.to_string(),
            created_at: now,
            last_updated_at: now,
            user_profile: BTreeMap::new(),
            information_gaps: Vec::new(),
            priority_factors: BTreeMap::new(),
            confidence_scores: BTreeMap::new(),
            question_history: Vec::new(),
            conversation_mode: ConversationMode::Standard,
            context_understanding: ContextUnderstanding::default(),
            emotional_indicators: BTreeMap::new(),
            completion_confidence: 0.0,
            next_question_suggestions: Vec::new(),
            metadata: BTreeMap::new(),
        })
    }

    /// Append an answered turn; ordering is insertion order = asked order.
    pub fn add_qa(&mut self, qa: QuestionAnswer) {
        self.question_history.push(qa);
        self.touch();
    }

    pub fn update_profile(&mut self, key: &str, value: ProfileValue) {
        self.user_profile.insert(key.to_string(), value);
        self.touch();
    }

    /// Record an information gap; idempotent on normalized text.
    ///
    /// Returns whether the gap was newly added.
    pub fn add_gap(&mut self, text: &str) -> bool {
        let normalized = normalize_question(text);
        if normalized.is_empty() {
            return false;
        }
        let exists = self
            .information_gaps
            .iter()
            .any(|g| normalize_question(g) == normalized);
        if exists {
            return false;
        }
        self.information_gaps.push(text.trim().to_string());
        self.touch();
        true
    }

    /// Remove a gap once it has been filled; returns whether it was present.
    pub fn remove_gap(&mut self, text: &str) -> bool {
        let normalized = normalize_question(text);
        let before = self.information_gaps.len();
        self.information_gaps
            .retain(|g| normalize_question(g) != normalized);
        let removed = self.information_gaps.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Set a priority factor weight, clamped into [0, 1].
    ///
    /// Returns the weight actually applied.
    pub fn set_priority(&mut self, factor: &str, weight: f64) -> f64 {
        let applied = clamp_score(weight);
        self.priority_factors.insert(factor.to_string(), applied);
        self.touch();
        applied
    }

    /// Set a per-dimension confidence score, clamped into [0, 1].
    pub fn set_confidence(&mut self, dimension: &str, value: f64) -> f64 {
        let applied = clamp_score(value);
        self.confidence_scores.insert(dimension.to_string(), applied);
        self.touch();
        applied
    }

    pub fn set_completion_confidence(&mut self, value: f64) {
        self.completion_confidence = clamp_score(value);
        self.touch();
    }

    /// Merge an emotional signal, keeping the strongest observed intensity.
    pub fn merge_emotion(&mut self, dimension: &str, signal: EmotionSignal) {
        let entry = self
            .emotional_indicators
            .entry(dimension.to_string())
            .or_default();
        entry.intensity = clamp_score(entry.intensity.max(signal.intensity));
        for phrase in signal.triggering_phrases {
            if !entry.triggering_phrases.contains(&phrase) {
                entry.triggering_phrases.push(phrase);
            }
        }
        self.touch();
    }

    pub fn set_mode(&mut self, mode: ConversationMode) {
        self.conversation_mode = mode;
        self.touch();
    }

    /// Total answered-text length in characters, used for depth scoring.
    pub fn answered_chars(&self) -> usize {
        self.question_history
            .iter()
            .map(|qa| qa.answer_text.chars().count())
            .sum()
    }

    /// Digest of the conversation: query plus the latest answer per category.
    pub fn summary(&self) -> String {
        if self.question_history.is_empty() {
            return format!("Initial query: {}", self.user_query);
        }

        let mut latest: BTreeMap<&str, &str> = BTreeMap::new();
        for qa in &self.question_history {
            latest.insert(qa.category.as_str(), qa.answer_text.as_str());
        }

        let mut parts = vec![format!("Query: {}", self.user_query)];
        for (category, answer) in latest {
            let preview: String = answer.chars().take(100).collect();
            parts.push(format!("{}: {}", category, preview));
        }
        parts.join("; ")
    }

    /// Immutable snapshot handed to the research pipeline.
    pub fn snapshot(&self) -> ResearchContext {
        ResearchContext {
            session_id: self.session_id.clone(),
            user_query: self.user_query.clone(),
            priority_factors: self.priority_factors.clone(),
            information_gaps: self.information_gaps.clone(),
            user_profile: self.user_profile.clone(),
            emotional_indicators: self
                .emotional_indicators
                .iter()
                .map(|(k, v)| (k.clone(), v.intensity))
                .collect(),
            completion_confidence: self.completion_confidence,
            mode: self.conversation_mode,
        }
    }

    /// Canonical JSON serialization: deterministic key order, scores already
    /// rounded to 6 decimals by the mutators.
    pub fn serialize(&self) -> CounselResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn deserialize(json: &str) -> CounselResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ConversationState {
        ConversationState::new("DRA_20250301_120000_000001", "need a reliable laptop").unwrap()
    }

    #[test]
    fn empty_query_is_rejected() {
        let err = ConversationState::new("DRA_x", "   ").unwrap_err();
        assert!(matches!(err, CounselError::Input { .. }));
    }

    #[test]
    fn priorities_are_clamped_and_rounded() {
        let mut s = state();
        assert_eq!(s.set_priority("budget", 1.8), 1.0);
        assert_eq!(s.set_priority("timeline", -0.5), 0.0);
        assert_eq!(s.set_priority("quality", 0.123_456_78), 0.123_457);
    }

    #[test]
    fn gaps_are_deduplicated_by_normalized_text() {
        let mut s = state();
        assert!(s.add_gap("Budget range still unknown"));
        assert!(!s.add_gap("  budget range STILL unknown  "));
        assert_eq!(s.information_gaps.len(), 1);
        assert!(s.remove_gap("budget range still unknown"));
        assert!(s.information_gaps.is_empty());
    }

    #[test]
    fn serialization_round_trips() {
        let mut s = state();
        s.set_priority("budget", 0.77);
        s.set_confidence("budget", 0.61);
        s.update_profile("budget", ProfileValue::Text("under $1000".to_string()));
        s.add_gap("usage context unclear");
        s.merge_emotion(
            "urgency",
            EmotionSignal {
                intensity: 0.6,
                triggering_phrases: vec!["by tomorrow".to_string()],
            },
        );
        s.add_qa(QuestionAnswer::new(
            "What will you use it for?",
            "Mostly travel and work presentations",
            QuestionType::OpenEnded,
            "usage_context",
            0.8,
        ));
        s.set_completion_confidence(0.42);

        let json = s.serialize().unwrap();
        let restored = ConversationState::deserialize(&json).unwrap();
        assert_eq!(s, restored);
    }

    #[test]
    fn snapshot_carries_dialogue_outcome() {
        let mut s = state();
        s.set_priority("budget", 0.8);
        s.merge_emotion(
            "urgency",
            EmotionSignal {
                intensity: 0.9,
                triggering_phrases: vec!["asap".to_string()],
            },
        );
        s.set_completion_confidence(0.5);

        let ctx = s.snapshot();
        assert_eq!(ctx.user_query, "need a reliable laptop");
        assert_eq!(ctx.priority_factors["budget"], 0.8);
        assert_eq!(ctx.emotional_indicators["urgency"], 0.9);
        assert_eq!(ctx.completion_confidence, 0.5);
    }

    #[test]
    fn emotion_merge_keeps_strongest_intensity() {
        let mut s = state();
        s.merge_emotion(
            "urgency",
            EmotionSignal {
                intensity: 0.6,
                triggering_phrases: vec!["urgent".to_string()],
            },
        );
        s.merge_emotion(
            "urgency",
            EmotionSignal {
                intensity: 0.3,
                triggering_phrases: vec!["soon".to_string()],
            },
        );
        let signal = &s.emotional_indicators["urgency"];
        assert_eq!(signal.intensity, 0.6);
        assert_eq!(signal.triggering_phrases.len(), 2);
    }
}
