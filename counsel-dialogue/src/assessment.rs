//! Completion assessment
//!
//! Scores conversational sufficiency from breadth, depth, progress, and an
//! open-gap penalty, then emits a continue / minimal-sufficient / sufficient
//! verdict. The reasoned gap list is AI-first with a rule-based fallback;
//! LLM failures are recovered silently with attenuated confidence. Fails
//! only when the state itself violates an invariant.

use crate::state::ConversationState;
use counsel_core::{assessment_error, clamp_score, CounselResult, ModeConfig};
use counsel_llm::{generate_with_retry, parse_json_lenient, LlmClient, LlmOptions, LlmRetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Verdict on whether the dialogue has gathered enough
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionVerdict {
    Continue,
    MinimalSufficient,
    Sufficient,
}

impl std::fmt::Display for CompletionVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CompletionVerdict::Continue => "continue",
            CompletionVerdict::MinimalSufficient => "minimal_sufficient",
            CompletionVerdict::Sufficient => "sufficient",
        };
        write!(f, "{}", label)
    }
}

/// Result of one completion assessment
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentResult {
    pub confidence: f64,
    pub verdict: CompletionVerdict,
    /// Reasoned list of information still worth gathering
    pub open_gaps: Vec<String>,
    pub reasoning: String,
}

/// AI-assisted conversation completion assessment
pub struct CompletionAssessor {
    llm: Option<Arc<dyn LlmClient>>,
    retry: LlmRetryPolicy,
    options: LlmOptions,
}

impl CompletionAssessor {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, retry: LlmRetryPolicy, options: LlmOptions) -> Self {
        Self { llm, retry, options }
    }

    pub fn rule_based() -> Self {
        Self::new(None, LlmRetryPolicy::default(), LlmOptions::default())
    }

    /// Assess sufficiency; errors only on state invariant violations.
    pub async fn assess(
        &self,
        state: &ConversationState,
        mode: &ModeConfig,
    ) -> CounselResult<AssessmentResult> {
        Self::check_invariants(state)?;

        let breadth = {
            let strong_factors = state
                .priority_factors
                .values()
                .filter(|w| **w > 0.3)
                .count();
            (strong_factors as f64 / 4.0).min(1.0)
        };

        let depth = (state.answered_chars() as f64 / 600.0).min(1.0);

        let asked = state.question_history.len();
        let progress = if mode.max_questions == 0 {
            1.0
        } else {
            (asked as f64 / mode.max_questions as f64).min(1.0)
        };

        let gap_penalty = (0.1 * state.information_gaps.len() as f64).min(0.5);

        let mut confidence =
            clamp_score(0.4 * breadth + 0.3 * depth + 0.3 * progress - gap_penalty);

        let (open_gaps, llm_failed) = self.reasoned_gaps(state).await;
        if llm_failed {
            confidence = clamp_score(confidence * 0.85);
        }

        let min_needed = mode.min_questions.max(2);
        let verdict = if confidence >= 0.75 || (asked >= mode.max_questions && confidence >= 0.5) {
            CompletionVerdict::Sufficient
        } else if confidence >= 0.4 && asked >= min_needed {
            CompletionVerdict::MinimalSufficient
        } else {
            CompletionVerdict::Continue
        };

        let reasoning = format!(
            "breadth {:.2}, depth {:.2}, progress {:.2}, gap penalty {:.2}; {} question(s) asked, {} open gap(s)",
            breadth,
            depth,
            progress,
            gap_penalty,
            asked,
            state.information_gaps.len()
        );

        debug!(
            session = %state.session_id,
            confidence,
            verdict = %verdict,
            "Completion assessment"
        );

        Ok(AssessmentResult {
            confidence,
            verdict,
            open_gaps,
            reasoning,
        })
    }

    fn check_invariants(state: &ConversationState) -> CounselResult<()> {
        if !(0.0..=1.0).contains(&state.completion_confidence) {
            return Err(assessment_error!(
                format!(
                    "completion_confidence out of range: {}",
                    state.completion_confidence
                ),
                "completion_assessor"
            ));
        }
        for (factor, weight) in &state.priority_factors {
            if !(0.0..=1.0).contains(weight) {
                return Err(assessment_error!(
                    format!("priority factor '{}' out of range: {}", factor, weight),
                    "completion_assessor"
                ));
            }
        }
        for (dimension, score) in &state.confidence_scores {
            if !(0.0..=1.0).contains(score) {
                return Err(assessment_error!(
                    format!("confidence score '{}' out of range: {}", dimension, score),
                    "completion_assessor"
                ));
            }
        }
        Ok(())
    }

    /// AI-first reasoned gaps; rule-based fallback lists high-weight
    /// priorities that still lack profile evidence.
    async fn reasoned_gaps(&self, state: &ConversationState) -> (Vec<String>, bool) {
        if let Some(llm) = &self.llm {
            let prompt = format!(
                r#"Given this clarification dialogue, list the information areas still missing
that would most improve the research.

{summary}

PROFILE: {profile}

Return only a JSON array of short strings specific to this conversation."#,
                summary = state.summary(),
                profile = serde_json::to_string(&state.user_profile).unwrap_or_default(),
            );

            match generate_with_retry(llm.as_ref(), &prompt, &self.options, &self.retry, None).await
            {
                Ok(response) => {
                    if let Some(value) = parse_json_lenient(&response.text) {
                        if let Some(array) = value.as_array() {
                            let gaps: Vec<String> = array
                                .iter()
                                .filter_map(|v| v.as_str())
                                .map(|s| s.to_string())
                                .take(6)
                                .collect();
                            if !gaps.is_empty() {
                                return (gaps, false);
                            }
                        }
                    }
                    warn!("Unparseable gap assessment response, using rule-based gaps");
                    (Self::fallback_gaps(state), true)
                }
                Err(e) => {
                    warn!(error = %e, "Gap assessment failed, using rule-based gaps");
                    (Self::fallback_gaps(state), true)
                }
            }
        } else {
            (Self::fallback_gaps(state), false)
        }
    }

    fn fallback_gaps(state: &ConversationState) -> Vec<String> {
        state
            .priority_factors
            .iter()
            .filter(|(_, weight)| **weight >= 0.5)
            .filter(|(factor, _)| {
                !state.user_profile.iter().any(|(key, value)| {
                    key.contains(factor.as_str())
                        || value
                            .as_search_text()
                            .to_lowercase()
                            .contains(factor.as_str())
                })
            })
            .map(|(factor, weight)| format!("{} (weight {:.2}) lacks supporting detail", factor, weight))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{QuestionAnswer, QuestionType};
    use counsel_core::{ConversationMode, ModeConfig};

    fn state_with_turns(turns: usize, answer: &str) -> ConversationState {
        let mut state =
            ConversationState::new("DRA_20250301_120000_000001", "need a good laptop").unwrap();
        for i in 0..turns {
            state.add_qa(QuestionAnswer::new(
                &format!("question number {}?", i),
                answer,
                QuestionType::OpenEnded,
                &format!("category_{}", i),
                0.7,
            ));
        }
        state
    }

    fn standard() -> ModeConfig {
        ModeConfig::for_mode(ConversationMode::Standard)
    }

    #[tokio::test]
    async fn early_conversation_continues() {
        let state = state_with_turns(1, "short");
        let result = CompletionAssessor::rule_based()
            .assess(&state, &standard())
            .await
            .unwrap();
        assert_eq!(result.verdict, CompletionVerdict::Continue);
        assert!(result.confidence < 0.4);
    }

    #[tokio::test]
    async fn rich_conversation_is_sufficient() {
        let long_answer = "a".repeat(200);
        let mut state = state_with_turns(6, &long_answer);
        for factor in ["budget", "timeline", "quality", "convenience"] {
            state.set_priority(factor, 0.8);
        }
        let result = CompletionAssessor::rule_based()
            .assess(&state, &standard())
            .await
            .unwrap();
        // breadth 1.0, depth 1.0, progress 1.0, no gaps
        assert_eq!(result.verdict, CompletionVerdict::Sufficient);
        assert!(result.confidence >= 0.75);
    }

    #[tokio::test]
    async fn moderate_conversation_is_minimal_sufficient() {
        let answer = "a".repeat(100);
        let mut state = state_with_turns(3, &answer);
        state.set_priority("budget", 0.8);
        state.set_priority("timeline", 0.6);
        let result = CompletionAssessor::rule_based()
            .assess(&state, &standard())
            .await
            .unwrap();
        assert_eq!(result.verdict, CompletionVerdict::MinimalSufficient);
        assert!(result.confidence >= 0.4 && result.confidence < 0.75);
    }

    #[tokio::test]
    async fn gap_penalty_lowers_confidence() {
        let answer = "a".repeat(100);
        let mut base = state_with_turns(3, &answer);
        base.set_priority("budget", 0.8);
        let without_gaps = CompletionAssessor::rule_based()
            .assess(&base, &standard())
            .await
            .unwrap();

        for i in 0..4 {
            base.add_gap(&format!("missing detail {}", i));
        }
        let with_gaps = CompletionAssessor::rule_based()
            .assess(&base, &standard())
            .await
            .unwrap();
        assert!(with_gaps.confidence < without_gaps.confidence);
    }

    #[tokio::test]
    async fn cap_reached_with_decent_confidence_is_sufficient() {
        let answer = "a".repeat(80);
        let mut state = state_with_turns(6, &answer);
        state.set_priority("budget", 0.8);
        state.set_priority("quality", 0.6);
        let result = CompletionAssessor::rule_based()
            .assess(&state, &standard())
            .await
            .unwrap();
        // progress = 1.0 at the cap; confidence >= 0.5 forces sufficiency
        assert_eq!(result.verdict, CompletionVerdict::Sufficient);
    }

    #[tokio::test]
    async fn invariant_violation_is_an_error() {
        let mut state = state_with_turns(1, "fine");
        // Bypass the clamping mutators to simulate a corrupted state
        state.priority_factors.insert("budget".to_string(), 1.7);
        let err = CompletionAssessor::rule_based()
            .assess(&state, &standard())
            .await
            .unwrap_err();
        assert!(matches!(err, counsel_core::CounselError::Assessment { .. }));
    }

    #[tokio::test]
    async fn fallback_gaps_name_uncovered_priorities() {
        let mut state = state_with_turns(2, "something vague");
        state.set_priority("budget", 0.9);
        state.set_priority("quality", 0.2);
        let result = CompletionAssessor::rule_based()
            .assess(&state, &standard())
            .await
            .unwrap();
        assert!(result.open_gaps.iter().any(|g| g.contains("budget")));
        assert!(!result.open_gaps.iter().any(|g| g.contains("quality")));
    }
}
