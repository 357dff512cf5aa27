//! Conversation mode intelligence
//!
//! Selects the initial mode from signals in the opening query and proposes
//! mid-dialogue transitions from engagement metrics. Switching up requires
//! sustained long answers, no urgency markers, and an unmet high-weight
//! factor; switching down happens on minimal answers or explicit urgency.
//! A transition never revisits already asked questions — it only adjusts
//! the remaining budget.

use crate::state::ConversationState;
use counsel_core::{ConversationModes, ConversationMode};
use tracing::debug;

const URGENCY_MARKERS: &[&str] = &[
    "asap", "urgent", "immediately", "right away", "by tomorrow", "today", "quick", "hurry",
];
const COMPLEXITY_MARKERS: &[&str] = &[
    "compare", "options", "versus", "vs", "alternatives", "trade-off", "tradeoffs",
];
const STAKEHOLDER_MARKERS: &[&str] = &[
    "family", "team", "household", "company", "colleagues", "partner", "kids",
];
const DEPTH_MARKERS: &[&str] = &[
    "thorough", "comprehensive", "detailed", "in-depth", "exhaustive", "installation", "architecture",
];

/// Answer-length thresholds (characters) for engagement-based switching
const SWITCH_UP_AVG_CHARS: f64 = 180.0;
const SWITCH_DOWN_AVG_CHARS: f64 = 15.0;

/// Engagement signals measured over the recent turns
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementMetrics {
    /// Mean answer length over the last three turns, in characters
    pub avg_recent_answer_chars: f64,
    /// Mean seconds between asking and answering, when timestamps allow
    pub avg_response_latency_secs: Option<f64>,
    /// Three consecutive single-word answers
    pub dropout: bool,
    /// Urgency markers present in recent answers
    pub urgency_markers: bool,
}

/// Mode selection and mid-dialogue adaptation
pub struct ModeIntelligence {
    modes: ConversationModes,
}

impl ModeIntelligence {
    pub fn new(modes: ConversationModes) -> Self {
        Self { modes }
    }

    pub fn modes(&self) -> &ConversationModes {
        &self.modes
    }

    /// Pick the starting mode from the opening query.
    ///
    /// Urgency pushes toward QUICK, complexity and depth signals toward
    /// DEEP; ambiguous signals default to ADAPTIVE.
    pub fn select_initial_mode(&self, query: &str) -> ConversationMode {
        let lower = query.to_lowercase();

        let urgency = URGENCY_MARKERS.iter().filter(|m| lower.contains(*m)).count();
        let complexity = COMPLEXITY_MARKERS.iter().filter(|m| lower.contains(*m)).count()
            + STAKEHOLDER_MARKERS.iter().filter(|m| lower.contains(*m)).count();
        let depth = DEPTH_MARKERS.iter().filter(|m| lower.contains(*m)).count();

        let quick_score = urgency as f64 * 1.0;
        let deep_score = complexity as f64 * 0.7 + depth as f64 * 0.6;
        let standard_score = 0.5;

        let mode = if quick_score >= 1.0 && quick_score >= deep_score {
            ConversationMode::Quick
        } else if deep_score >= 1.2 {
            ConversationMode::Deep
        } else if quick_score == 0.0 && deep_score == 0.0 {
            ConversationMode::Adaptive
        } else if deep_score > standard_score {
            ConversationMode::Deep
        } else {
            ConversationMode::Standard
        };

        debug!(
            query = %query,
            urgency,
            complexity,
            depth,
            selected = %mode,
            "Initial mode selected"
        );
        mode
    }

    /// Measure engagement from the recent turns.
    pub fn measure_engagement(state: &ConversationState) -> EngagementMetrics {
        let recent: Vec<_> = state
            .question_history
            .iter()
            .rev()
            .take(3)
            .collect();

        if recent.is_empty() {
            return EngagementMetrics {
                avg_recent_answer_chars: 0.0,
                avg_response_latency_secs: None,
                dropout: false,
                urgency_markers: false,
            };
        }

        let avg_recent_answer_chars = recent
            .iter()
            .map(|qa| qa.answer_text.chars().count())
            .sum::<usize>() as f64
            / recent.len() as f64;

        let latencies: Vec<f64> = recent
            .iter()
            .map(|qa| {
                (qa.answered_at - qa.asked_at)
                    .to_std()
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0)
            })
            .collect();
        let avg_response_latency_secs = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
        };

        let dropout = recent.len() >= 3
            && recent
                .iter()
                .all(|qa| qa.answer_text.split_whitespace().count() <= 1);

        let combined = recent
            .iter()
            .map(|qa| qa.answer_text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let urgency_markers = URGENCY_MARKERS.iter().any(|m| combined.contains(m));

        EngagementMetrics {
            avg_recent_answer_chars,
            avg_response_latency_secs,
            dropout,
            urgency_markers,
        }
    }

    /// Propose a mode transition after turn two, or `None` to stay.
    pub fn evaluate_switch(
        &self,
        state: &ConversationState,
        metrics: &EngagementMetrics,
    ) -> Option<ConversationMode> {
        if state.question_history.len() < 2 {
            return None;
        }

        let current = state.conversation_mode;

        // Down: low engagement or explicit urgency
        if metrics.dropout
            || metrics.urgency_markers
            || metrics.avg_recent_answer_chars < SWITCH_DOWN_AVG_CHARS
        {
            let target = match current {
                ConversationMode::Deep => Some(ConversationMode::Standard),
                ConversationMode::Standard | ConversationMode::Adaptive => {
                    Some(ConversationMode::Quick)
                }
                ConversationMode::Quick => None,
            };
            if let Some(target) = target {
                debug!(from = %current, to = %target, "Mode switch down");
                return Some(target);
            }
            return None;
        }

        // Up: sustained long answers and an unmet high-weight factor
        if metrics.avg_recent_answer_chars > SWITCH_UP_AVG_CHARS {
            let has_unmet_high_weight = state
                .priority_factors
                .iter()
                .any(|(factor, weight)| {
                    *weight >= 0.5
                        && !state.user_profile.iter().any(|(key, value)| {
                            key.contains(factor.as_str())
                                || value
                                    .as_search_text()
                                    .to_lowercase()
                                    .contains(factor.as_str())
                        })
                })
                || !state.information_gaps.is_empty();

            if has_unmet_high_weight {
                let target = match current {
                    ConversationMode::Quick => Some(ConversationMode::Standard),
                    ConversationMode::Standard | ConversationMode::Adaptive => {
                        Some(ConversationMode::Deep)
                    }
                    ConversationMode::Deep => None,
                };
                if let Some(target) = target {
                    debug!(from = %current, to = %target, "Mode switch up");
                    return Some(target);
                }
            }
        }

        None
    }

    /// Whether a transition lowers the question budget.
    pub fn is_downgrade(&self, from: ConversationMode, to: ConversationMode) -> bool {
        self.modes.config_for(to).max_questions < self.modes.config_for(from).max_questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{QuestionAnswer, QuestionType};

    fn intel() -> ModeIntelligence {
        ModeIntelligence::new(ConversationModes::default())
    }

    fn state_with_answers(answers: &[&str]) -> ConversationState {
        let mut state =
            ConversationState::new("DRA_20250301_120000_000001", "compare standing desks").unwrap();
        for (i, answer) in answers.iter().enumerate() {
            state.add_qa(QuestionAnswer::new(
                &format!("question {}?", i),
                answer,
                QuestionType::OpenEnded,
                "context",
                0.7,
            ));
        }
        state
    }

    #[test]
    fn urgent_query_selects_quick() {
        assert_eq!(
            intel().select_initial_mode("need cheap laptop by tomorrow"),
            ConversationMode::Quick
        );
        assert_eq!(
            intel().select_initial_mode("urgent: which phone should I get asap"),
            ConversationMode::Quick
        );
    }

    #[test]
    fn complex_comparison_selects_deep() {
        assert_eq!(
            intel().select_initial_mode(
                "compare options for a home solar installation for a four-person household"
            ),
            ConversationMode::Deep
        );
    }

    #[test]
    fn ambiguous_query_selects_adaptive() {
        assert_eq!(
            intel().select_initial_mode("research machine learning"),
            ConversationMode::Adaptive
        );
    }

    #[test]
    fn long_answers_with_open_gaps_switch_up() {
        let long = "d".repeat(200);
        let mut state = state_with_answers(&[&long, &long, &long]);
        state.set_priority("budget", 0.8);
        let metrics = ModeIntelligence::measure_engagement(&state);
        assert!(metrics.avg_recent_answer_chars > 180.0);

        let switched = intel().evaluate_switch(&state, &metrics);
        assert_eq!(switched, Some(ConversationMode::Deep));
    }

    #[test]
    fn minimal_answers_switch_down() {
        let mut state = state_with_answers(&["ok", "no", "yes"]);
        state.set_mode(ConversationMode::Deep);
        let metrics = ModeIntelligence::measure_engagement(&state);
        assert!(metrics.dropout);

        let switched = intel().evaluate_switch(&state, &metrics);
        assert_eq!(switched, Some(ConversationMode::Standard));
    }

    #[test]
    fn urgency_in_answers_switches_down() {
        let state = {
            let mut s = state_with_answers(&[
                "I'd like something sturdy and adjustable for my office",
                "honestly I need this sorted quick, no time to dig deep",
            ]);
            s.set_mode(ConversationMode::Standard);
            s
        };
        let metrics = ModeIntelligence::measure_engagement(&state);
        assert!(metrics.urgency_markers);
        assert_eq!(
            intel().evaluate_switch(&state, &metrics),
            Some(ConversationMode::Quick)
        );
    }

    #[test]
    fn no_switch_before_turn_two() {
        let long = "d".repeat(200);
        let mut state = state_with_answers(&[&long]);
        state.set_priority("budget", 0.8);
        let metrics = ModeIntelligence::measure_engagement(&state);
        assert_eq!(intel().evaluate_switch(&state, &metrics), None);
    }

    #[test]
    fn downgrade_detection() {
        let intel = intel();
        assert!(intel.is_downgrade(ConversationMode::Deep, ConversationMode::Standard));
        assert!(!intel.is_downgrade(ConversationMode::Quick, ConversationMode::Standard));
    }
}
