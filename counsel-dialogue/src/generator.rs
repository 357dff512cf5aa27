//! AI question generation with deterministic fallback
//!
//! Produces the next clarifying question from the conversation state and
//! memory. The LLM path is grounded in the classified intent and domain,
//! the asked-question registry, and the open gaps; when the model fails or
//! returns something unusable, an enumerated template table keyed by intent
//! and the highest-priority unmet gap takes over. The generator never
//! returns a duplicate — when nothing fresh remains it returns `None`.

use crate::intent::{classify_domain, classify_intent, Intent};
use crate::memory::ConversationMemory;
use crate::state::{ConversationState, QuestionType};
use counsel_core::{clamp_score, QuestionGenerationSettings, QuestionPrompt};
use counsel_llm::{generate_with_retry, parse_json_lenient, LlmClient, LlmOptions, LlmRetryPolicy};
use std::sync::Arc;
use tracing::{debug, warn};

/// A proposed question (question only, no answer yet)
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionProposal {
    pub text: String,
    pub question_type: QuestionType,
    pub category: String,
    pub priority: f64,
    pub rationale: Option<String>,
}

impl QuestionProposal {
    pub fn to_prompt(&self) -> QuestionPrompt {
        QuestionPrompt {
            text: self.text.clone(),
            question_type: self.question_type.to_string(),
            category: self.category.clone(),
            priority: self.priority,
        }
    }
}

type Template = (&'static str, &'static str, QuestionType, f64);

/// Enumerated fallback templates per intent: (text, category, type, priority)
fn templates_for(intent: Intent) -> &'static [Template] {
    match intent {
        Intent::Purchase => &[
            ("What's your budget range for this?", "budget", QuestionType::Constraint, 0.9),
            ("When do you need this by?", "timeline", QuestionType::Constraint, 0.8),
            ("What features matter most to you?", "preferences", QuestionType::Preference, 0.8),
            ("Are there any deal-breakers to avoid?", "constraints", QuestionType::Constraint, 0.7),
            ("How will you mainly use it?", "usage_context", QuestionType::OpenEnded, 0.7),
        ],
        Intent::Learning => &[
            ("What's your current experience level with this?", "expertise", QuestionType::OpenEnded, 0.9),
            ("What specific aspects interest you most?", "preferences", QuestionType::Preference, 0.8),
            ("How much time can you dedicate to this?", "timeline", QuestionType::Constraint, 0.7),
            ("Do you prefer hands-on practice or structured material?", "learning_style", QuestionType::Preference, 0.6),
        ],
        Intent::Comparison => &[
            ("Which options are you already considering?", "options", QuestionType::Clarification, 0.9),
            ("What criteria matter most for your decision?", "criteria", QuestionType::Priority, 0.9),
            ("What's your budget range for this?", "budget", QuestionType::Constraint, 0.7),
            ("Are there any deal-breakers to avoid?", "constraints", QuestionType::Constraint, 0.7),
            ("Who else is affected by this choice?", "stakeholders", QuestionType::Clarification, 0.6),
        ],
        Intent::Research => &[
            ("What do you want to be able to do with the findings?", "goals", QuestionType::OpenEnded, 0.9),
            ("How deep should the research go — overview or exhaustive?", "depth", QuestionType::Preference, 0.8),
            ("What do you already know about this topic?", "background", QuestionType::OpenEnded, 0.7),
            ("Is there a deadline for your decision?", "timeline", QuestionType::Constraint, 0.6),
        ],
        Intent::Planning => &[
            ("What's the rough timeframe you're planning for?", "timeline", QuestionType::Constraint, 0.9),
            ("Who is involved in this plan?", "stakeholders", QuestionType::Clarification, 0.8),
            ("What would a successful outcome look like?", "goals", QuestionType::OpenEnded, 0.8),
            ("What's your budget range for this?", "budget", QuestionType::Constraint, 0.7),
        ],
        Intent::Troubleshooting => &[
            ("What exactly happens when the problem occurs?", "symptoms", QuestionType::Clarification, 0.9),
            ("When did this start, and did anything change around then?", "history", QuestionType::Clarification, 0.8),
            ("What have you already tried?", "attempts", QuestionType::OpenEnded, 0.8),
            ("How urgent is a fix for you?", "timeline", QuestionType::Constraint, 0.6),
        ],
        Intent::General => &[
            ("What's most important to you in this situation?", "priorities", QuestionType::Priority, 0.8),
            ("Can you tell me more about how you plan to use this?", "usage_context", QuestionType::OpenEnded, 0.8),
            ("Are there constraints I should keep in mind?", "constraints", QuestionType::Constraint, 0.7),
            ("What's your timeline for deciding?", "timeline", QuestionType::Constraint, 0.6),
        ],
    }
}

/// Map an open gap descriptor to the template category that addresses it
fn category_for_gap(gap: &str) -> Option<&'static str> {
    let lower = gap.to_lowercase();
    for (needle, category) in [
        ("budget", "budget"),
        ("cost", "budget"),
        ("price", "budget"),
        ("timeline", "timeline"),
        ("deadline", "timeline"),
        ("urgen", "timeline"),
        ("experience", "expertise"),
        ("expertise", "expertise"),
        ("skill", "expertise"),
        ("usage", "usage_context"),
        ("context", "usage_context"),
        ("quality", "preferences"),
        ("feature", "preferences"),
        ("preference", "preferences"),
        ("criteria", "criteria"),
        ("option", "options"),
        ("stakeholder", "stakeholders"),
        ("family", "stakeholders"),
        ("goal", "goals"),
    ] {
        if lower.contains(needle) {
            return Some(category);
        }
    }
    None
}

/// AI-powered question generator with rule-based fallback
pub struct QuestionGenerator {
    llm: Option<Arc<dyn LlmClient>>,
    retry: LlmRetryPolicy,
    options: LlmOptions,
    settings: QuestionGenerationSettings,
}

impl QuestionGenerator {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        retry: LlmRetryPolicy,
        options: LlmOptions,
        settings: QuestionGenerationSettings,
    ) -> Self {
        Self {
            llm,
            retry,
            options,
            settings,
        }
    }

    /// Template-only generator
    pub fn rule_based(settings: QuestionGenerationSettings) -> Self {
        Self::new(None, LlmRetryPolicy::default(), LlmOptions::default(), settings)
    }

    /// Propose the next clarifying question, or `None` when every
    /// non-duplicate candidate is exhausted.
    pub async fn next_question(
        &self,
        state: &ConversationState,
        memory: &ConversationMemory,
        focus: Option<&str>,
    ) -> Option<QuestionProposal> {
        let intent = classify_intent(&state.user_query);

        if self.settings.enabled {
            if let Some(llm) = &self.llm {
                match self.generate_with_llm(llm.as_ref(), state, memory, intent, focus).await {
                    Some(proposal) => return Some(proposal),
                    None => {
                        debug!("LLM question generation unusable, falling back to templates");
                    }
                }
            }
        }

        self.template_fallback(state, memory, intent)
    }

    async fn generate_with_llm(
        &self,
        llm: &dyn LlmClient,
        state: &ConversationState,
        memory: &ConversationMemory,
        intent: Intent,
        focus: Option<&str>,
    ) -> Option<QuestionProposal> {
        let prompt = self.build_prompt(state, memory, intent, focus);

        let response =
            match generate_with_retry(llm, &prompt, &self.options, &self.retry, None).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "LLM question generation failed");
                    return None;
                }
            };

        let proposal = self.parse_proposal(&response.text)?;
        self.validate(state, memory, proposal)
    }

    fn build_prompt(
        &self,
        state: &ConversationState,
        memory: &ConversationMemory,
        intent: Intent,
        focus: Option<&str>,
    ) -> String {
        let domain = classify_domain(&state.user_query);

        let mut gaps: Vec<(&String, f64)> = state
            .information_gaps
            .iter()
            .map(|g| {
                let weight = category_for_gap(g)
                    .and_then(|c| state.priority_factors.get(c))
                    .copied()
                    .unwrap_or(0.5);
                (g, weight)
            })
            .collect();
        gaps.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let gap_list = gaps
            .iter()
            .take(5)
            .map(|(g, w)| format!("- {} (weight {:.2})", g, w))
            .collect::<Vec<_>>()
            .join("\n");

        let asked = state
            .question_history
            .iter()
            .map(|qa| format!("- {}", qa.question_text))
            .collect::<Vec<_>>()
            .join("\n");
        let asked_fingerprints = memory.asked_in_session(&state.session_id).join(", ");

        let style = state
            .metadata
            .get("communication_style")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            r#"You are a consultative research assistant choosing the single most valuable next clarifying question.

CONVERSATION:
{summary}

INTENT: {intent}
DOMAIN: {domain}
MODE: {mode}
USER COMMUNICATION STYLE: {style}
CURRENT FOCUS: {focus}

OPEN INFORMATION GAPS (highest weight first):
{gaps}

ALREADY ASKED (do not repeat or rephrase any of these):
{asked}
Fingerprints: [{fingerprints}]

Respond with exactly one JSON object:
{{
  "text": "the question to ask",
  "type": "open_ended|clarification|priority|constraint|preference|validation|follow_up",
  "category": "short descriptive tag for what this question gathers",
  "priority": 0.0,
  "rationale": "why this question now"
}}"#,
            summary = state.summary(),
            intent = intent,
            domain = domain,
            mode = state.conversation_mode,
            style = style,
            focus = focus.unwrap_or("understanding their situation"),
            gaps = if gap_list.is_empty() {
                "- none recorded yet".to_string()
            } else {
                gap_list
            },
            asked = if asked.is_empty() { "- none".to_string() } else { asked },
            fingerprints = asked_fingerprints,
        )
    }

    fn parse_proposal(&self, text: &str) -> Option<QuestionProposal> {
        let value = parse_json_lenient(text)?;
        let question_text = value.get("text")?.as_str()?.trim().to_string();
        if question_text.is_empty() {
            return None;
        }

        Some(QuestionProposal {
            text: question_text,
            question_type: QuestionType::parse(value.get("type").and_then(|v| v.as_str()).unwrap_or("open_ended")),
            category: value
                .get("category")
                .and_then(|v| v.as_str())
                .unwrap_or("general")
                .to_string(),
            priority: clamp_score(value.get("priority").and_then(|v| v.as_f64()).unwrap_or(0.5)),
            rationale: value
                .get("rationale")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }

    fn validate(
        &self,
        state: &ConversationState,
        memory: &ConversationMemory,
        proposal: QuestionProposal,
    ) -> Option<QuestionProposal> {
        if proposal.text.trim().is_empty() {
            return None;
        }
        if proposal.priority < self.settings.relevance_threshold {
            debug!(
                question = %proposal.text,
                priority = proposal.priority,
                "Rejected low-relevance LLM question"
            );
            return None;
        }
        if self.settings.duplicate_detection
            && memory.is_duplicate(
                &state.session_id,
                &proposal.text,
                self.settings.similarity_threshold,
            )
        {
            debug!(question = %proposal.text, "Rejected duplicate LLM question");
            return None;
        }
        Some(proposal)
    }

    /// Deterministic template selection keyed by intent and the
    /// highest-priority unmet gap. Never introduces fresh duplicates.
    fn template_fallback(
        &self,
        state: &ConversationState,
        memory: &ConversationMemory,
        intent: Intent,
    ) -> Option<QuestionProposal> {
        let templates = templates_for(intent);

        // Find the category addressing the weightiest open gap
        let target_category = state
            .information_gaps
            .iter()
            .filter_map(|g| category_for_gap(g).map(|c| (c, g)))
            .map(|(c, g)| {
                let weight = state.priority_factors.get(c).copied().unwrap_or(0.5);
                (c, weight, g)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(c, _, _)| c);

        // Try the gap-matching template first, then the rest in order
        let mut ordered: Vec<(usize, &Template)> = templates
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let matches_gap = Some(t.1) == target_category;
                (if matches_gap { 0 } else { i + 1 }, t)
            })
            .collect();
        ordered.sort_by_key(|&(rank, _)| rank);

        for (_, &(text, category, question_type, priority)) in ordered {
            if state.user_profile.contains_key(category) {
                continue;
            }
            if memory.is_duplicate(&state.session_id, text, self.settings.similarity_threshold) {
                continue;
            }
            return Some(QuestionProposal {
                text: text.to_string(),
                question_type,
                category: category.to_string(),
                priority,
                rationale: Some(format!("template fallback for {} intent", intent)),
            });
        }

        // Last resort: generic templates not yet asked
        for &(text, category, question_type, priority) in templates_for(Intent::General) {
            if memory.is_duplicate(&state.session_id, text, self.settings.similarity_threshold) {
                continue;
            }
            if state.user_profile.contains_key(category) {
                continue;
            }
            return Some(QuestionProposal {
                text: text.to_string(),
                question_type,
                category: category.to_string(),
                priority,
                rationale: Some("generic template fallback".to_string()),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use counsel_llm::{LlmError, LlmResponse, LlmResult};

    const SESSION: &str = "DRA_20250301_120000_000001";

    fn state(query: &str) -> ConversationState {
        ConversationState::new(SESSION, query).unwrap()
    }

    fn generator() -> QuestionGenerator {
        QuestionGenerator::rule_based(QuestionGenerationSettings::default())
    }

    #[tokio::test]
    async fn purchase_intent_leads_with_budget_template() {
        let state = state("need cheap laptop by tomorrow");
        let memory = ConversationMemory::new();
        let proposal = generator().next_question(&state, &memory, None).await.unwrap();
        assert_eq!(proposal.category, "budget");
        assert!(proposal.priority >= 0.8);
    }

    #[tokio::test]
    async fn gap_weights_steer_template_choice() {
        let mut state = state("need cheap laptop by tomorrow");
        state.set_priority("timeline", 0.95);
        state.set_priority("budget", 0.4);
        state.add_gap("no concrete timeline details");
        state.add_gap("no concrete budget details");
        let memory = ConversationMemory::new();
        let proposal = generator().next_question(&state, &memory, None).await.unwrap();
        assert_eq!(proposal.category, "timeline");
    }

    #[tokio::test]
    async fn repeated_generation_never_duplicates() {
        let state = state("need cheap laptop by tomorrow");
        let mut memory = ConversationMemory::new();
        let generator = generator();

        let mut seen = std::collections::BTreeSet::new();
        loop {
            match generator.next_question(&state, &memory, None).await {
                Some(proposal) => {
                    let fp = memory.track_asked(&proposal.text, SESSION);
                    assert!(seen.insert(fp), "duplicate question: {}", proposal.text);
                }
                None => break,
            }
            assert!(seen.len() < 32, "generator failed to exhaust");
        }
        assert!(seen.len() >= 3);
    }

    #[tokio::test]
    async fn covered_categories_are_skipped() {
        let mut state = state("need cheap laptop by tomorrow");
        state.update_profile("budget", "about $700".into());
        let memory = ConversationMemory::new();
        let proposal = generator().next_question(&state, &memory, None).await.unwrap();
        assert_ne!(proposal.category, "budget");
    }

    struct ScriptedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, _prompt: &str, _options: &LlmOptions) -> LlmResult<LlmResponse> {
            Ok(LlmResponse::text(self.reply.clone()))
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn generate(&self, _prompt: &str, _options: &LlmOptions) -> LlmResult<LlmResponse> {
            Err(LlmError::Timeout { elapsed_ms: 10_000 })
        }
    }

    fn fast_retry() -> LlmRetryPolicy {
        LlmRetryPolicy {
            max_retries: 2,
            retry_delay: 0.001,
            rate_limit_delay: 0.001,
            backoff_base: 2.0,
        }
    }

    #[tokio::test]
    async fn llm_question_is_parsed_and_validated() {
        let llm = Arc::new(ScriptedLlm {
            reply: r#"{"text": "What's driving the tight deadline?", "type": "clarification",
                       "category": "timeline_pressure", "priority": 1.4, "rationale": "urgency detected"}"#
                .to_string(),
        });
        let generator = QuestionGenerator::new(
            Some(llm),
            fast_retry(),
            LlmOptions::default(),
            QuestionGenerationSettings::default(),
        );
        let state = state("need cheap laptop by tomorrow");
        let memory = ConversationMemory::new();

        let proposal = generator.next_question(&state, &memory, None).await.unwrap();
        assert_eq!(proposal.text, "What's driving the tight deadline?");
        assert_eq!(proposal.category, "timeline_pressure");
        assert_eq!(proposal.question_type, QuestionType::Clarification);
        // Out-of-range priority is clamped
        assert_eq!(proposal.priority, 1.0);
    }

    #[tokio::test]
    async fn llm_duplicate_falls_back_to_templates() {
        let llm = Arc::new(ScriptedLlm {
            reply: r#"{"text": "What's your budget range for this?", "type": "constraint",
                       "category": "budget", "priority": 0.9}"#
                .to_string(),
        });
        let generator = QuestionGenerator::new(
            Some(llm),
            fast_retry(),
            LlmOptions::default(),
            QuestionGenerationSettings::default(),
        );
        let state = state("need cheap laptop by tomorrow");
        let mut memory = ConversationMemory::new();
        memory.track_asked("What's your budget range for this?", SESSION);

        let proposal = generator.next_question(&state, &memory, None).await.unwrap();
        assert_ne!(proposal.text, "What's your budget range for this?");
    }

    #[tokio::test]
    async fn llm_outage_uses_templates() {
        let generator = QuestionGenerator::new(
            Some(Arc::new(FailingLlm)),
            fast_retry(),
            LlmOptions::default(),
            QuestionGenerationSettings::default(),
        );
        let state = state("need cheap laptop by tomorrow");
        let memory = ConversationMemory::new();

        let proposal = generator.next_question(&state, &memory, None).await.unwrap();
        assert!(proposal
            .rationale
            .as_deref()
            .unwrap()
            .contains("template fallback"));
    }
}
