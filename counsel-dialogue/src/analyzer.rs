//! Context analysis engine
//!
//! Extracts priorities, emotional indicators, communication style,
//! technical expertise, and information gaps from the user's answers.
//! Gap identification is AI-first with a rule-based fallback driven by the
//! detected priorities; the analyzer is a total function and never fails.

use crate::memory::{content_tokens, ConversationMemory};
use crate::state::{ConversationState, EmotionSignal};
use counsel_core::{clamp_score, PriorityWeights};
use counsel_llm::{generate_with_retry, parse_json_lenient, LlmClient, LlmOptions, LlmRetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// User communication style patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStyle {
    Analytical,
    Intuitive,
    Direct,
    Exploratory,
    Decisive,
    Uncertain,
}

impl std::fmt::Display for CommunicationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CommunicationStyle::Analytical => "analytical",
            CommunicationStyle::Intuitive => "intuitive",
            CommunicationStyle::Direct => "direct",
            CommunicationStyle::Exploratory => "exploratory",
            CommunicationStyle::Decisive => "decisive",
            CommunicationStyle::Uncertain => "uncertain",
        };
        write!(f, "{}", label)
    }
}

/// Technical expertise bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnicalExpertise {
    Novice,
    Intermediate,
    Expert,
}

impl std::fmt::Display for TechnicalExpertise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TechnicalExpertise::Novice => "novice",
            TechnicalExpertise::Intermediate => "intermediate",
            TechnicalExpertise::Expert => "expert",
        };
        write!(f, "{}", label)
    }
}

/// A detected priority with its evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityInsight {
    pub weight: f64,
    pub evidence_phrases: Vec<String>,
}

/// Complete result of one analysis pass
#[derive(Debug, Clone, PartialEq)]
pub struct ContextAnalysis {
    pub priorities: BTreeMap<String, PriorityInsight>,
    pub emotional_indicators: BTreeMap<String, EmotionSignal>,
    pub communication_style: CommunicationStyle,
    pub technical_expertise: TechnicalExpertise,
    pub information_gaps: Vec<String>,
    pub confidence: f64,
}

/// Phrase lists. Urgency deliberately includes both "tomorrow" and
/// "by tomorrow" so a hard next-day deadline counts twice.
const URGENCY_PHRASES: &[&str] = &[
    "asap", "urgent", "urgently", "immediately", "right away", "by tomorrow", "tomorrow",
    "by today", "today", "deadline", "quickly", "rush", "hurry", "emergency",
];
const ANXIETY_PHRASES: &[&str] = &[
    "worried", "concerned", "anxious", "nervous", "afraid", "scared", "hope this works",
    "don't want to mess",
];
const EXCITEMENT_PHRASES: &[&str] = &[
    "excited", "thrilled", "amazing", "fantastic", "can't wait", "love", "awesome",
];

const ANALYTICAL_TERMS: &[&str] = &["because", "analysis", "compare", "evaluate", "criteria", "therefore"];
const INTUITIVE_TERMS: &[&str] = &["feel", "sense", "intuition", "gut", "prefer"];
const UNCERTAINTY_TERMS: &[&str] = &["maybe", "perhaps", "not sure", "i think", "probably", "i guess"];
const TECHNICAL_TERMS: &[&str] = &[
    "api", "framework", "algorithm", "database", "protocol", "benchmark", "spec", "latency",
    "throughput", "architecture", "kernel", "compiler",
];
const NOVICE_PHRASES: &[&str] = &["beginner", "new to", "first time", "no experience", "never used"];
const EXPERT_PHRASES: &[&str] = &["expert", "professional", "years of experience", "engineer", "i work in"];

/// Keyword table for detectable priority factors. Budget, timeline,
/// quality, and convenience weights come from settings; the rest use the
/// base weights listed here.
struct FactorSpec {
    name: &'static str,
    keywords: &'static [&'static str],
    base_weight: f64,
}

const FACTOR_SPECS: &[FactorSpec] = &[
    FactorSpec {
        name: "budget",
        keywords: &["budget", "cost", "price", "expensive", "cheap", "affordable", "money", "value", "$"],
        base_weight: 0.8,
    },
    FactorSpec {
        name: "timeline",
        keywords: &["urgent", "asap", "quickly", "fast", "deadline", "timeline", "soon", "tomorrow", "today", "when"],
        base_weight: 0.9,
    },
    FactorSpec {
        name: "quality",
        keywords: &["quality", "best", "reliable", "durable", "premium", "professional", "robust", "solid"],
        base_weight: 0.7,
    },
    FactorSpec {
        name: "convenience",
        keywords: &["easy", "simple", "convenient", "user-friendly", "intuitive", "hassle"],
        base_weight: 0.6,
    },
    FactorSpec {
        name: "risk",
        keywords: &["safe", "secure", "proven", "risky", "warranty", "guarantee", "risk"],
        base_weight: 0.7,
    },
    FactorSpec {
        name: "social",
        keywords: &["family", "team", "friends", "colleagues", "household", "partner", "kids"],
        base_weight: 0.6,
    },
    FactorSpec {
        name: "learning",
        keywords: &["learn", "understand", "course", "skill", "practice", "improve"],
        base_weight: 0.7,
    },
];

/// Intelligent context analysis over the conversation so far
pub struct ContextAnalyzer {
    llm: Option<Arc<dyn LlmClient>>,
    retry: LlmRetryPolicy,
    options: LlmOptions,
    weights: PriorityWeights,
}

impl ContextAnalyzer {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        retry: LlmRetryPolicy,
        options: LlmOptions,
        weights: PriorityWeights,
    ) -> Self {
        Self {
            llm,
            retry,
            options,
            weights,
        }
    }

    /// Rule-based analyzer with no AI gap identification
    pub fn rule_based(weights: PriorityWeights) -> Self {
        Self::new(None, LlmRetryPolicy::default(), LlmOptions::default(), weights)
    }

    /// Analyze the conversation; total — always returns a result.
    pub async fn analyze(
        &self,
        state: &ConversationState,
        memory: &ConversationMemory,
    ) -> ContextAnalysis {
        let responses = Self::collect_responses(state);
        let combined = responses.join(" ").to_lowercase();

        let priorities = self.detect_priorities(&combined);
        let emotional_indicators = Self::detect_emotions(&combined);
        let pattern = memory.derive_response_pattern(state);
        let communication_style =
            Self::determine_style(&responses, &combined, pattern.question_asking_frequency);
        let technical_expertise = Self::determine_expertise(&combined);

        let (information_gaps, llm_failed) = self.identify_gaps(state, &priorities).await;

        let mut confidence = clamp_score(
            0.3 + 0.1 * priorities.len() as f64
                + 0.05 * state.question_history.len() as f64
                + if emotional_indicators.is_empty() { 0.0 } else { 0.1 },
        );
        if llm_failed {
            // Degraded analysis: keep going, lower the confidence
            confidence = clamp_score(confidence * 0.7);
        }

        debug!(
            session = %state.session_id,
            priorities = priorities.len(),
            gaps = information_gaps.len(),
            style = %communication_style,
            confidence,
            "Context analysis complete"
        );

        ContextAnalysis {
            priorities,
            emotional_indicators,
            communication_style,
            technical_expertise,
            information_gaps,
            confidence,
        }
    }

    fn collect_responses(state: &ConversationState) -> Vec<String> {
        let mut responses = vec![state.user_query.clone()];
        responses.extend(
            state
                .question_history
                .iter()
                .filter(|qa| !qa.answer_text.trim().is_empty())
                .map(|qa| qa.answer_text.clone()),
        );
        responses
    }

    fn setting_weight(&self, factor: &str, base: f64) -> f64 {
        match factor {
            "budget" => self.weights.budget_weight,
            "timeline" => self.weights.timeline_weight,
            "quality" => self.weights.quality_weight,
            "convenience" => self.weights.convenience_weight,
            _ => base,
        }
    }

    /// Weight combines keyword-hit density with the configured factor weight.
    fn detect_priorities(&self, text: &str) -> BTreeMap<String, PriorityInsight> {
        let mut priorities = BTreeMap::new();

        for spec in FACTOR_SPECS {
            let evidence: Vec<String> = spec
                .keywords
                .iter()
                .filter(|kw| text.contains(*kw))
                .map(|kw| kw.to_string())
                .collect();
            if evidence.is_empty() {
                continue;
            }

            let density = (evidence.len() as f64 * 0.5).min(1.0);
            let weight = clamp_score(
                self.setting_weight(spec.name, spec.base_weight) * (0.5 + 0.5 * density),
            );

            priorities.insert(
                spec.name.to_string(),
                PriorityInsight {
                    weight,
                    evidence_phrases: evidence,
                },
            );
        }

        priorities
    }

    /// Intensity per dimension: `min(1, hits * 0.3)` over the phrase lists.
    fn detect_emotions(text: &str) -> BTreeMap<String, EmotionSignal> {
        let mut indicators = BTreeMap::new();

        for (dimension, phrases) in [
            ("urgency", URGENCY_PHRASES),
            ("anxiety", ANXIETY_PHRASES),
            ("excitement", EXCITEMENT_PHRASES),
        ] {
            let matched: Vec<String> = phrases
                .iter()
                .filter(|p| text.contains(*p))
                .map(|p| p.to_string())
                .collect();
            if matched.is_empty() {
                continue;
            }
            indicators.insert(
                dimension.to_string(),
                EmotionSignal {
                    intensity: clamp_score(matched.len() as f64 * 0.3),
                    triggering_phrases: matched,
                },
            );
        }

        indicators
    }

    fn determine_style(
        responses: &[String],
        combined: &str,
        question_frequency: f64,
    ) -> CommunicationStyle {
        if responses.is_empty() {
            return CommunicationStyle::Uncertain;
        }

        let avg_chars =
            responses.iter().map(|r| r.chars().count()).sum::<usize>() as f64 / responses.len() as f64;
        let uncertainty_hits = UNCERTAINTY_TERMS.iter().filter(|t| combined.contains(*t)).count();
        let analytical_hits = ANALYTICAL_TERMS.iter().filter(|t| combined.contains(*t)).count();
        let intuitive_hits = INTUITIVE_TERMS.iter().filter(|t| combined.contains(*t)).count();

        if uncertainty_hits >= 2 {
            CommunicationStyle::Uncertain
        } else if question_frequency > 0.25 {
            CommunicationStyle::Exploratory
        } else if avg_chars > 120.0 && analytical_hits >= 1 {
            CommunicationStyle::Analytical
        } else if avg_chars < 40.0 {
            CommunicationStyle::Direct
        } else if intuitive_hits > analytical_hits {
            CommunicationStyle::Intuitive
        } else {
            CommunicationStyle::Decisive
        }
    }

    fn determine_expertise(combined: &str) -> TechnicalExpertise {
        if NOVICE_PHRASES.iter().any(|p| combined.contains(p)) {
            return TechnicalExpertise::Novice;
        }
        if EXPERT_PHRASES.iter().any(|p| combined.contains(p)) {
            return TechnicalExpertise::Expert;
        }

        let tokens = content_tokens(combined);
        let tech_hits = TECHNICAL_TERMS
            .iter()
            .filter(|t| tokens.contains(**t))
            .count();
        match tech_hits {
            0 => TechnicalExpertise::Novice,
            1..=3 => TechnicalExpertise::Intermediate,
            _ => TechnicalExpertise::Expert,
        }
    }

    /// AI-first gap identification; falls back to priority-driven gaps.
    ///
    /// Returns the gaps plus whether the LLM path failed (the caller
    /// attenuates confidence in that case).
    async fn identify_gaps(
        &self,
        state: &ConversationState,
        priorities: &BTreeMap<String, PriorityInsight>,
    ) -> (Vec<String>, bool) {
        if let Some(llm) = &self.llm {
            let prompt = self.gap_prompt(state, priorities);
            match generate_with_retry(llm.as_ref(), &prompt, &self.options, &self.retry, None).await
            {
                Ok(response) => {
                    if let Some(gaps) = Self::parse_gap_array(&response.text) {
                        return (gaps, false);
                    }
                    warn!("Gap identification response had no parseable JSON array, using rule-based gaps");
                    return (Self::rule_based_gaps(state, priorities), true);
                }
                Err(e) => {
                    warn!(error = %e, "AI gap identification failed, using rule-based gaps");
                    return (Self::rule_based_gaps(state, priorities), true);
                }
            }
        }

        (Self::rule_based_gaps(state, priorities), false)
    }

    fn gap_prompt(
        &self,
        state: &ConversationState,
        priorities: &BTreeMap<String, PriorityInsight>,
    ) -> String {
        let profile = serde_json::to_string(&state.user_profile).unwrap_or_else(|_| "{}".to_string());
        let priority_list = priorities
            .iter()
            .map(|(name, p)| format!("- {} (weight {:.2})", name, p.weight))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Analyze this research conversation and identify what key information is still missing.

CONVERSATION SO FAR:
{summary}

INFORMATION ALREADY GATHERED:
{profile}

DETECTED PRIORITIES:
{priorities}

Return only a JSON array of short missing-information descriptors (strings), specific to THIS
conversation — name what is actually unknown, not generic categories.

Example format: ["budget ceiling for the solar installation", "roof orientation and shading"]"#,
            summary = state.summary(),
            profile = profile,
            priorities = if priority_list.is_empty() {
                "- none detected yet".to_string()
            } else {
                priority_list
            },
        )
    }

    fn parse_gap_array(text: &str) -> Option<Vec<String>> {
        let value = parse_json_lenient(text)?;
        let array = value.as_array()?;
        let gaps: Vec<String> = array
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(6)
            .collect();
        if gaps.is_empty() {
            None
        } else {
            Some(gaps)
        }
    }

    /// Rule-based gaps: for each high-weight detected priority with no
    /// supporting profile evidence, emit a descriptor naming the factor and
    /// this conversation's query. Gap names follow the detected factors —
    /// there is no fixed taxonomy.
    fn rule_based_gaps(
        state: &ConversationState,
        priorities: &BTreeMap<String, PriorityInsight>,
    ) -> Vec<String> {
        let query_digest: String = state.user_query.chars().take(60).collect();
        let mut gaps = Vec::new();

        for (factor, insight) in priorities {
            if insight.weight < 0.5 {
                continue;
            }
            let covered = state.user_profile.iter().any(|(key, value)| {
                key.contains(factor.as_str())
                    || value
                        .as_search_text()
                        .to_lowercase()
                        .contains(factor.as_str())
            });
            if !covered {
                gaps.push(format!("no concrete {} details for \"{}\"", factor, query_digest));
            }
        }

        if gaps.is_empty() && state.user_profile.len() < 2 {
            gaps.push(format!("usage context for \"{}\" still unclear", query_digest));
        }

        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{QuestionAnswer, QuestionType};

    fn analyzer() -> ContextAnalyzer {
        ContextAnalyzer::rule_based(PriorityWeights::default())
    }

    fn state(query: &str) -> ConversationState {
        ConversationState::new("DRA_20250301_120000_000001", query).unwrap()
    }

    #[tokio::test]
    async fn urgent_purchase_query_scores_high_urgency() {
        let state = state("need cheap laptop by tomorrow");
        let analysis = analyzer().analyze(&state, &ConversationMemory::new()).await;

        let urgency = &analysis.emotional_indicators["urgency"];
        assert!(urgency.intensity >= 0.6, "urgency was {}", urgency.intensity);
        assert!(urgency.triggering_phrases.contains(&"tomorrow".to_string()));

        assert!(analysis.priorities.contains_key("budget"));
        assert!(analysis.priorities.contains_key("timeline"));
    }

    #[tokio::test]
    async fn priority_weights_scale_with_density() {
        let mut s = state("looking for the best quality option");
        s.add_qa(QuestionAnswer::new(
            "What matters most?",
            "It must be reliable and durable, premium quality if possible",
            QuestionType::Priority,
            "quality_expectations",
            0.8,
        ));
        let analysis = analyzer().analyze(&s, &ConversationMemory::new()).await;
        let quality = &analysis.priorities["quality"];
        assert!(quality.weight >= 0.5);
        assert!(quality.evidence_phrases.len() >= 2);
    }

    #[tokio::test]
    async fn rule_based_gaps_follow_detected_factors() {
        let state = state("need cheap laptop by tomorrow");
        let analysis = analyzer().analyze(&state, &ConversationMemory::new()).await;

        assert!(!analysis.information_gaps.is_empty());
        // Gaps reflect this conversation's detected factors, not a fixed list
        assert!(analysis
            .information_gaps
            .iter()
            .any(|g| g.contains("budget") || g.contains("timeline")));
        for gap in &analysis.information_gaps {
            assert!(gap.contains("need cheap laptop"), "gap not conversation-specific: {}", gap);
        }
    }

    #[tokio::test]
    async fn covered_factors_stop_producing_gaps() {
        let mut s = state("need cheap laptop by tomorrow");
        s.update_profile("budget", "under $800".into());
        s.update_profile("timeline", "need it before friday".into());
        let analysis = analyzer().analyze(&s, &ConversationMemory::new()).await;
        assert!(!analysis
            .information_gaps
            .iter()
            .any(|g| g.contains("no concrete budget")));
    }

    #[tokio::test]
    async fn style_detection_direct_vs_uncertain() {
        let mut direct = state("buy a standing desk");
        direct.add_qa(QuestionAnswer::new(
            "Budget?",
            "$500",
            QuestionType::OpenEnded,
            "budget",
            0.8,
        ));
        let analysis = analyzer().analyze(&direct, &ConversationMemory::new()).await;
        assert_eq!(analysis.communication_style, CommunicationStyle::Direct);

        let mut uncertain = state("buy a standing desk");
        uncertain.add_qa(QuestionAnswer::new(
            "Budget?",
            "maybe 500, not sure yet, i think it depends",
            QuestionType::OpenEnded,
            "budget",
            0.8,
        ));
        let analysis = analyzer().analyze(&uncertain, &ConversationMemory::new()).await;
        assert_eq!(analysis.communication_style, CommunicationStyle::Uncertain);
    }

    #[tokio::test]
    async fn expertise_detection() {
        let novice = state("i'm a beginner and want to learn photography");
        let analysis = analyzer().analyze(&novice, &ConversationMemory::new()).await;
        assert_eq!(analysis.technical_expertise, TechnicalExpertise::Novice);

        let expert = state("evaluating database architecture with latency and throughput benchmark criteria via the api");
        let analysis = analyzer().analyze(&expert, &ConversationMemory::new()).await;
        assert_eq!(analysis.technical_expertise, TechnicalExpertise::Expert);
    }
}
