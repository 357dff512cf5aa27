//! Conversation memory
//!
//! Forward-only registry of asked questions and their effectiveness.
//! Deduplicates questions by normalized-text fingerprint plus token Jaccard
//! similarity, scores answers for engagement / information gain / relevance,
//! and derives response-pattern signals used by the analyzer and mode
//! intelligence. Metrics reference sessions only by id — never by pointer.

use crate::intent::all_domain_terms;
use crate::state::ConversationState;
use async_trait::async_trait;
use counsel_core::{clamp_score, CounselError, CounselResult, ErrorContext};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stop words stripped before token comparison
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for", "from",
    "have", "how", "i", "in", "is", "it", "me", "my", "of", "on", "or", "so", "that", "the",
    "this", "to", "was", "we", "what", "when", "which", "will", "with", "would", "you", "your",
];

const UNCERTAINTY_MARKERS: &[&str] = &["maybe", "not sure", "i think", "perhaps", "probably"];

/// Lowercase, collapse whitespace, and strip trailing punctuation.
pub fn normalize_question(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['?', '.', '!'])
        .trim()
        .to_string()
}

/// Stable fingerprint of the normalized text (FNV-1a, hex encoded).
pub fn fingerprint(text: &str) -> String {
    let normalized = normalize_question(text);
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in normalized.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{:016x}", hash)
}

/// Lowercased alphanumeric tokens with stop words removed
pub fn content_tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Per-question effectiveness metrics, shared across sessions by fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionMetrics {
    pub question_fingerprint: String,
    pub times_asked: u32,
    pub average_response_length: f64,
    pub information_gain_estimate: f64,
    pub effectiveness_score: f64,
    pub last_session_id: String,
}

/// Aggregate response-pattern signals for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePattern {
    /// direct | detailed | questioning | uncertain
    pub communication_style: String,
    /// Question marks per answer
    pub question_asking_frequency: f64,
    /// Mean answer length in characters
    pub avg_response_length: f64,
    /// Share of answers carrying uncertainty markers
    pub uncertainty_ratio: f64,
    /// low | medium | high
    pub detail_preference: String,
}

/// Persistence interface for conversation memory snapshots
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn persist(&self, snapshot: &serde_json::Value) -> CounselResult<()>;
    async fn load(&self) -> CounselResult<Option<serde_json::Value>>;
}

/// File-backed memory store (single JSON snapshot)
#[derive(Debug, Clone)]
pub struct FileMemoryStore {
    path: PathBuf,
}

impl FileMemoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn persist(&self, snapshot: &serde_json::Value) -> CounselResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    async fn load(&self) -> CounselResult<Option<serde_json::Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Serializable snapshot of the memory registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemorySnapshot {
    asked: BTreeMap<String, BTreeSet<String>>,
    question_texts: BTreeMap<String, String>,
    metrics: BTreeMap<String, QuestionMetrics>,
}

/// Tracks asked questions, answer effectiveness, and response patterns.
///
/// Safe for a single writer; readers see a consistent view because all
/// mutation goes through the owning orchestrator.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    /// session_id -> fingerprints asked in that session
    asked: BTreeMap<String, BTreeSet<String>>,
    /// fingerprint -> normalized question text (for similarity checks)
    question_texts: BTreeMap<String, String>,
    /// fingerprint -> effectiveness metrics
    metrics: BTreeMap<String, QuestionMetrics>,
    /// session_id -> answers seen, for token-novelty scoring
    session_answers: BTreeMap<String, Vec<String>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question as asked; returns its fingerprint.
    pub fn track_asked(&mut self, question_text: &str, session_id: &str) -> String {
        let fp = fingerprint(question_text);
        self.asked
            .entry(session_id.to_string())
            .or_default()
            .insert(fp.clone());
        self.question_texts
            .insert(fp.clone(), normalize_question(question_text));

        let entry = self
            .metrics
            .entry(fp.clone())
            .or_insert_with(|| QuestionMetrics {
                question_fingerprint: fp.clone(),
                times_asked: 0,
                average_response_length: 0.0,
                information_gain_estimate: 0.0,
                effectiveness_score: 0.0,
                last_session_id: session_id.to_string(),
            });
        entry.times_asked += 1;
        entry.last_session_id = session_id.to_string();

        debug!(fingerprint = %fp, session = session_id, "Tracked asked question");
        fp
    }

    /// Whether a question duplicates one already asked in this session.
    ///
    /// Exact match on the normalized-text fingerprint, plus token Jaccard
    /// similarity above the threshold against every asked question.
    pub fn is_duplicate(&self, session_id: &str, question_text: &str, similarity_threshold: f64) -> bool {
        let Some(asked) = self.asked.get(session_id) else {
            return false;
        };

        let fp = fingerprint(question_text);
        if asked.contains(&fp) {
            return true;
        }

        let candidate_tokens = content_tokens(question_text);
        for existing_fp in asked {
            if let Some(existing_text) = self.question_texts.get(existing_fp) {
                let existing_tokens = content_tokens(existing_text);
                if jaccard(&candidate_tokens, &existing_tokens) > similarity_threshold {
                    return true;
                }
            }
        }

        false
    }

    /// Score an answer and update the question's metrics.
    ///
    /// Effectiveness blends engagement (answer length), information gain
    /// (token novelty against prior answers in the session), and relevance
    /// (domain-term hits) at 0.4 / 0.4 / 0.2.
    pub fn record_answer(&mut self, session_id: &str, question_fingerprint: &str, answer_text: &str) -> f64 {
        let answer_chars = answer_text.chars().count() as f64;
        let engagement = (answer_chars / 150.0).min(1.0);

        let tokens = content_tokens(answer_text);
        let prior_answers = self
            .session_answers
            .entry(session_id.to_string())
            .or_default();
        let information_gain = if tokens.is_empty() {
            0.0
        } else if prior_answers.is_empty() {
            1.0
        } else {
            let mut seen: BTreeSet<String> = BTreeSet::new();
            for prior in prior_answers.iter() {
                seen.extend(content_tokens(prior));
            }
            let novel = tokens.iter().filter(|t| !seen.contains(*t)).count();
            novel as f64 / tokens.len() as f64
        };

        let domain_terms = all_domain_terms();
        let domain_hits = tokens.iter().filter(|t| domain_terms.contains(t.as_str())).count();
        let relevance = (domain_hits as f64 / 3.0).min(1.0);

        let effectiveness =
            clamp_score(0.4 * engagement + 0.4 * information_gain + 0.2 * relevance);

        prior_answers.push(answer_text.to_string());

        if let Some(metrics) = self.metrics.get_mut(question_fingerprint) {
            let n = metrics.times_asked.max(1) as f64;
            metrics.average_response_length =
                clamp_running_mean(metrics.average_response_length, answer_chars, n);
            metrics.information_gain_estimate = clamp_score(information_gain);
            metrics.effectiveness_score =
                clamp_score(clamp_running_mean(metrics.effectiveness_score, effectiveness, n));
            metrics.last_session_id = session_id.to_string();
        }

        effectiveness
    }

    /// Derive aggregate response-pattern signals from the session's answers.
    pub fn derive_response_pattern(&self, state: &ConversationState) -> ResponsePattern {
        let answers: Vec<&str> = state
            .question_history
            .iter()
            .map(|qa| qa.answer_text.as_str())
            .collect();

        if answers.is_empty() {
            return ResponsePattern {
                communication_style: "direct".to_string(),
                question_asking_frequency: 0.0,
                avg_response_length: 0.0,
                uncertainty_ratio: 0.0,
                detail_preference: "medium".to_string(),
            };
        }

        let count = answers.len() as f64;
        let avg_response_length =
            answers.iter().map(|a| a.chars().count()).sum::<usize>() as f64 / count;
        let question_marks: usize = answers.iter().map(|a| a.matches('?').count()).sum();
        let question_asking_frequency = question_marks as f64 / count;
        let uncertain_answers = answers
            .iter()
            .filter(|a| {
                let lower = a.to_lowercase();
                UNCERTAINTY_MARKERS.iter().any(|m| lower.contains(m))
            })
            .count();
        let uncertainty_ratio = uncertain_answers as f64 / count;

        let communication_style = if question_asking_frequency > 0.25 {
            "questioning"
        } else if uncertainty_ratio > 0.3 {
            "uncertain"
        } else if avg_response_length > 120.0 {
            "detailed"
        } else {
            "direct"
        };

        let detail_preference = if avg_response_length > 120.0 {
            "high"
        } else if avg_response_length < 40.0 {
            "low"
        } else {
            "medium"
        };

        ResponsePattern {
            communication_style: communication_style.to_string(),
            question_asking_frequency,
            avg_response_length,
            uncertainty_ratio,
            detail_preference: detail_preference.to_string(),
        }
    }

    /// Back-fill metrics from answered turns already present in the state.
    pub fn sync_state(&mut self, state: &ConversationState) {
        for qa in &state.question_history {
            if qa.answer_text.is_empty() {
                continue;
            }
            let already_asked = self
                .asked
                .get(&state.session_id)
                .map(|set| set.contains(&qa.question_id))
                .unwrap_or(false);
            if !already_asked {
                let fp = self.track_asked(&qa.question_text, &state.session_id);
                self.record_answer(&state.session_id, &fp, &qa.answer_text);
            }
        }
    }

    /// Fingerprints asked in a session, for prompt construction.
    pub fn asked_in_session(&self, session_id: &str) -> Vec<String> {
        self.asked
            .get(session_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn metrics_for(&self, question_fingerprint: &str) -> Option<&QuestionMetrics> {
        self.metrics.get(question_fingerprint)
    }

    /// Persist the registry; failures degrade to in-memory operation.
    pub async fn persist(&self, store: &dyn MemoryStore) -> CounselResult<()> {
        let snapshot = MemorySnapshot {
            asked: self.asked.clone(),
            question_texts: self.question_texts.clone(),
            metrics: self.metrics.clone(),
        };
        let value = serde_json::to_value(&snapshot)?;
        if let Err(e) = store.persist(&value).await {
            warn!(error = %e, "Failed to persist conversation memory, continuing in-memory");
            return Err(e);
        }
        Ok(())
    }

    /// Load a previously persisted registry; failures leave memory empty.
    pub async fn load(&mut self, store: &dyn MemoryStore) -> CounselResult<()> {
        match store.load().await {
            Ok(Some(value)) => {
                let snapshot: MemorySnapshot =
                    serde_json::from_value(value).map_err(|e| CounselError::Storage {
                        message: format!("Corrupt memory snapshot: {}", e),
                        source: Some(Box::new(e)),
                        context: ErrorContext::new("conversation_memory").with_operation("load"),
                    })?;
                self.asked = snapshot.asked;
                self.question_texts = snapshot.question_texts;
                self.metrics = snapshot.metrics;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to load conversation memory, starting empty");
                Err(e)
            }
        }
    }
}

fn clamp_running_mean(current: f64, sample: f64, n: f64) -> f64 {
    if n <= 1.0 {
        sample
    } else {
        current + (sample - current) / n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{QuestionAnswer, QuestionType};

    const SESSION: &str = "DRA_20250301_120000_000001";

    #[test]
    fn fingerprint_is_stable_under_normalization() {
        assert_eq!(
            fingerprint("What's your budget range?"),
            fingerprint("  what's YOUR budget   range ")
        );
        assert_ne!(
            fingerprint("What's your budget range?"),
            fingerprint("What's your timeline?")
        );
    }

    #[test]
    fn exact_duplicates_are_detected() {
        let mut memory = ConversationMemory::new();
        memory.track_asked("What's your budget range?", SESSION);
        assert!(memory.is_duplicate(SESSION, "what's your budget range", 0.85));
        assert!(!memory.is_duplicate(SESSION, "When do you need this by?", 0.85));
        // Other sessions are unaffected
        assert!(!memory.is_duplicate("DRA_other", "What's your budget range?", 0.85));
    }

    #[test]
    fn near_duplicates_are_detected_by_token_overlap() {
        let mut memory = ConversationMemory::new();
        memory.track_asked("What is your total budget range for this purchase?", SESSION);
        assert!(memory.is_duplicate(
            SESSION,
            "What is your total budget range for the purchase?",
            0.6
        ));
    }

    #[test]
    fn effectiveness_blends_engagement_gain_and_relevance() {
        let mut memory = ConversationMemory::new();
        let fp = memory.track_asked("What will you use it for?", SESSION);

        // First answer: full novelty
        let first = memory.record_answer(
            SESSION,
            &fp,
            "I need a laptop with long battery life for software development on the road",
        );
        assert!(first > 0.5, "informative first answer scored {}", first);

        // Identical second answer: no novelty, lower effectiveness
        let fp2 = memory.track_asked("Anything else about usage?", SESSION);
        let second = memory.record_answer(
            SESSION,
            &fp2,
            "I need a laptop with long battery life for software development on the road",
        );
        assert!(second < first);

        let metrics = memory.metrics_for(&fp).unwrap();
        assert_eq!(metrics.times_asked, 1);
        assert!(metrics.average_response_length > 0.0);
    }

    #[test]
    fn short_answers_score_low() {
        let mut memory = ConversationMemory::new();
        let fp = memory.track_asked("What's your budget?", SESSION);
        let score = memory.record_answer(SESSION, &fp, "idk");
        assert!(score < 0.5);
    }

    #[test]
    fn response_pattern_styles() {
        let mut state = ConversationState::new(SESSION, "need a new laptop for work").unwrap();
        for answer in ["yes", "no", "fine"] {
            state.add_qa(QuestionAnswer::new(
                &format!("q {}?", answer),
                answer,
                QuestionType::OpenEnded,
                "context",
                0.5,
            ));
        }
        let memory = ConversationMemory::new();
        let pattern = memory.derive_response_pattern(&state);
        assert_eq!(pattern.communication_style, "direct");
        assert_eq!(pattern.detail_preference, "low");

        let mut uncertain = ConversationState::new(SESSION, "need a new laptop for work").unwrap();
        for (i, answer) in ["maybe something portable", "not sure about the budget yet"]
            .iter()
            .enumerate()
        {
            uncertain.add_qa(QuestionAnswer::new(
                &format!("question {}?", i),
                answer,
                QuestionType::OpenEnded,
                "context",
                0.5,
            ));
        }
        let pattern = memory.derive_response_pattern(&uncertain);
        assert_eq!(pattern.communication_style, "uncertain");
        assert!(pattern.uncertainty_ratio > 0.3);
    }

    #[test]
    fn sync_state_backfills_answered_turns() {
        let mut state = ConversationState::new(SESSION, "need a new laptop for work").unwrap();
        state.add_qa(QuestionAnswer::new(
            "What's your budget range?",
            "around eight hundred dollars for a laptop",
            QuestionType::Constraint,
            "budget",
            0.9,
        ));

        let mut memory = ConversationMemory::new();
        memory.sync_state(&state);

        assert!(memory.is_duplicate(SESSION, "What's your budget range?", 0.85));
        let fp = fingerprint("What's your budget range?");
        assert!(memory.metrics_for(&fp).unwrap().average_response_length > 0.0);

        // Re-syncing is idempotent
        memory.sync_state(&state);
        assert_eq!(memory.metrics_for(&fp).unwrap().times_asked, 1);
    }

    #[tokio::test]
    async fn persistence_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMemoryStore::new(dir.path().join("memory.json"));

        let mut memory = ConversationMemory::new();
        let fp = memory.track_asked("What's your budget range?", SESSION);
        memory.record_answer(SESSION, &fp, "around two thousand dollars");
        memory.persist(&store).await.unwrap();

        let mut restored = ConversationMemory::new();
        restored.load(&store).await.unwrap();
        assert!(restored.is_duplicate(SESSION, "What's your budget range?", 0.85));
        assert!(restored.metrics_for(&fp).is_some());
    }

    #[tokio::test]
    async fn missing_store_degrades_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMemoryStore::new(dir.path().join("nonexistent").join("memory.json"));
        let mut memory = ConversationMemory::new();
        // Empty load is fine
        assert!(memory.load(&store).await.is_ok());
        assert!(memory.asked_in_session(SESSION).is_empty());
    }
}
