//! Types for the research pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Names of the six fixed stages, in execution order
pub const STAGE_NAMES: [&str; 6] = [
    "Information Gathering",
    "Validation & Fact-Checking",
    "Clarification & Follow-up",
    "Comparative Analysis",
    "Synthesis & Integration",
    "Final Conclusions",
];

/// Outcome status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Structured findings parsed cleanly
    Ok,
    /// Findings parsed but with missing sections defaulted
    Partial,
    /// Stage could not produce findings; stub content substituted
    Fallback,
}

/// A single piece of evidence reported by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub reliability: f64,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub relevance: f64,
}

/// Structured findings common to every stage.
///
/// Stage-specific sections (validated facts, option matrices, risk
/// assessments, ...) are preserved in `extras` for the report renderer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Findings {
    pub summary: String,
    pub evidence: Vec<Evidence>,
    pub gaps_identified: Vec<String>,
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

/// Result of one research stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// 1-based stage index
    pub stage_index: usize,
    pub stage_name: String,
    pub findings: Findings,
    pub status: StageStatus,
    pub error_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    /// Stub result emitted when a stage cannot run or fails terminally
    pub fn fallback(stage_index: usize, reason: &str) -> Self {
        let now = Utc::now();
        Self {
            stage_index,
            stage_name: STAGE_NAMES[stage_index - 1].to_string(),
            findings: Findings {
                summary: format!(
                    "{} could not be completed; research continues with reduced confidence",
                    STAGE_NAMES[stage_index - 1]
                ),
                evidence: Vec::new(),
                gaps_identified: vec![format!("stage {} unavailable: {}", stage_index, reason)],
                extras: BTreeMap::new(),
            },
            status: StageStatus::Fallback,
            error_reason: Some(reason.to_string()),
            started_at: now,
            completed_at: now,
        }
    }
}

/// Accumulated structured knowledge across stages
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub entities: Vec<String>,
    pub relationships: Vec<String>,
    pub key_facts: Vec<String>,
}

/// The frozen output of the research pipeline for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchBundle {
    pub session_id: String,
    pub query: String,
    pub stages: Vec<StageResult>,
    pub knowledge_base: KnowledgeBase,
    pub final_conclusions: Findings,
    pub confidence_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_result_names_the_stage() {
        let result = StageResult::fallback(3, "cancelled");
        assert_eq!(result.stage_index, 3);
        assert_eq!(result.status, StageStatus::Fallback);
        assert_eq!(
            result.findings.gaps_identified,
            vec!["stage 3 unavailable: cancelled".to_string()]
        );
        assert!(result.completed_at >= result.started_at);
    }
}
