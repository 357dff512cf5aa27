//! Six-stage research pipeline execution
//!
//! Stages run strictly in order; each consumes the structured findings of
//! the stages before it. Transient LLM failures are retried with
//! exponential backoff, parse failures get one silent retry, and exhausted
//! stages degrade to `Fallback` results so later stages and the final
//! bundle are always produced. Cancellation marks the remaining stages as
//! fallback and returns the partial bundle.

use crate::prompts;
use crate::types::{
    Evidence, Findings, KnowledgeBase, ResearchBundle, StageResult, StageStatus, STAGE_NAMES,
};
use chrono::Utc;
use counsel_core::{
    clamp_score, CancelToken, CounselSettings, RateLimiter, ResearchContext, ResearchSettings,
    UiBridge,
};
use counsel_llm::{generate_with_retry, parse_json_lenient, LlmClient, LlmOptions, LlmRetryPolicy};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Sequential six-stage research engine
pub struct ResearchPipeline {
    llm: Option<Arc<dyn LlmClient>>,
    retry: LlmRetryPolicy,
    options: LlmOptions,
    research: ResearchSettings,
    limiter: RateLimiter,
}

impl ResearchPipeline {
    pub fn new(settings: &CounselSettings, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let retry = LlmRetryPolicy::from(&settings.ai);
        let options = LlmOptions {
            temperature: 0.7,
            top_p: None,
            max_tokens: Some(4000),
            deadline: Some(Duration::from_secs(settings.ai.response_timeout)),
            enable_grounding: settings.ai.enable_grounding,
        };
        let limiter = RateLimiter::new(1, (settings.ai.rate_limit_delay * 1000.0) as u64);

        Self {
            llm,
            retry,
            options,
            research: settings.research.clone(),
            limiter,
        }
    }

    /// Run all six stages and return the bundle; never fails.
    pub async fn run(
        &self,
        ctx: &ResearchContext,
        ui: Option<&dyn UiBridge>,
        cancel: &CancelToken,
    ) -> ResearchBundle {
        info!(session = %ctx.session_id, query = %ctx.user_query, "Starting six-stage research");

        let mut stages: Vec<StageResult> = Vec::with_capacity(6);
        let mut carried_gaps: Vec<String> = ctx
            .information_gaps
            .iter()
            .take(self.research.max_gaps_per_stage)
            .cloned()
            .collect();

        for stage_index in 1..=6 {
            let stage_name = STAGE_NAMES[stage_index - 1];
            if let Some(ui) = ui {
                ui.report_progress(stage_index, stage_name, (stage_index - 1) as f64 / 6.0);
            }

            let result = if cancel.is_cancelled() {
                StageResult::fallback(stage_index, "cancelled")
            } else {
                self.execute_stage(stage_index, ctx, &stages, &carried_gaps, cancel)
                    .await
            };

            if result.status == StageStatus::Fallback {
                warn!(
                    stage = stage_index,
                    reason = result.error_reason.as_deref().unwrap_or("unknown"),
                    "Stage degraded to fallback"
                );
            } else {
                info!(stage = stage_index, name = stage_name, "Stage completed");
            }

            for gap in &result.findings.gaps_identified {
                if carried_gaps.len() >= self.research.max_gaps_per_stage {
                    break;
                }
                if !carried_gaps.contains(gap) {
                    carried_gaps.push(gap.clone());
                }
            }

            stages.push(result);
        }

        if let Some(ui) = ui {
            ui.report_progress(6, STAGE_NAMES[5], 1.0);
        }

        let knowledge_base = Self::accumulate_knowledge(&stages);
        let final_conclusions = stages
            .last()
            .map(|s| s.findings.clone())
            .unwrap_or_default();
        let confidence_score = self.confidence(&stages, ctx.completion_confidence);

        info!(
            session = %ctx.session_id,
            confidence = confidence_score,
            "Research pipeline finished"
        );

        ResearchBundle {
            session_id: ctx.session_id.clone(),
            query: ctx.user_query.clone(),
            stages,
            knowledge_base,
            final_conclusions,
            confidence_score,
        }
    }

    async fn execute_stage(
        &self,
        stage_index: usize,
        ctx: &ResearchContext,
        prior: &[StageResult],
        carried_gaps: &[String],
        cancel: &CancelToken,
    ) -> StageResult {
        let started_at = Utc::now();

        let Some(llm) = &self.llm else {
            return StageResult::fallback(stage_index, "llm unavailable");
        };

        // Fallback stages contribute nothing downstream
        let usable: Vec<&Findings> = prior
            .iter()
            .filter(|s| s.status != StageStatus::Fallback)
            .map(|s| &s.findings)
            .collect();

        let prompt = match stage_index {
            1 => prompts::stage_1(ctx),
            2 => prompts::stage_2(ctx, usable.last().copied()),
            3 => prompts::stage_3(ctx, carried_gaps),
            4 => prompts::stage_4(ctx, &usable),
            5 => prompts::stage_5(ctx, &usable),
            _ => prompts::stage_6(ctx, &usable),
        };

        // Parse failures get one silent re-generation before falling back
        for attempt in 0..2 {
            let response = match generate_with_retry(
                llm.as_ref(),
                &prompt,
                &self.options,
                &self.retry,
                Some(&self.limiter),
            )
            .await
            {
                Ok(response) => response,
                Err(e) => {
                    return StageResult::fallback(stage_index, &e.to_string());
                }
            };

            if cancel.is_cancelled() {
                return StageResult::fallback(stage_index, "cancelled");
            }

            if let Some((findings, status)) = Self::parse_findings(&response.text) {
                return StageResult {
                    stage_index,
                    stage_name: STAGE_NAMES[stage_index - 1].to_string(),
                    findings,
                    status,
                    error_reason: None,
                    started_at,
                    completed_at: Utc::now(),
                };
            }

            if attempt == 0 {
                warn!(stage = stage_index, "Unparseable stage response, retrying once");
            }
        }

        StageResult::fallback(stage_index, "unparseable response")
    }

    /// Parse a stage response into findings.
    ///
    /// Always yields the common `{summary, evidence, gaps_identified}`
    /// shape; other keys are kept in `extras`. Missing sections default and
    /// demote the stage to `Partial`.
    fn parse_findings(text: &str) -> Option<(Findings, StageStatus)> {
        let value = parse_json_lenient(text)?;
        let object = value.as_object()?;

        let mut status = StageStatus::Ok;

        let summary = match object.get("summary").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                status = StageStatus::Partial;
                "No summary provided".to_string()
            }
        };

        let evidence = object
            .get("evidence")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let mut e: Evidence = serde_json::from_value(item.clone()).ok()?;
                        e.reliability = clamp_score(e.reliability);
                        e.relevance = clamp_score(e.relevance);
                        Some(e)
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let gaps_identified = object
            .get("gaps_identified")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let extras: BTreeMap<String, serde_json::Value> = object
            .iter()
            .filter(|(key, _)| {
                !matches!(key.as_str(), "summary" | "evidence" | "gaps_identified")
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some((
            Findings {
                summary,
                evidence,
                gaps_identified,
                extras,
            },
            status,
        ))
    }

    fn accumulate_knowledge(stages: &[StageResult]) -> KnowledgeBase {
        let mut kb = KnowledgeBase::default();
        for stage in stages {
            for (key, target) in [
                ("key_facts", &mut kb.key_facts as &mut Vec<String>),
                ("entities", &mut kb.entities),
                ("relationships", &mut kb.relationships),
            ] {
                if let Some(items) = stage.findings.extras.get(key).and_then(|v| v.as_array()) {
                    for item in items.iter().filter_map(|v| v.as_str()) {
                        if !target.iter().any(|existing| existing == item) {
                            target.push(item.to_string());
                        }
                    }
                }
            }
        }
        kb
    }

    /// Aggregate confidence: relevance-weighted evidence reliability,
    /// share of productive stages, and the dialogue's completion
    /// confidence, floored at the configured minimum. A run with no
    /// productive stage scores exactly the floor.
    fn confidence(&self, stages: &[StageResult], completion_confidence: f64) -> f64 {
        let floor = self.research.min_confidence_fallback;

        let productive = stages
            .iter()
            .filter(|s| s.status != StageStatus::Fallback)
            .count();
        if productive == 0 {
            return floor;
        }

        let ok_share = stages
            .iter()
            .map(|s| match s.status {
                StageStatus::Ok => 1.0,
                StageStatus::Partial => 0.5,
                StageStatus::Fallback => 0.0,
            })
            .sum::<f64>()
            / stages.len().max(1) as f64;

        let mut weighted_reliability = 0.0;
        let mut total_relevance = 0.0;
        for stage in stages {
            for evidence in &stage.findings.evidence {
                weighted_reliability += evidence.reliability * evidence.relevance;
                total_relevance += evidence.relevance;
            }
        }
        let evidence_score = if total_relevance > 0.0 {
            weighted_reliability / total_relevance
        } else {
            0.5
        };

        let score = 0.4 * evidence_score + 0.4 * ok_share + 0.2 * completion_confidence;
        clamp_score(score.clamp(floor, 1.0))
    }
}
