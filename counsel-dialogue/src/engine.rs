//! Personalization orchestrator
//!
//! Owns the ask → answer → analyze → assess cycle:
//!
//! `INIT` creates the session and picks a mode; `ASKING` obtains the next
//! question, delivers it across the UI boundary, and folds the answer into
//! state and memory; `ASSESSING` decides whether to continue; `FINALIZING`
//! freezes the state into a [`ResearchContext`]; `ABORTED` snapshots
//! partial state on cancellation or an unrecoverable UI error.
//!
//! Guarantees: the question budget of the active mode is never exceeded, no
//! question is asked twice, and `completion_confidence` is monotone across
//! turns except immediately after a mode switch down.

use crate::analyzer::{ContextAnalysis, ContextAnalyzer};
use crate::assessment::{CompletionAssessor, CompletionVerdict};
use crate::generator::{QuestionGenerator, QuestionProposal};
use crate::memory::ConversationMemory;
use crate::modes::ModeIntelligence;
use crate::state::{ConversationState, QuestionAnswer};
use counsel_core::{
    clamp_profile_value, generate_session_id, validate_query, CancelToken, ConversationMode,
    CounselError, CounselResult, CounselSettings, ResearchContext, SessionStore, UiBridge,
};
use counsel_llm::{LlmClient, LlmOptions, LlmRetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a completed (or aborted) clarification dialogue
#[derive(Debug, Clone)]
pub struct DialogueOutcome {
    pub state: ConversationState,
    pub context: ResearchContext,
    pub verdict: CompletionVerdict,
    pub aborted: bool,
}

/// Top-level dialogue orchestrator binding state, memory, analysis,
/// question generation, completion assessment, and mode intelligence.
pub struct PersonalizationEngine {
    settings: CounselSettings,
    analyzer: ContextAnalyzer,
    generator: QuestionGenerator,
    assessor: CompletionAssessor,
    mode_intel: ModeIntelligence,
    memory: ConversationMemory,
    store: Option<Arc<dyn SessionStore>>,
    cancel: CancelToken,
}

impl PersonalizationEngine {
    pub fn new(settings: CounselSettings, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let retry = LlmRetryPolicy::from(&settings.ai);
        let options = LlmOptions {
            temperature: settings.ai_question_generation.temperature as f32,
            top_p: Some(settings.ai_question_generation.top_p as f32),
            max_tokens: Some(settings.ai_question_generation.max_tokens),
            deadline: Some(Duration::from_secs(settings.ai.response_timeout)),
            enable_grounding: false,
        };

        let analyzer = ContextAnalyzer::new(
            llm.clone(),
            retry.clone(),
            options.clone(),
            settings.context_analysis.priority_analysis.clone(),
        );
        let generator = QuestionGenerator::new(
            llm.clone(),
            retry.clone(),
            options.clone(),
            settings.ai_question_generation.clone(),
        );
        let assessor = CompletionAssessor::new(llm, retry, options);
        let mode_intel =
            ModeIntelligence::new(settings.dynamic_personalization.conversation_modes.clone());

        Self {
            settings,
            analyzer,
            generator,
            assessor,
            mode_intel,
            memory: ConversationMemory::new(),
            store: None,
            cancel: CancelToken::new(),
        }
    }

    /// Attach an optional session store; snapshots are written on
    /// transitions and failures degrade to warnings.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Token that aborts the dialogue cooperatively when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Run the full clarification dialogue for one query.
    ///
    /// Fails with an `Input` error before any session is created when the
    /// query is invalid; `Assessment` errors abort with a partial snapshot
    /// already persisted.
    pub async fn run(
        &mut self,
        query: &str,
        ui: &dyn UiBridge,
        initial_mode: Option<ConversationMode>,
    ) -> CounselResult<DialogueOutcome> {
        // INIT
        let query = validate_query(query, &self.settings.validation)?;
        let session_id = generate_session_id();
        let mut state = ConversationState::new(session_id.clone(), &query)?;

        let mode = initial_mode.unwrap_or_else(|| self.mode_intel.select_initial_mode(&query));
        state.set_mode(mode);
        state
            .metadata
            .insert("initial_mode".to_string(), mode.to_string());

        info!(session = %session_id, mode = %mode, "Dialogue session started");
        self.persist(&state).await;

        let mut verdict = CompletionVerdict::Continue;

        if !self.settings.dynamic_personalization.enabled {
            // No clarification dialogue: assess the bare query and hand the
            // unenriched snapshot straight to research
            info!(session = %session_id, "Dynamic personalization disabled, skipping dialogue");
            verdict = self.assess_and_apply(&mut state, false).await?;
            return Ok(self.finalize(state, verdict).await);
        }

        // ASKING / ASSESSING loop
        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.aborted(state, verdict).await);
            }

            let mode_cfg = self.settings.mode_config(state.conversation_mode).clone();
            if state.question_history.len() >= mode_cfg.max_questions {
                verdict = self.assess_and_apply(&mut state, false).await?;
                break;
            }

            let Some(proposal) = self
                .generator
                .next_question(&state, &self.memory, None)
                .await
            else {
                debug!(session = %session_id, "No non-duplicate question remains");
                verdict = self.assess_and_apply(&mut state, false).await?;
                break;
            };

            let fingerprint = self.memory.track_asked(&proposal.text, &session_id);

            let answer = match ui.present_question(&proposal.to_prompt()).await {
                Ok(answer) => answer,
                Err(CounselError::Cancelled { .. }) => {
                    info!(session = %session_id, "User cancelled during question");
                    return Ok(self.aborted(state, verdict).await);
                }
                Err(e) => {
                    warn!(session = %session_id, error = %e, "UI failure, aborting dialogue");
                    return Ok(self.aborted(state, verdict).await);
                }
            };

            let answer = counsel_core::clamp_text(&answer, &self.settings.validation);
            self.record_turn(&mut state, &proposal, &fingerprint, &answer)
                .await;

            let analysis = self.analyzer.analyze(&state, &self.memory).await;
            Self::apply_analysis(&mut state, &analysis, &self.settings);

            // Mode switch is considered from turn two onward
            let mut switched_down = false;
            if state.question_history.len() >= 2 {
                let metrics = ModeIntelligence::measure_engagement(&state);
                if let Some(new_mode) = self.mode_intel.evaluate_switch(&state, &metrics) {
                    switched_down = self.mode_intel.is_downgrade(state.conversation_mode, new_mode);
                    info!(
                        session = %session_id,
                        from = %state.conversation_mode,
                        to = %new_mode,
                        down = switched_down,
                        "Mode transition"
                    );
                    state.set_mode(new_mode);
                    state
                        .metadata
                        .insert("last_mode_switch".to_string(), new_mode.to_string());
                }

                // Consistently minimal answers: wrap up with what we have
                if metrics.dropout {
                    info!(session = %session_id, "Engagement dropout, ending dialogue");
                    verdict = self.assess_and_apply(&mut state, switched_down).await?;
                    break;
                }
            }

            verdict = self.assess_and_apply(&mut state, switched_down).await?;
            self.persist(&state).await;

            let mode_cfg = self.settings.mode_config(state.conversation_mode).clone();
            let asked = state.question_history.len();
            match verdict {
                CompletionVerdict::Continue => {
                    if asked >= mode_cfg.max_questions {
                        break;
                    }
                }
                CompletionVerdict::Sufficient => {
                    // A sufficient verdict only finalizes once the mode's
                    // minimum has been asked
                    if asked >= mode_cfg.min_questions {
                        break;
                    }
                }
                CompletionVerdict::MinimalSufficient => break,
            }
        }

        // FINALIZING
        Ok(self.finalize(state, verdict).await)
    }

    async fn finalize(
        &self,
        mut state: ConversationState,
        verdict: CompletionVerdict,
    ) -> DialogueOutcome {
        state
            .metadata
            .insert("finalized".to_string(), "true".to_string());
        self.persist(&state).await;

        let context = state.snapshot();
        info!(
            session = %state.session_id,
            questions = state.question_history.len(),
            confidence = state.completion_confidence,
            verdict = %verdict,
            "Dialogue finalized"
        );

        DialogueOutcome {
            state,
            context,
            verdict,
            aborted: false,
        }
    }

    async fn record_turn(
        &mut self,
        state: &mut ConversationState,
        proposal: &QuestionProposal,
        fingerprint: &str,
        answer: &str,
    ) {
        let mut qa = QuestionAnswer::new(
            &proposal.text,
            answer,
            proposal.question_type,
            &proposal.category,
            proposal.priority,
        );
        qa.follow_up_hint = proposal.rationale.clone();
        state.add_qa(qa);

        let effectiveness = self
            .memory
            .record_answer(&state.session_id, fingerprint, answer);
        state.set_confidence(&proposal.category, effectiveness);

        if !answer.trim().is_empty() {
            let value = clamp_profile_value(answer, &self.settings.validation);
            state.update_profile(&proposal.category, value.into());
        }
    }

    fn apply_analysis(
        state: &mut ConversationState,
        analysis: &ContextAnalysis,
        settings: &CounselSettings,
    ) {
        for (factor, insight) in &analysis.priorities {
            state.set_priority(factor, insight.weight);
        }
        for (dimension, signal) in &analysis.emotional_indicators {
            state.merge_emotion(dimension, signal.clone());
        }

        // Gaps are recomputed each turn; replace rather than accumulate so
        // filled gaps stop penalizing completion
        state.information_gaps.clear();
        let cap = settings.research.max_gaps_per_stage;
        for gap in analysis.information_gaps.iter().take(cap) {
            state.add_gap(gap);
        }

        state.metadata.insert(
            "communication_style".to_string(),
            analysis.communication_style.to_string(),
        );
        state.context_understanding.technical_level = analysis.technical_expertise.to_string();
        state.context_understanding.decision_complexity =
            counsel_core::clamp_score(analysis.priorities.len() as f64 / 7.0);
    }

    async fn assess_and_apply(
        &self,
        state: &mut ConversationState,
        switched_down: bool,
    ) -> CounselResult<CompletionVerdict> {
        let mode_cfg = self.settings.mode_config(state.conversation_mode);
        let result = match self.assessor.assess(state, mode_cfg).await {
            Ok(result) => result,
            Err(e) => {
                // Invariant violation: persist the partial snapshot, then abort
                self.persist(state).await;
                return Err(e);
            }
        };

        // Monotone unless this turn switched the mode down
        let applied = if switched_down {
            result.confidence
        } else {
            state.completion_confidence.max(result.confidence)
        };
        state.set_completion_confidence(applied);
        state.next_question_suggestions = result.open_gaps.clone();

        Ok(result.verdict)
    }

    async fn aborted(&self, mut state: ConversationState, verdict: CompletionVerdict) -> DialogueOutcome {
        state
            .metadata
            .insert("aborted".to_string(), "true".to_string());
        self.persist(&state).await;
        let context = state.snapshot();
        DialogueOutcome {
            state,
            context,
            verdict,
            aborted: true,
        }
    }

    async fn persist(&self, state: &ConversationState) {
        if let Some(store) = &self.store {
            match serde_json::to_value(state) {
                Ok(snapshot) => {
                    if let Err(e) = store.save(&state.session_id, &snapshot).await {
                        warn!(session = %state.session_id, error = %e, "Session persistence failed");
                    }
                }
                Err(e) => {
                    warn!(session = %state.session_id, error = %e, "Session serialization failed");
                }
            }
        }
    }
}
