//! Boundary trait definitions
//!
//! Interfaces the core expects external collaborators to implement: the UI
//! sink/source pair and optional session persistence.

use crate::error::CounselResult;
use crate::types::QuestionPrompt;
use async_trait::async_trait;

/// UI boundary the orchestrator talks to.
///
/// `present_question` blocks until the user answers; it fails with
/// `CounselError::Cancelled` when the user aborts the dialogue.
/// `report_progress` is advisory and must not fail.
#[async_trait]
pub trait UiBridge: Send + Sync {
    /// Deliver a question to the user and await their answer text
    async fn present_question(&self, question: &QuestionPrompt) -> CounselResult<String>;

    /// Advisory progress update; six research stages in total
    fn report_progress(&self, stage_index: usize, stage_name: &str, percent: f64);
}

/// Optional session persistence consumed at orchestrator transitions.
///
/// Snapshots are the canonical JSON serialization of the conversation state.
/// Directory layout and file permissions are the implementer's concern.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session_id: &str, snapshot: &serde_json::Value) -> CounselResult<()>;

    async fn load(&self, session_id: &str) -> CounselResult<Option<serde_json::Value>>;
}
