//! Types for the LLM client boundary

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

/// Per-call generation options
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-call deadline; the client returns `LlmError::Timeout` when exceeded
    pub deadline: Option<Duration>,
    /// Ask the provider to ground the response in web search results
    pub enable_grounding: bool,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: None,
            max_tokens: Some(2000),
            deadline: Some(Duration::from_secs(10)),
            enable_grounding: false,
        }
    }
}

/// Result of a generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub grounding: Option<GroundingMetadata>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding: None,
        }
    }
}

/// Web-grounding metadata attached by the provider, when available
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingMetadata {
    pub sources: Vec<GroundingSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingSource {
    pub url: String,
    pub title: Option<String>,
}

/// Typed failure modes for LLM calls.
///
/// These are values, not control flow: callers decide between retry and
/// fallback based on the variant.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("LLM call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("LLM rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("LLM returned an invalid response: {reason}")]
    InvalidResponse { reason: String },

    #[error("LLM transport error: {message}")]
    Transport { message: String },
}

impl LlmError {
    /// Transient errors are worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout { .. } | LlmError::RateLimit { .. } | LlmError::Transport { .. }
        )
    }
}
