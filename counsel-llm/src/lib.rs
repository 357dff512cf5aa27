//! LLM client integration for Counsel
//!
//! Defines the narrow client interface the core consumes — a single
//! `generate` operation with typed transient failures — together with a
//! siumai-backed provider implementation, a retrying wrapper that honors
//! the `ai.*` settings, and helpers for digging JSON out of model output.

pub mod client;
pub mod json;
pub mod retry;
pub mod types;

pub use client::{create_provider_client, LlmClient, SiumaiClient};
pub use json::{extract_json_array, extract_json_object, parse_json_lenient};
pub use retry::{generate_with_retry, LlmRetryPolicy};
pub use types::{GroundingMetadata, GroundingSource, LlmError, LlmOptions, LlmResponse, LlmResult};
