//! Provider client built on siumai
//!
//! Adapts the unified siumai chat interface to the single-operation
//! `LlmClient` trait the rest of the workspace consumes.

use crate::types::{LlmError, LlmOptions, LlmResponse, LlmResult};
use async_trait::async_trait;
use counsel_core::AiSettings;
use siumai::prelude::*;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info};

/// The one operation the core needs from a language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, options: &LlmOptions) -> LlmResult<LlmResponse>;
}

/// Unified provider client backed by siumai
pub struct SiumaiClient {
    client: Box<dyn siumai::prelude::LlmClient>,
    provider: String,
    model: String,
}

impl SiumaiClient {
    /// Create a new client for the configured provider
    pub async fn new(settings: &AiSettings) -> LlmResult<Self> {
        let client = Self::build_client(settings).await?;

        info!(
            "Created LLM client for provider: {} with model: {}",
            settings.provider, settings.model
        );

        Ok(Self {
            client,
            provider: settings.provider.clone(),
            model: settings.model.clone(),
        })
    }

    /// Build the appropriate siumai client based on configuration
    async fn build_client(
        settings: &AiSettings,
    ) -> LlmResult<Box<dyn siumai::prelude::LlmClient>> {
        match settings.provider.as_str() {
            "openai" => {
                let api_key = settings
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .ok_or_else(|| LlmError::Transport {
                        message: "OpenAI API key not found".to_string(),
                    })?;

                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&settings.model)
                    .temperature(settings.temperature as f32)
                    .max_tokens(settings.max_tokens);

                if let Some(base_url) = &settings.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder.build().await.map_err(|e| LlmError::Transport {
                    message: format!("Failed to build OpenAI client: {}", e),
                })?;

                Ok(Box::new(client))
            }
            "anthropic" => {
                let api_key = settings
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                    .ok_or_else(|| LlmError::Transport {
                        message: "Anthropic API key not found".to_string(),
                    })?;

                let client = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&settings.model)
                    .temperature(settings.temperature as f32)
                    .max_tokens(settings.max_tokens)
                    .build()
                    .await
                    .map_err(|e| LlmError::Transport {
                        message: format!("Failed to build Anthropic client: {}", e),
                    })?;

                Ok(Box::new(client))
            }
            "ollama" => {
                let base_url = settings
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let client = LlmBuilder::new()
                    .ollama()
                    .model(&settings.model)
                    .base_url(&base_url)
                    .temperature(settings.temperature as f32)
                    .build()
                    .await
                    .map_err(|e| LlmError::Transport {
                        message: format!("Failed to build Ollama client: {}", e),
                    })?;

                Ok(Box::new(client))
            }
            "groq" => {
                let api_key = settings
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("GROQ_API_KEY").ok())
                    .ok_or_else(|| LlmError::Transport {
                        message: "Groq API key not found".to_string(),
                    })?;

                let client = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(&settings.model)
                    .temperature(settings.temperature as f32)
                    .build()
                    .await
                    .map_err(|e| LlmError::Transport {
                        message: format!("Failed to build Groq client: {}", e),
                    })?;

                Ok(Box::new(client))
            }
            provider => Err(LlmError::Transport {
                message: format!("Unsupported LLM provider: {}", provider),
            }),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Classify a provider error message into a typed failure
    fn classify_error(message: String) -> LlmError {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") || lower.contains("quota") {
            LlmError::RateLimit {
                message,
                retry_after_ms: None,
            }
        } else if lower.contains("timeout") || lower.contains("timed out") {
            LlmError::Timeout { elapsed_ms: 0 }
        } else {
            LlmError::Transport { message }
        }
    }
}

#[async_trait]
impl LlmClient for SiumaiClient {
    async fn generate(&self, prompt: &str, options: &LlmOptions) -> LlmResult<LlmResponse> {
        let start = Instant::now();
        let messages = vec![user!(prompt)];

        debug!(
            provider = %self.provider,
            model = %self.model,
            prompt_chars = prompt.len(),
            "Generating LLM response"
        );

        let chat_future = self.client.chat(messages);

        let response = match options.deadline {
            Some(deadline) => match timeout(deadline, chat_future).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(LlmError::Timeout {
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    })
                }
            },
            None => chat_future.await,
        }
        .map_err(|e| Self::classify_error(format!("LLM generation failed: {}", e)))?;

        match response.content_text() {
            Some(content) if !content.trim().is_empty() => {
                info!(
                    "Generated response in {:?} ({} chars)",
                    start.elapsed(),
                    content.len()
                );
                Ok(LlmResponse {
                    text: content.to_string(),
                    grounding: None,
                })
            }
            _ => Err(LlmError::InvalidResponse {
                reason: "No text content in LLM response".to_string(),
            }),
        }
    }
}

/// Create a provider client from settings, boxed behind the core trait
pub async fn create_provider_client(
    settings: &AiSettings,
) -> LlmResult<std::sync::Arc<dyn LlmClient>> {
    let client = SiumaiClient::new(settings).await?;
    Ok(std::sync::Arc::new(client))
}
