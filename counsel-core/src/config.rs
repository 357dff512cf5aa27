//! Settings schema and configuration loading
//!
//! Typed settings record loaded from TOML. Unknown keys are ignored;
//! out-of-range numeric values are rejected at load time.

use crate::error::{CounselError, CounselResult, ErrorContext};
use crate::types::{ConversationMode, ModeConfig, QuestionDepth};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level settings record for the Counsel system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CounselSettings {
    pub app: AppSettings,
    pub ai: AiSettings,
    pub research: ResearchSettings,
    pub dynamic_personalization: PersonalizationSettings,
    pub ai_question_generation: QuestionGenerationSettings,
    pub context_analysis: ContextAnalysisSettings,
    pub validation: ValidationSettings,
    pub memory: MemorySettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub debug: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "Counsel".to_string(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_retries: usize,
    /// Seconds before the first retry; doubles per attempt
    pub retry_delay: f64,
    /// Minimum seconds between LLM invocations
    pub rate_limit_delay: f64,
    pub exponential_backoff_base: f64,
    /// Per-call deadline in seconds
    pub response_timeout: u64,
    pub enable_grounding: bool,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 4000,
            max_retries: 3,
            retry_delay: 1.0,
            rate_limit_delay: 2.0,
            exponential_backoff_base: 2.0,
            response_timeout: 10,
            enable_grounding: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    /// Fixed at 6; any other value is rejected at load
    pub stage_count: usize,
    pub max_gaps_per_stage: usize,
    pub min_confidence_fallback: f64,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            stage_count: 6,
            max_gaps_per_stage: 10,
            min_confidence_fallback: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizationSettings {
    pub enabled: bool,
    pub conversation_modes: ConversationModes,
}

impl Default for PersonalizationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            conversation_modes: ConversationModes::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationModes {
    pub quick: ModeConfig,
    pub standard: ModeConfig,
    pub deep: ModeConfig,
    pub adaptive: ModeConfig,
}

impl Default for ConversationModes {
    fn default() -> Self {
        Self {
            quick: ModeConfig::for_mode(ConversationMode::Quick),
            standard: ModeConfig::for_mode(ConversationMode::Standard),
            deep: ModeConfig::for_mode(ConversationMode::Deep),
            adaptive: ModeConfig::for_mode(ConversationMode::Adaptive),
        }
    }
}

impl ConversationModes {
    pub fn config_for(&self, mode: ConversationMode) -> &ModeConfig {
        match mode {
            ConversationMode::Quick => &self.quick,
            ConversationMode::Standard => &self.standard,
            ConversationMode::Deep => &self.deep,
            ConversationMode::Adaptive => &self.adaptive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionGenerationSettings {
    pub enabled: bool,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub relevance_threshold: f64,
    pub duplicate_detection: bool,
    pub similarity_threshold: f64,
}

impl Default for QuestionGenerationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 400,
            relevance_threshold: 0.6,
            duplicate_detection: true,
            similarity_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextAnalysisSettings {
    pub priority_analysis: PriorityWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub budget_weight: f64,
    pub timeline_weight: f64,
    pub quality_weight: f64,
    pub convenience_weight: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            budget_weight: 0.8,
            timeline_weight: 0.9,
            quality_weight: 0.7,
            convenience_weight: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub query_min_length: usize,
    pub query_max_length: usize,
    pub string_max_length: usize,
    pub personalization_key_max_length: usize,
    pub personalization_value_max_length: usize,
    pub personalization_max_keys: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            query_min_length: 5,
            query_max_length: 500,
            string_max_length: 1000,
            personalization_key_max_length: 50,
            personalization_value_max_length: 200,
            personalization_max_keys: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Cross-session pattern learning; disabled by default
    pub cross_session: bool,
    pub storage_path: Option<String>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            cross_session: false,
            storage_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub session_dir: Option<String>,
}

impl CounselSettings {
    /// Load settings from a TOML file and validate them
    pub fn from_file<P: AsRef<Path>>(path: P) -> CounselResult<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| CounselError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let settings: CounselSettings =
            toml::from_str(&content).map_err(|e| CounselError::Config {
                message: format!("Failed to parse config: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("config")
                    .with_operation("parse_toml")
                    .with_suggestion("Check TOML syntax in config file"),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> CounselResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| CounselError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| CounselError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate ranges; rejects unsupported stage counts and out-of-range numerics
    pub fn validate(&self) -> CounselResult<()> {
        if self.research.stage_count != 6 {
            return Err(CounselError::Config {
                message: format!(
                    "research.stage_count must be 6, got {}",
                    self.research.stage_count
                ),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("The research pipeline always runs six stages"),
            });
        }

        if !(0.0..=1.0).contains(&self.research.min_confidence_fallback) {
            return Err(self.range_error(
                "research.min_confidence_fallback",
                self.research.min_confidence_fallback,
            ));
        }

        if self.ai.max_retries == 0 {
            return Err(CounselError::Config {
                message: "ai.max_retries must be at least 1".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.ai.retry_delay < 0.0 || self.ai.rate_limit_delay < 0.0 {
            return Err(CounselError::Config {
                message: "ai retry delays must be non-negative".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.ai.exponential_backoff_base < 1.0 {
            return Err(self.range_error(
                "ai.exponential_backoff_base",
                self.ai.exponential_backoff_base,
            ));
        }

        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(self.range_error("ai.temperature", self.ai.temperature));
        }

        if !(0.0..=2.0).contains(&self.ai_question_generation.temperature) {
            return Err(self.range_error(
                "ai_question_generation.temperature",
                self.ai_question_generation.temperature,
            ));
        }

        if !(0.0..=1.0).contains(&self.ai_question_generation.top_p) {
            return Err(self.range_error(
                "ai_question_generation.top_p",
                self.ai_question_generation.top_p,
            ));
        }

        if !(0.0..=1.0).contains(&self.ai_question_generation.relevance_threshold) {
            return Err(self.range_error(
                "ai_question_generation.relevance_threshold",
                self.ai_question_generation.relevance_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&self.ai_question_generation.similarity_threshold) {
            return Err(self.range_error(
                "ai_question_generation.similarity_threshold",
                self.ai_question_generation.similarity_threshold,
            ));
        }

        let weights = &self.context_analysis.priority_analysis;
        for (name, value) in [
            ("budget_weight", weights.budget_weight),
            ("timeline_weight", weights.timeline_weight),
            ("quality_weight", weights.quality_weight),
            ("convenience_weight", weights.convenience_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(self.range_error(
                    &format!("context_analysis.priority_analysis.{}", name),
                    value,
                ));
            }
        }

        for (mode, config) in [
            ("quick", &self.dynamic_personalization.conversation_modes.quick),
            (
                "standard",
                &self.dynamic_personalization.conversation_modes.standard,
            ),
            ("deep", &self.dynamic_personalization.conversation_modes.deep),
            (
                "adaptive",
                &self.dynamic_personalization.conversation_modes.adaptive,
            ),
        ] {
            if config.max_questions == 0 || config.min_questions > config.max_questions {
                return Err(CounselError::Config {
                    message: format!(
                        "conversation_modes.{}: min_questions ({}) must not exceed max_questions ({})",
                        mode, config.min_questions, config.max_questions
                    ),
                    source: None,
                    context: ErrorContext::new("config").with_operation("validate"),
                });
            }
            if !(0.0..=1.0).contains(&config.time_sensitivity_threshold) {
                return Err(self.range_error(
                    &format!("conversation_modes.{}.time_sensitivity_threshold", mode),
                    config.time_sensitivity_threshold,
                ));
            }
        }

        if self.validation.query_min_length > self.validation.query_max_length {
            return Err(CounselError::Config {
                message: "validation.query_min_length exceeds query_max_length".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        Ok(())
    }

    /// Mode configuration table, resolved per mode
    pub fn mode_config(&self, mode: ConversationMode) -> &ModeConfig {
        self.dynamic_personalization
            .conversation_modes
            .config_for(mode)
    }

    fn range_error(&self, field: &str, value: f64) -> CounselError {
        CounselError::Config {
            message: format!("{} out of range: {}", field, value),
            source: None,
            context: ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion("Check the allowed range in the documentation"),
        }
    }
}

impl Default for ModeConfig {
    fn default() -> Self {
        ModeConfig {
            min_questions: 3,
            max_questions: 6,
            time_sensitivity_threshold: 0.5,
            question_depth: QuestionDepth::Moderate,
        }
    }
}
