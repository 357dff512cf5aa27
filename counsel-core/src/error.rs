//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and proper error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type CounselResult<T> = Result<T, CounselError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the Counsel system
#[derive(Error, Debug)]
pub enum CounselError {
    #[error("Invalid input: {message}")]
    Input {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Session error: {message}")]
    Session {
        message: String,
        context: ErrorContext,
    },

    #[error("Dialogue error: {message}")]
    Dialogue {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Assessment invariant violated: {message}")]
    Assessment {
        message: String,
        context: ErrorContext,
    },

    #[error("Research error: {message}")]
    Research {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("LLM error: {message}")]
    Llm {
        message: String,
        provider: Option<String>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    #[error("Operation cancelled: {operation}")]
    Cancelled {
        operation: String,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl CounselError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            CounselError::Input { context, .. } => Some(context),
            CounselError::Config { context, .. } => Some(context),
            CounselError::Session { context, .. } => Some(context),
            CounselError::Dialogue { context, .. } => Some(context),
            CounselError::Assessment { context, .. } => Some(context),
            CounselError::Research { context, .. } => Some(context),
            CounselError::Llm { context, .. } => Some(context),
            CounselError::Storage { context, .. } => Some(context),
            CounselError::Timeout { context, .. } => Some(context),
            CounselError::RateLimit { context, .. } => Some(context),
            CounselError::Cancelled { context, .. } => Some(context),
            CounselError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            CounselError::Timeout { .. } => true,
            CounselError::RateLimit { .. } => true,
            CounselError::Llm { .. } => true,
            CounselError::Input { .. } => false,
            CounselError::Config { .. } => false,
            CounselError::Assessment { .. } => false,
            CounselError::Cancelled { .. } => false,
            _ => false,
        }
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            CounselError::Timeout { .. } => Some(2000),
            CounselError::Llm { .. } => Some(1000),
            CounselError::RateLimit { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            CounselError::Internal { .. } | CounselError::Assessment { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            CounselError::Config { .. } | CounselError::Input { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration or input error"
                );
            }
            CounselError::Timeout { .. } | CounselError::RateLimit { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Transient error (may be recoverable)"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! input_error {
    ($msg:expr, $component:expr) => {
        $crate::CounselError::Input {
            message: $msg.to_string(),
            field: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the input value and format"),
        }
    };
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::CounselError::Input {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the input value and format"),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::CounselError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'counsel config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! session_error {
    ($msg:expr, $component:expr) => {
        $crate::CounselError::Session {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Verify the session id exists and is not frozen"),
        }
    };
}

#[macro_export]
macro_rules! assessment_error {
    ($msg:expr, $component:expr) => {
        $crate::CounselError::Assessment {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! cancelled_error {
    ($operation:expr, $component:expr) => {
        $crate::CounselError::Cancelled {
            operation: $operation.to_string(),
            context: $crate::ErrorContext::new($component),
        }
    };
}
