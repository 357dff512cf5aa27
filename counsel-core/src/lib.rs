//! Counsel Core - Shared data structures and infrastructure
//!
//! This crate defines the foundation the rest of the workspace builds on:
//! error handling with context, async retry/timeout/rate-limit utilities,
//! the settings schema, logging setup, input sanitization, and the types
//! and boundary traits shared between the dialogue and research crates.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod sanitize;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use sanitize::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
