//! Error types for the assistant relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Request-level Errors
    // =============================

    #[error("Invalid request: {0}")]
    CallerInput(String),

    #[error("No conversation context available")]
    EmptyContext,

    #[error("Authentication failed: {0}")]
    Auth(String),

    // =============================
    // Server-side Errors
    // =============================

    #[error("Completion provider error: {0}")]
    Upstream(String),

    #[error("Summary store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
