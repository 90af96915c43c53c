//! NAO Assistant Conversation Relay
//!
//! A conversational HTTP API for a NAO robot voice assistant that:
//! - Streams OpenAI completions back to the caller token-by-token
//! - Keeps a bounded rolling window of recent user turns
//! - Condenses and persists a short summary when a conversation ends
//! - Gates every conversational endpoint behind JWT bearer auth
//!
//! REQUEST FLOW:
//! AUTH → APPEND → SNAPSHOT → STREAM, and on conversation end
//! AUTH → SNAPSHOT → SUMMARIZE → PERSIST → CLEAR

pub mod api;
pub mod auth;
pub mod error;
pub mod memory;
pub mod models;
pub mod provider;
pub mod relay;
pub mod users;

pub use error::{AssistantError, Result};

// Re-export common types
pub use models::*;
