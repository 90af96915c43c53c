//! Domain models shared across the relay

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message unit in a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Persisted condensed record of a finished conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Capture instant, second precision
    pub recorded_at: DateTime<Utc>,
    pub summary: String,
}

impl SummaryRecord {
    /// Create a record stamped with the current time.
    pub fn new(summary: String) -> Self {
        let now = Utc::now();
        Self {
            recorded_at: now.with_nanosecond(0).unwrap_or(now),
            summary,
        }
    }
}

/// A registered user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    /// Argon2 PHC string, never exposed in API responses
    #[serde(skip_serializing)]
    pub password_hash: String,
}
