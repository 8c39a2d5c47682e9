use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque caller id handed to us by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Returns `None` for blank ids so callers never persist under "".
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything one request produced. Lives for a single request.
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub identity: Option<Identity>,
    /// The message exactly as the caller sent it.
    pub input_message: String,
    pub output_text: String,
    /// History JSON as received, stored without normalization.
    pub raw_history: serde_json::Value,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatHistoryRow {
    pub id: Uuid,
    pub user_id: String,
    pub message: String,
    pub response: String,
    pub history: serde_json::Value,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}
