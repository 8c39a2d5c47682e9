//! Inbound payload checks for the chat endpoint.
//!
//! The message is trimmed and must be non-empty. History is checked turn by
//! turn before either the model or the store sees it; the result is a tagged
//! value rather than an early error so the caller decides how to surface it.

use serde_json::Value;
use thiserror::Error;

use crate::models::{ConversationTurn, Role};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message is required")]
    MissingMessage,

    #[error("Invalid conversation history: {0}")]
    InvalidHistory(String),
}

/// Outcome of checking the caller-supplied history.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryValidation {
    Valid {
        turns: Vec<ConversationTurn>,
        /// The history exactly as received (`[]` when absent).
        raw: Value,
    },
    Invalid {
        index: Option<usize>,
        reason: String,
    },
}

impl HistoryValidation {
    pub fn into_result(self) -> Result<(Vec<ConversationTurn>, Value), ValidationError> {
        match self {
            HistoryValidation::Valid { turns, raw } => Ok((turns, raw)),
            HistoryValidation::Invalid {
                index: Some(i),
                reason,
            } => Err(ValidationError::InvalidHistory(format!("turn {}: {}", i, reason))),
            HistoryValidation::Invalid {
                index: None,
                reason,
            } => Err(ValidationError::InvalidHistory(reason)),
        }
    }
}

/// Extract and trim the `message` field. Absent, non-string and blank
/// values are all rejected the same way.
pub fn sanitize_message(value: Option<&Value>) -> Result<String, ValidationError> {
    match value.and_then(Value::as_str).map(str::trim) {
        Some(m) if !m.is_empty() => Ok(m.to_string()),
        _ => Err(ValidationError::MissingMessage),
    }
}

/// Check the `history` field against the turn schema.
///
/// Absent or `null` history is an empty conversation. The first turn has to
/// come from the user, which is what the model API requires.
pub fn validate_history(value: Option<&Value>) -> HistoryValidation {
    let items = match value {
        None | Some(Value::Null) => {
            return HistoryValidation::Valid {
                turns: Vec::new(),
                raw: Value::Array(Vec::new()),
            }
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            return HistoryValidation::Invalid {
                index: None,
                reason: "history must be an array".to_string(),
            }
        }
    };

    let mut turns = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match parse_turn(item) {
            Ok(turn) => turns.push(turn),
            Err(reason) => {
                return HistoryValidation::Invalid {
                    index: Some(i),
                    reason,
                }
            }
        }
    }

    if let Some(first) = turns.first() {
        if first.role != Role::User {
            return HistoryValidation::Invalid {
                index: Some(0),
                reason: "first turn must come from the user".to_string(),
            };
        }
    }

    HistoryValidation::Valid {
        turns,
        raw: Value::Array(items.clone()),
    }
}

fn parse_turn(item: &Value) -> Result<ConversationTurn, String> {
    let obj = item
        .as_object()
        .ok_or_else(|| "turn must be an object".to_string())?;

    let role = match obj.get("role") {
        Some(Value::String(r)) => {
            Role::parse(r).ok_or_else(|| format!("unknown role '{}'", r))?
        }
        Some(_) => return Err("role must be a string".to_string()),
        None => return Err("missing role".to_string()),
    };

    let text = match obj.get("parts") {
        Some(Value::String(t)) if !t.trim().is_empty() => t.clone(),
        Some(Value::String(_)) => return Err("parts must not be empty".to_string()),
        Some(_) => return Err("parts must be a string".to_string()),
        None => return Err("missing parts".to_string()),
    };

    Ok(ConversationTurn { role, text })
}
