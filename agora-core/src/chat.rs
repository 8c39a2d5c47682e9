//! Chat request orchestration.
//!
//! One call to [`ChatService::handle`] is one request: validate, generate,
//! then persist. Generation always finishes before persistence starts, and
//! nothing is shared between requests beyond the injected clients.

use serde_json::Value;
use thiserror::Error;

use crate::generation::{FallbackGenerator, GeneratedReply};
use crate::history::{HistoryPersister, PersistOutcome};
use crate::models::{ChatExchange, Identity};
use crate::validation::{sanitize_message, validate_history, ValidationError};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Request body is not a JSON object")]
    MalformedBody,
}

/// Reply for the caller plus what happened to the stored record.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: GeneratedReply,
    pub persisted: PersistOutcome,
}

#[derive(Clone)]
pub struct ChatService {
    generator: FallbackGenerator,
    persister: HistoryPersister,
}

impl ChatService {
    pub fn new(generator: FallbackGenerator, persister: HistoryPersister) -> Self {
        Self {
            generator,
            persister,
        }
    }

    pub async fn handle(
        &self,
        payload: &Value,
        identity: Option<Identity>,
    ) -> Result<ChatOutcome, ChatError> {
        let body = payload.as_object().ok_or(ChatError::MalformedBody)?;

        let message = sanitize_message(body.get("message"))?;
        let (turns, raw_history) = validate_history(body.get("history")).into_result()?;

        let reply = self.generator.reply(&message, &turns).await;

        let exchange = ChatExchange {
            identity,
            // sanitize_message succeeded, so this is a string
            input_message: body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(&message)
                .to_string(),
            output_text: reply.text.clone(),
            raw_history,
            success: reply.success,
        };

        let persisted = self.persister.persist(&exchange).await;

        Ok(ChatOutcome { reply, persisted })
    }
}
