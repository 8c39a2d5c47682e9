pub mod chat;
pub mod config;
pub mod db;
pub mod generation;
pub mod history;
pub mod models;
pub mod validation;

pub use chat::{ChatError, ChatService};
pub use config::AgoraConfig;
pub use generation::{
    FallbackGenerator, GeminiChatClient, GeneratedReply, GenerationError, ResponseGenerator,
    SamplingParams, FALLBACK_REPLY,
};
pub use history::{HistoryPersister, HistoryStore, PersistOutcome, PersistenceError, PgHistoryStore};
pub use models::{ChatExchange, ConversationTurn, Identity, Role};
pub use validation::{HistoryValidation, ValidationError};
