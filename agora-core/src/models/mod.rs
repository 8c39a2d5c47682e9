pub mod conversation;
pub mod exchange;

pub use conversation::{ConversationTurn, Role};
pub use exchange::{ChatExchange, ChatHistoryRow, Identity};
