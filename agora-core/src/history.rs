//! History persistence: append-only record of assistant exchanges.
//!
//! Writes are write-once with no dedup or idempotency key. The persister
//! reports an explicit `PersistOutcome` so the request handler can log a
//! failed write without it changing what the user receives.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use uuid::Uuid;

use crate::config::PersistenceConfig;
use crate::models::{ChatExchange, Identity};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Insert-only sink for exchanges.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one record and return its id.
    async fn append(&self, user: &Identity, exchange: &ChatExchange) -> Result<Uuid, PersistenceError>;

    /// Store name for logging.
    fn name(&self) -> &str;
}

/// PostgreSQL `chat_history` table.
#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, user: &Identity, exchange: &ChatExchange) -> Result<Uuid, PersistenceError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO chat_history (user_id, message, response, history, success)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(user.as_str())
        .bind(&exchange.input_message)
        .bind(&exchange.output_text)
        .bind(&exchange.raw_history)
        .bind(exchange.success)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No identity on the request.
    Anonymous,
    /// `persistence.enabled = false`.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Stored { id: Uuid },
    Skipped(SkipReason),
    Failed { error: String },
}

impl PersistOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PersistOutcome::Stored { .. })
    }
}

/// Decides whether an exchange is written and performs the write.
#[derive(Clone)]
pub struct HistoryPersister {
    store: Option<Arc<dyn HistoryStore>>,
    retry_attempts: usize,
    retry_delay_ms: u64,
}

impl HistoryPersister {
    pub fn new(store: Arc<dyn HistoryStore>, config: &PersistenceConfig) -> Self {
        Self {
            store: config.enabled.then_some(store),
            retry_attempts: config.retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    /// A persister that never writes.
    pub fn disabled() -> Self {
        Self {
            store: None,
            retry_attempts: 0,
            retry_delay_ms: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn persist(&self, exchange: &ChatExchange) -> PersistOutcome {
        let store = match &self.store {
            Some(s) => s,
            None => return PersistOutcome::Skipped(SkipReason::Disabled),
        };
        let user = match &exchange.identity {
            Some(u) => u,
            None => return PersistOutcome::Skipped(SkipReason::Anonymous),
        };

        let retry_strategy =
            retry_schedule(self.retry_delay_ms, self.retry_attempts).map(jitter);

        match Retry::spawn(retry_strategy, || store.append(user, exchange)).await {
            Ok(id) => {
                tracing::info!(id = %id, user = %user, store = store.name(), "Chat exchange stored");
                PersistOutcome::Stored { id }
            }
            Err(e) => {
                tracing::error!(
                    user = %user,
                    store = store.name(),
                    attempts = self.retry_attempts + 1,
                    error = %e,
                    "Failed to store chat exchange"
                );
                PersistOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Delays between insert attempts: `delay_ms`, then doubling, capped at 5s.
///
/// `ExponentialBackoff` raises its base to the attempt number, so the base is
/// fixed at 2 and `factor` carries the configured delay.
fn retry_schedule(delay_ms: u64, attempts: usize) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor((delay_ms / 2).max(1))
        .max_delay(Duration::from_secs(5))
        .take(attempts)
}
