use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Append-only log of assistant exchanges. No unique constraint on purpose:
/// identical requests produce identical, separate rows.
pub const CHAT_HISTORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chat_history (
    id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id     TEXT NOT NULL,
    message     TEXT NOT NULL,
    response    TEXT NOT NULL,
    history     JSONB NOT NULL DEFAULT '[]'::jsonb,
    success     BOOLEAN NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CHAT_HISTORY_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS chat_history_user_id_idx ON chat_history (user_id, created_at)";

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the `chat_history` table and its index if they are missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CHAT_HISTORY_SCHEMA).execute(pool).await?;
    sqlx::query(CHAT_HISTORY_USER_INDEX).execute(pool).await?;
    Ok(())
}
