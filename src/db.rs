use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::AppConfig;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS guest_supplements (
        booking_id TEXT PRIMARY KEY,
        confirmed_phone TEXT,
        arrival_time TEXT,
        staff_memo TEXT,
        ai_extracted_requests TEXT,
        line_name TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS bot_sessions (
        user_id TEXT PRIMARY KEY,
        state TEXT,
        data JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS room_acknowledgments (
        room_number TEXT NOT NULL,
        ack_date DATE NOT NULL,
        acknowledged_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (room_number, ack_date)
    )",
];

/// Lazily-connecting pool, or `None` when no `DATABASE_URL` is set. The service
/// still serves PMS-only views without it.
pub fn build_pool(config: &AppConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = config.database_url.as_deref() else {
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds.max(1)))
        .connect_lazy(url)?;
    Ok(Some(pool))
}

/// Create the service's own tables. Run once at startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
