use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::error::AppError;

pub const IDLE_STATE: &str = "idle";

/// One chat-bot conversation, keyed by end-user id.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BotSession {
    pub user_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The parts of a session's free-form `data` the merge reads.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SessionPayload {
    #[serde(default, deserialize_with = "string_or_number")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub order_data: Option<SessionOrderData>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SessionOrderData {
    #[serde(default)]
    pub display_name: Option<String>,
}

impl BotSession {
    pub fn is_active(&self) -> bool {
        matches!(self.state.as_deref().map(str::trim), Some(state) if !state.is_empty() && state != IDLE_STATE)
    }

    /// Typed view of `data`; `None` when the payload is missing or malformed.
    pub fn payload(&self) -> Option<SessionPayload> {
        if self.data.is_null() {
            return None;
        }
        match serde_json::from_value::<SessionPayload>(self.data.clone()) {
            Ok(payload) => Some(payload),
            Err(error) => {
                tracing::warn!(user_id = %self.user_id, error = %error, "Ignoring malformed bot session payload");
                None
            }
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

pub async fn get_session(pool: &PgPool, user_id: &str) -> Result<Option<BotSession>, AppError> {
    let row = sqlx::query(
        "SELECT row_to_json(t) AS row
         FROM bot_sessions t
         WHERE user_id = $1
         LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .and_then(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .and_then(decode_session))
}

/// Coalescing upsert: a `None` state keeps the stored state, a `None` data keeps
/// the stored payload, and a supplied payload replaces the old one whole.
pub async fn upsert_session(
    pool: &PgPool,
    user_id: &str,
    state: Option<&str>,
    data: Option<&Value>,
) -> Result<BotSession, AppError> {
    let row = sqlx::query(
        "INSERT INTO bot_sessions (user_id, state, data)
         VALUES ($1, $2, COALESCE($3, '{}'::jsonb))
         ON CONFLICT (user_id) DO UPDATE SET
            state = COALESCE(EXCLUDED.state, bot_sessions.state),
            data = COALESCE($3, bot_sessions.data),
            updated_at = now()
         RETURNING row_to_json(bot_sessions) AS row",
    )
    .bind(user_id)
    .bind(state)
    .bind(data)
    .fetch_one(pool)
    .await?;

    row.try_get::<Option<Value>, _>("row")
        .ok()
        .flatten()
        .and_then(decode_session)
        .ok_or_else(|| AppError::Internal("Bot session upsert returned no row.".to_string()))
}

pub async fn delete_session(pool: &PgPool, user_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM bot_sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Sessions still mid-conversation, newest first.
pub async fn list_active_sessions(pool: &PgPool) -> Result<Vec<BotSession>, AppError> {
    let rows = sqlx::query(
        "SELECT row_to_json(t) AS row
         FROM bot_sessions t
         WHERE t.state IS NOT NULL AND t.state <> '' AND t.state <> $1
         ORDER BY t.updated_at DESC",
    )
    .bind(IDLE_STATE)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .filter_map(decode_session)
        .filter(BotSession::is_active)
        .collect())
}

fn decode_session(value: Value) -> Option<BotSession> {
    match serde_json::from_value::<BotSession>(value) {
        Ok(session) => Some(session),
        Err(error) => {
            tracing::warn!(error = %error, "Skipping malformed bot session row");
            None
        }
    }
}
