use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::error::AppError;

/// Room numbers acknowledged for `date`, in acknowledgment order.
pub async fn list_acknowledged_rooms(pool: &PgPool, date: NaiveDate) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query(
        "SELECT room_number
         FROM room_acknowledgments
         WHERE ack_date = $1
         ORDER BY acknowledged_at ASC",
    )
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| row.try_get::<String, _>("room_number").ok())
        .collect())
}

/// Returns `false` when the room was already acknowledged that day.
pub async fn acknowledge_room(
    pool: &PgPool,
    room_number: &str,
    date: NaiveDate,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "INSERT INTO room_acknowledgments (room_number, ack_date)
         VALUES ($1, $2)
         ON CONFLICT (room_number, ack_date) DO NOTHING",
    )
    .bind(room_number)
    .bind(date)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn purge_acknowledgments_before(pool: &PgPool, date: NaiveDate) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM room_acknowledgments WHERE ack_date < $1")
        .bind(date)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn clear_acknowledgments(pool: &PgPool) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM room_acknowledgments")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
