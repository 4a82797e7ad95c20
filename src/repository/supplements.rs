use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::error::AppError;

/// Staff-entered overrides for one booking. Every field is independently
/// nullable; a field that is `None` here defers to the lower layers.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Supplement {
    pub booking_id: String,
    #[serde(default)]
    pub confirmed_phone: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub staff_memo: Option<String>,
    #[serde(default)]
    pub ai_extracted_requests: Option<String>,
    #[serde(default)]
    pub line_name: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Supplement {
    /// In-memory counterpart of the upsert's `COALESCE(EXCLUDED.col, col)`:
    /// a `Some` field replaces the stored value, a `None` field keeps it.
    pub fn apply(&mut self, patch: &SupplementPatch) {
        coalesce(&mut self.confirmed_phone, &patch.confirmed_phone);
        coalesce(&mut self.arrival_time, &patch.arrival_time);
        coalesce(&mut self.staff_memo, &patch.staff_memo);
        coalesce(&mut self.ai_extracted_requests, &patch.ai_extracted_requests);
        coalesce(&mut self.line_name, &patch.line_name);
    }
}

fn coalesce(stored: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming {
        *stored = Some(value.clone());
    }
}

/// Partial update. `None` leaves the stored value untouched; `Some("")` clears it
/// for display purposes, since blank values are treated as absent when merging.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SupplementPatch {
    pub confirmed_phone: Option<String>,
    pub arrival_time: Option<String>,
    pub staff_memo: Option<String>,
    pub ai_extracted_requests: Option<String>,
    pub line_name: Option<String>,
}

impl SupplementPatch {
    pub fn is_empty(&self) -> bool {
        self.confirmed_phone.is_none()
            && self.arrival_time.is_none()
            && self.staff_memo.is_none()
            && self.ai_extracted_requests.is_none()
            && self.line_name.is_none()
    }
}

const UPSERT_SQL: &str = "INSERT INTO guest_supplements (
        booking_id, confirmed_phone, arrival_time, staff_memo, ai_extracted_requests, line_name
     )
     VALUES ($1, $2, $3, $4, $5, $6)
     ON CONFLICT (booking_id) DO UPDATE SET
        confirmed_phone = COALESCE(EXCLUDED.confirmed_phone, guest_supplements.confirmed_phone),
        arrival_time = COALESCE(EXCLUDED.arrival_time, guest_supplements.arrival_time),
        staff_memo = COALESCE(EXCLUDED.staff_memo, guest_supplements.staff_memo),
        ai_extracted_requests = COALESCE(EXCLUDED.ai_extracted_requests, guest_supplements.ai_extracted_requests),
        line_name = COALESCE(EXCLUDED.line_name, guest_supplements.line_name),
        updated_at = now()
     RETURNING row_to_json(guest_supplements) AS row";

pub async fn get_supplement(pool: &PgPool, booking_id: &str) -> Result<Option<Supplement>, AppError> {
    let row = sqlx::query(
        "SELECT row_to_json(t) AS row
         FROM guest_supplements t
         WHERE booking_id = $1
         LIMIT 1",
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .and_then(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .and_then(decode_supplement))
}

/// Supplements for any of `keys`, keyed by booking id. Rows that no longer
/// decode are logged and skipped.
pub async fn get_supplements(
    pool: &PgPool,
    keys: &[String],
) -> Result<HashMap<String, Supplement>, AppError> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query(
        "SELECT row_to_json(t) AS row
         FROM guest_supplements t
         WHERE booking_id = ANY($1)",
    )
    .bind(keys)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .filter_map(decode_supplement)
        .map(|supplement| (supplement.booking_id.clone(), supplement))
        .collect())
}

/// Per-field coalescing upsert in a single statement, so concurrent edits to
/// different fields of the same booking both survive.
pub async fn upsert_supplement(
    pool: &PgPool,
    booking_id: &str,
    patch: &SupplementPatch,
) -> Result<Supplement, AppError> {
    if patch.is_empty() {
        return Ok(get_supplement(pool, booking_id)
            .await?
            .unwrap_or_else(|| Supplement {
                booking_id: booking_id.to_string(),
                ..Supplement::default()
            }));
    }

    let row = sqlx::query(UPSERT_SQL)
        .bind(booking_id)
        .bind(patch.confirmed_phone.as_deref())
        .bind(patch.arrival_time.as_deref())
        .bind(patch.staff_memo.as_deref())
        .bind(patch.ai_extracted_requests.as_deref())
        .bind(patch.line_name.as_deref())
        .fetch_one(pool)
        .await?;

    row.try_get::<Option<Value>, _>("row")
        .ok()
        .flatten()
        .and_then(decode_supplement)
        .ok_or_else(|| AppError::Internal("Supplement upsert returned no row.".to_string()))
}

fn decode_supplement(value: Value) -> Option<Supplement> {
    match serde_json::from_value::<Supplement>(value) {
        Ok(supplement) => Some(supplement),
        Err(error) => {
            tracing::warn!(error = %error, "Skipping malformed supplement row");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_supplement, upsert_supplement, Supplement, SupplementPatch, UPSERT_SQL};
    use serde_json::json;

    fn stored() -> Supplement {
        Supplement {
            booking_id: "RMAG998".to_string(),
            confirmed_phone: Some("0912345678".to_string()),
            staff_memo: Some("VIP".to_string()),
            ..Supplement::default()
        }
    }

    fn memo_and_arrival() -> SupplementPatch {
        SupplementPatch {
            arrival_time: Some("15:00".to_string()),
            staff_memo: Some("late check-out".to_string()),
            ..SupplementPatch::default()
        }
    }

    #[test]
    fn null_fields_never_overwrite_stored_values() {
        let mut supplement = stored();
        supplement.apply(&memo_and_arrival());
        assert_eq!(supplement.confirmed_phone.as_deref(), Some("0912345678"));
        assert_eq!(supplement.staff_memo.as_deref(), Some("late check-out"));
        assert_eq!(supplement.arrival_time.as_deref(), Some("15:00"));

        let before = supplement.clone();
        supplement.apply(&SupplementPatch::default());
        assert_eq!(supplement, before);
    }

    #[test]
    fn applying_a_patch_twice_equals_applying_it_once() {
        let patch = memo_and_arrival();
        let mut once = stored();
        once.apply(&patch);
        let mut twice = once.clone();
        twice.apply(&patch);
        assert_eq!(once, twice);
    }

    #[test]
    fn blank_string_clears_a_field() {
        let mut supplement = stored();
        supplement.apply(&SupplementPatch {
            staff_memo: Some(String::new()),
            ..SupplementPatch::default()
        });
        assert_eq!(supplement.staff_memo.as_deref(), Some(""));
        assert_eq!(supplement.confirmed_phone.as_deref(), Some("0912345678"));
    }

    /// Runs the real statement when `DATABASE_URL` points at a scratch database.
    #[tokio::test]
    async fn upsert_statement_behaves_like_apply() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let pool = sqlx::PgPool::connect(&url).await.expect("connect");
        crate::db::ensure_schema(&pool).await.expect("schema");

        let booking_id = format!("TEST{}", uuid::Uuid::new_v4().simple());
        let first = SupplementPatch {
            confirmed_phone: Some("0912345678".to_string()),
            staff_memo: Some("VIP".to_string()),
            ..SupplementPatch::default()
        };
        let second = memo_and_arrival();

        upsert_supplement(&pool, &booking_id, &first).await.expect("first");
        let once = upsert_supplement(&pool, &booking_id, &second).await.expect("second");
        let twice = upsert_supplement(&pool, &booking_id, &second).await.expect("again");

        let mut expected = Supplement {
            booking_id: booking_id.clone(),
            ..Supplement::default()
        };
        expected.apply(&first);
        expected.apply(&second);
        for row in [&once, &twice] {
            let mut row = row.clone();
            row.updated_at = None;
            assert_eq!(row, expected);
        }

        sqlx::query("DELETE FROM guest_supplements WHERE booking_id = $1")
            .bind(&booking_id)
            .execute(&pool)
            .await
            .expect("cleanup");
    }

    #[test]
    fn every_column_is_coalesced_on_conflict() {
        for column in [
            "confirmed_phone",
            "arrival_time",
            "staff_memo",
            "ai_extracted_requests",
            "line_name",
        ] {
            let clause =
                format!("{column} = COALESCE(EXCLUDED.{column}, guest_supplements.{column})");
            assert!(UPSERT_SQL.contains(&clause), "missing coalesce for {column}");
        }
        // No column is overwritten unconditionally apart from the timestamp.
        let set_clause = UPSERT_SQL
            .split("DO UPDATE SET")
            .nth(1)
            .and_then(|rest| rest.split("RETURNING").next())
            .unwrap_or_default();
        let plain_assignments = set_clause
            .lines()
            .map(|line| line.trim().trim_end_matches(','))
            .filter(|a| !a.is_empty() && !a.contains("COALESCE"))
            .collect::<Vec<_>>();
        assert_eq!(plain_assignments, vec!["updated_at = now()"]);
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(SupplementPatch::default().is_empty());
        let patch = SupplementPatch {
            staff_memo: Some(String::new()),
            ..SupplementPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn decodes_row_json_and_rejects_garbage() {
        let row = json!({
            "booking_id": "RMAG998",
            "confirmed_phone": null,
            "staff_memo": "VIP guest",
            "updated_at": "2026-10-16T09:30:00.123456+08:00",
            "created_at": "2026-10-16T09:00:00+08:00"
        });
        let supplement = decode_supplement(row).expect("decodes");
        assert_eq!(supplement.staff_memo.as_deref(), Some("VIP guest"));
        assert!(supplement.confirmed_phone.is_none());
        assert!(supplement.updated_at.is_some());

        assert!(decode_supplement(json!({ "booking_id": 7 })).is_none());
    }
}
