use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::error::AppError;
use crate::repository::supplements::SupplementPatch;
use crate::services::pms::PmsSearchQuery;
use crate::services::walk_in::NewWalkIn;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingPath {
    pub booking_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckinOffsetPath {
    #[validate(range(min = -30, max = 30))]
    pub offset: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingSearchQuery {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub booking_id: Option<String>,
}

impl BookingSearchQuery {
    pub fn into_pms_query(self) -> Result<PmsSearchQuery, AppError> {
        let query = PmsSearchQuery {
            name: non_blank(self.name),
            phone: non_blank(self.phone),
            booking_id: non_blank(self.booking_id),
        };
        if query.name.is_none() && query.phone.is_none() && query.booking_id.is_none() {
            return Err(AppError::BadRequest(
                "Provide at least one of name, phone or booking_id.".to_string(),
            ));
        }
        Ok(query)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateSupplementInput {
    #[validate(length(max = 32))]
    pub confirmed_phone: Option<String>,
    #[validate(length(max = 32))]
    pub arrival_time: Option<String>,
    #[validate(length(max = 2000))]
    pub staff_memo: Option<String>,
    #[validate(length(max = 2000))]
    pub ai_extracted_requests: Option<String>,
    #[validate(length(max = 100))]
    pub line_name: Option<String>,
}

impl From<UpdateSupplementInput> for SupplementPatch {
    fn from(input: UpdateSupplementInput) -> Self {
        Self {
            confirmed_phone: input.confirmed_phone.map(|v| v.trim().to_string()),
            arrival_time: input.arrival_time.map(|v| v.trim().to_string()),
            staff_memo: input.staff_memo,
            ai_extracted_requests: input.ai_extracted_requests,
            line_name: input.line_name.map(|v| v.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotSessionPath {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BotSessionInput {
    #[validate(length(min = 1, max = 64))]
    pub state: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RoomAckInput {
    #[validate(length(min = 1, max = 16))]
    pub room_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalkInPath {
    /// A line-item id, or an order id standing for the order's first item.
    pub order_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmWalkInQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWalkInInput {
    /// An existing order id adds another line item to that order.
    #[validate(length(min = 1, max = 32))]
    pub order_id: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub guest_name: String,
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
    #[validate(length(max = 32))]
    pub arrival_time: Option<String>,
    #[validate(length(max = 16))]
    pub room_type_code: Option<String>,
    #[validate(range(min = 1, max = 20))]
    pub room_count: Option<i64>,
    #[validate(range(min = 1, max = 30))]
    pub nights: Option<i64>,
    /// Defaults to the hotel's current day.
    pub check_in_date: Option<NaiveDate>,
    pub line_user_id: Option<String>,
    pub line_display_name: Option<String>,
    #[validate(length(max = 2000))]
    pub staff_note: Option<String>,
}

impl CreateWalkInInput {
    pub fn into_new_walk_in(self, today: NaiveDate) -> NewWalkIn {
        NewWalkIn {
            order_id: self.order_id,
            guest_name: self.guest_name,
            phone: self.phone,
            arrival_time: non_blank(self.arrival_time),
            room_type_code: non_blank(self.room_type_code),
            room_count: self.room_count,
            nights: self.nights,
            check_in_date: self.check_in_date.unwrap_or(today),
            line_user_id: non_blank(self.line_user_id),
            line_display_name: non_blank(self.line_display_name),
            staff_note: non_blank(self.staff_note),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_requires_a_criterion() {
        assert!(BookingSearchQuery::default().into_pms_query().is_err());
        let query = BookingSearchQuery {
            phone: Some(" 0912345678 ".to_string()),
            name: Some("  ".to_string()),
            ..BookingSearchQuery::default()
        }
        .into_pms_query()
        .expect("query");
        assert_eq!(query.phone.as_deref(), Some("0912345678"));
        assert_eq!(query.name, None);
    }

    #[test]
    fn supplement_patch_keeps_explicit_blank_and_skips_missing() {
        let input: UpdateSupplementInput =
            serde_json::from_value(json!({ "staff_memo": "", "confirmed_phone": " 0912 " }))
                .expect("decode");
        validate_input(&input).expect("valid");
        let patch = SupplementPatch::from(input);
        assert_eq!(patch.staff_memo.as_deref(), Some(""));
        assert_eq!(patch.confirmed_phone.as_deref(), Some("0912"));
        assert!(patch.arrival_time.is_none());
    }

    #[test]
    fn walk_in_input_is_validated_and_defaults_to_today() {
        let bad: CreateWalkInInput =
            serde_json::from_value(json!({ "guest_name": "", "phone": "0912" })).expect("decode");
        assert!(matches!(
            validate_input(&bad),
            Err(AppError::UnprocessableEntity(_))
        ));

        let good: CreateWalkInInput = serde_json::from_value(json!({
            "guest_name": "Lee",
            "phone": "0912345678",
            "room_count": 2,
            "staff_note": "  "
        }))
        .expect("decode");
        validate_input(&good).expect("valid");
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).expect("date");
        let walk_in = good.into_new_walk_in(today);
        assert_eq!(walk_in.check_in_date, today);
        assert_eq!(walk_in.staff_note, None);
    }

    #[test]
    fn offset_is_bounded() {
        assert!(validate_input(&CheckinOffsetPath { offset: -1 }).is_ok());
        assert!(validate_input(&CheckinOffsetPath { offset: 90 }).is_err());
    }
}
