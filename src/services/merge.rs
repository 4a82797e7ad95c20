//! Field-level precedence merge of PMS rows with staff supplements, active bot
//! sessions and bot guest orders.
//!
//! Precedence is Supplement > BotSession > GuestOrder > PMS and is applied to
//! each field on its own: a layer that has nothing for a field never hides a
//! lower layer's value for that field. Blank strings count as nothing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::repository::bot_sessions::{BotSession, SessionPayload};
use crate::repository::supplements::Supplement;
use crate::services::channel::classify_channel;
use crate::services::guest_orders::{match_guest_order, GuestOrder, GuestOrderPool, UserProfiles};
use crate::services::normalize::{
    breakfast_from_remarks, normalize_phone, resolve_guest_name, strip_alpha_prefix, trimmed,
};
use crate::services::pms::{PmsBooking, RoomLine};
use crate::services::room_types::RoomTypeTable;
use crate::services::status::resolve_status;

const SPECIAL_NEED_MARKER: &str = "special_need:";

/// One booking as the front desk sees it.
#[derive(Debug, Clone, Serialize)]
pub struct MergedBookingView {
    /// OTA reference when there is one, otherwise the PMS id.
    pub booking_id: String,
    pub pms_id: String,
    pub ota_booking_id: Option<String>,
    pub booking_source: &'static str,
    pub guest_name: String,
    pub registered_name: Option<String>,
    pub contact_phone: Option<String>,
    pub display_phone: Option<String>,
    pub phone_from_bot: bool,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub nights: Option<i64>,
    pub status_code: String,
    pub status_name: &'static str,
    pub room_changed: bool,
    pub breakfast: &'static str,
    pub remarks: Option<String>,
    pub customer_remarks: Option<String>,
    pub deposit_paid: f64,
    pub room_total: f64,
    pub balance_due: f64,
    pub room_type_name: String,
    pub rooms: Vec<RoomLine>,
    pub room_numbers: Vec<String>,
    pub line_display_name: Option<String>,
    pub arrival_time: Option<String>,
    pub special_requests_summary: Option<String>,
    pub staff_memo: Option<String>,
}

/// Active bot sessions addressable by the order id they are about.
#[derive(Debug, Clone, Default)]
pub struct SessionIndex {
    by_order: HashMap<String, SessionPayload>,
}

impl SessionIndex {
    /// `sessions` should be newest first; the first session claiming an order id
    /// keeps it.
    pub fn from_sessions<'a, I>(sessions: I) -> Self
    where
        I: IntoIterator<Item = &'a BotSession>,
    {
        let mut by_order = HashMap::new();
        for session in sessions {
            if !session.is_active() {
                continue;
            }
            let Some(payload) = session.payload() else {
                continue;
            };
            let Some(order_id) = trimmed(payload.order_id.as_deref()).map(str::to_string) else {
                continue;
            };
            let numeric = strip_alpha_prefix(&order_id).to_string();
            if !numeric.is_empty() && numeric != order_id {
                by_order.entry(numeric).or_insert_with(|| payload.clone());
            }
            by_order.entry(order_id).or_insert(payload);
        }
        Self { by_order }
    }

    pub fn get(&self, key: &str) -> Option<&SessionPayload> {
        self.by_order.get(key)
    }
}

/// Everything besides the PMS row that feeds the merge. Any part may be empty
/// when its store was unavailable; the merge then runs without that layer.
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    pub guest_orders: GuestOrderPool,
    pub profiles: UserProfiles,
    pub sessions: SessionIndex,
    pub supplements: HashMap<String, Supplement>,
    pub room_types: Arc<RoomTypeTable>,
}

/// Keys a booking may be stored under outside the PMS: full OTA reference,
/// numeric OTA reference, PMS id. Duplicates are removed, order is kept.
pub fn booking_lookup_keys(booking: &PmsBooking) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(3);
    let mut push = |key: &str| {
        if !key.is_empty() && !keys.iter().any(|existing| existing == key) {
            keys.push(key.to_string());
        }
    };
    if let Some(reference) = booking.ota_reference() {
        push(reference);
        push(strip_alpha_prefix(reference));
    }
    push(booking.booking_id.trim());
    keys
}

pub fn resolve_booking(booking: &PmsBooking, context: &MergeContext) -> MergedBookingView {
    let keys = booking_lookup_keys(booking);
    let supplement = keys.iter().find_map(|key| context.supplements.get(key));
    let session = keys.iter().find_map(|key| context.sessions.get(key));

    let guest_name = resolve_guest_name(booking);
    let guest_order = match_guest_order(booking, &guest_name, &context.guest_orders);

    merge_layers(
        booking,
        guest_name,
        supplement,
        session,
        guest_order,
        &context.profiles,
        &context.room_types,
    )
}

pub fn resolve_booking_list(bookings: &[PmsBooking], context: &MergeContext) -> Vec<MergedBookingView> {
    bookings
        .iter()
        .map(|booking| resolve_booking(booking, context))
        .collect()
}

fn merge_layers(
    booking: &PmsBooking,
    guest_name: String,
    supplement: Option<&Supplement>,
    session: Option<&SessionPayload>,
    guest_order: Option<&GuestOrder>,
    profiles: &UserProfiles,
    room_types: &RoomTypeTable,
) -> MergedBookingView {
    let channel = classify_channel(booking.ota_booking_id.as_deref());
    let status = resolve_status(booking.status_code.as_deref(), &booking.assignments);

    let pms_phone = trimmed(booking.contact_phone.as_deref()).map(normalize_phone);
    let upstream_phone = first_present([
        supplement.and_then(|s| s.confirmed_phone.as_deref()),
        session.and_then(|s| s.phone.as_deref()),
        guest_order.and_then(|g| g.phone.as_deref()),
    ]);
    let phone_from_bot = upstream_phone.is_some();
    let display_phone = upstream_phone.or(pms_phone);

    let profile_name = guest_order
        .and_then(|g| trimmed(g.line_user_id.as_deref()))
        .and_then(|user_id| profiles.display_name(user_id));
    let line_display_name = first_present([
        supplement.and_then(|s| s.line_name.as_deref()),
        session
            .and_then(|s| s.order_data.as_ref())
            .and_then(|d| d.display_name.as_deref()),
        profile_name,
        guest_order.and_then(|g| g.line_display_name.as_deref()),
    ]);

    let arrival_time = first_present([
        supplement.and_then(|s| s.arrival_time.as_deref()),
        session.and_then(|s| s.arrival_time.as_deref()),
        guest_order.and_then(|g| g.arrival_time.as_deref()),
    ]);

    let special_requests_summary = supplement
        .and_then(|s| trimmed(s.ai_extracted_requests.as_deref()))
        .map(str::to_string)
        .or_else(|| guest_order.and_then(last_special_request));

    let staff_memo = first_present([supplement.and_then(|s| s.staff_memo.as_deref())]);

    let deposit_paid = booking.deposit_paid.unwrap_or(0.0);
    let room_total = booking.room_total.unwrap_or(0.0);
    let balance_due = if channel.requires_payment_on_arrival() {
        (room_total - deposit_paid).max(0.0)
    } else {
        0.0
    };

    let ota_booking_id = booking.ota_reference().map(str::to_string);

    MergedBookingView {
        booking_id: ota_booking_id
            .clone()
            .unwrap_or_else(|| booking.booking_id.trim().to_string()),
        pms_id: booking.booking_id.trim().to_string(),
        ota_booking_id,
        booking_source: channel.as_str(),
        guest_name,
        registered_name: trimmed(booking.registered_name.as_deref()).map(str::to_string),
        contact_phone: booking.contact_phone.clone(),
        display_phone,
        phone_from_bot,
        check_in_date: booking.check_in_date,
        check_out_date: booking.check_out_date,
        nights: booking.nights,
        status_code: status.code,
        status_name: status.name,
        room_changed: status.room_changed,
        breakfast: breakfast_from_remarks(booking.remarks.as_deref()).as_str(),
        remarks: booking.remarks.clone(),
        customer_remarks: booking.customer_remarks.clone(),
        deposit_paid,
        room_total,
        balance_due,
        room_type_name: room_types.label_for(&booking.rooms),
        rooms: booking.rooms.clone(),
        room_numbers: booking.room_numbers.clone(),
        line_display_name,
        arrival_time,
        special_requests_summary,
        staff_memo,
    }
}

/// First non-blank value, highest precedence first.
fn first_present<const N: usize>(layers: [Option<&str>; N]) -> Option<String> {
    layers
        .into_iter()
        .find_map(trimmed)
        .map(str::to_string)
}

fn last_special_request(order: &GuestOrder) -> Option<String> {
    let last = order.special_requests.last()?;
    let text = match last.find(SPECIAL_NEED_MARKER) {
        Some(position) => &last[position + SPECIAL_NEED_MARKER.len()..],
        None => last.as_str(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
