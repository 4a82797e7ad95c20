use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Duration;
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    repository::{bot_sessions::list_active_sessions, supplements::get_supplements},
    schemas::{validate_input, BookingPath, BookingSearchQuery, CheckinOffsetPath},
    services::{
        merge::{booking_lookup_keys, resolve_booking, resolve_booking_list, MergeContext, SessionIndex},
        pms::PmsBooking,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/bookings/today-checkin", axum::routing::get(today_checkin))
        .route(
            "/bookings/checkin-by-offset/{offset}",
            axum::routing::get(checkin_by_offset),
        )
        .route("/bookings/search", axum::routing::get(search_bookings))
        .route("/bookings/{booking_id}", axum::routing::get(get_booking))
}

async fn today_checkin(State(state): State<AppState>) -> AppResult<Json<Value>> {
    checkin_list(&state, 0).await
}

async fn checkin_by_offset(
    State(state): State<AppState>,
    Path(path): Path<CheckinOffsetPath>,
) -> AppResult<Json<Value>> {
    validate_input(&path)?;
    checkin_list(&state, path.offset).await
}

async fn checkin_list(state: &AppState, offset: i64) -> AppResult<Json<Value>> {
    let today = state.config.local_today();
    let date = today + Duration::days(offset);

    let rows = match state.pms.checkin_by_offset(offset).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!(error = %error, offset, "PMS check-in list unavailable");
            return Ok(Json(json!({
                "data": [],
                "date": date,
                "pms_available": false
            })));
        }
    };

    if offset == 0 {
        // Today's list doubles as the walk-in reconciliation pass.
        match state.walk_ins.reconcile_today(today, &rows).await {
            Ok(matched) if !matched.is_empty() => {
                tracing::info!(matched = matched.len(), "Walk-ins auto-confirmed from check-in list");
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(error = %error, "Walk-in reconciliation failed"),
        }
    }

    let context = merge_context(state, &rows).await;
    let views = resolve_booking_list(&rows, &context);
    Ok(Json(json!({
        "data": views,
        "date": date,
        "pms_available": true
    })))
}

async fn search_bookings(
    State(state): State<AppState>,
    Query(query): Query<BookingSearchQuery>,
) -> AppResult<Json<Value>> {
    let query = query.into_pms_query()?;
    let rows = match state.pms.search(&query).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!(error = %error, "PMS search unavailable");
            return Ok(Json(json!({ "data": [], "pms_available": false })));
        }
    };
    let context = merge_context(&state, &rows).await;
    Ok(Json(json!({
        "data": resolve_booking_list(&rows, &context),
        "pms_available": true
    })))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(path): Path<BookingPath>,
) -> AppResult<Json<Value>> {
    let booking = match state.pms.booking(&path.booking_id).await {
        Ok(booking) => booking,
        Err(error) => {
            tracing::warn!(error = %error, booking_id = %path.booking_id, "PMS booking lookup unavailable");
            return Ok(Json(json!({ "data": null, "pms_available": false })));
        }
    };
    let Some(booking) = booking else {
        return Ok(Json(json!({ "data": null, "pms_available": true })));
    };

    let rows = [booking];
    let context = merge_context(&state, &rows).await;
    Ok(Json(json!({
        "data": resolve_booking(&rows[0], &context),
        "pms_available": true
    })))
}

/// Gather every non-PMS layer for `rows`. A store that fails is logged and left
/// empty so the merge still returns PMS data.
async fn merge_context(state: &AppState, rows: &[PmsBooking]) -> MergeContext {
    let guest_orders = state.bot_store.guest_orders().await;
    let profiles = state.bot_store.user_profiles().await;

    let mut context = MergeContext {
        guest_orders,
        profiles,
        room_types: state.room_types.clone(),
        ..MergeContext::default()
    };

    if context.guest_orders.is_empty() {
        tracing::debug!("No bot guest orders available for merge");
    } else {
        tracing::debug!(guest_orders = context.guest_orders.len(), "Loaded bot guest orders");
    }

    let Some(pool) = state.db_pool.as_ref() else {
        return context;
    };

    let mut seen = HashSet::new();
    let keys = rows
        .iter()
        .flat_map(booking_lookup_keys)
        .filter(|key| seen.insert(key.clone()))
        .collect::<Vec<_>>();

    match get_supplements(pool, &keys).await {
        Ok(supplements) => context.supplements = supplements,
        Err(error) => tracing::warn!(error = %error, "Supplements unavailable; merging without them"),
    }
    match list_active_sessions(pool).await {
        Ok(sessions) => context.sessions = SessionIndex::from_sessions(&sessions),
        Err(error) => tracing::warn!(error = %error, "Bot sessions unavailable; merging without them"),
    }

    context
}
