use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    schemas::{validate_input, ConfirmWalkInQuery, CreateWalkInInput, WalkInPath},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/walk-ins",
            axum::routing::get(list_walk_ins).post(create_walk_in),
        )
        .route("/walk-ins/reconcile", axum::routing::post(reconcile_walk_ins))
        .route(
            "/walk-ins/{order_id}/confirm",
            axum::routing::patch(confirm_walk_in),
        )
        .route(
            "/walk-ins/{order_id}/cancel",
            axum::routing::patch(cancel_walk_in),
        )
}

async fn list_walk_ins(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let entries = state.walk_ins.list().await?;
    Ok(Json(json!({ "data": entries })))
}

async fn create_walk_in(
    State(state): State<AppState>,
    Json(payload): Json<CreateWalkInInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let today = state.config.local_today();
    let entry = state
        .walk_ins
        .create(payload.into_new_walk_in(today))
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": entry }))))
}

async fn reconcile_walk_ins(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let rows = match state.pms.checkin_by_offset(0).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!(error = %error, "PMS unavailable; walk-in reconciliation skipped");
            return Ok(Json(json!({ "data": [], "pms_available": false })));
        }
    };
    let matched = state
        .walk_ins
        .reconcile_today(state.config.local_today(), &rows)
        .await?;
    Ok(Json(json!({ "data": matched, "pms_available": true })))
}

async fn confirm_walk_in(
    State(state): State<AppState>,
    Path(path): Path<WalkInPath>,
    Query(query): Query<ConfirmWalkInQuery>,
) -> AppResult<Json<Value>> {
    let rows = match state.pms.checkin_by_offset(0).await {
        Ok(rows) => rows,
        Err(error) if query.force => {
            tracing::warn!(error = %error, order_id = %path.order_id, "PMS unavailable; forcing walk-in confirmation");
            Vec::new()
        }
        Err(error) => {
            tracing::warn!(error = %error, order_id = %path.order_id, "PMS unavailable; walk-in confirmation deferred");
            return Err(AppError::ServiceUnavailable(
                "PMS is unavailable; retry or confirm with force=true.".to_string(),
            ));
        }
    };

    let outcome = state
        .walk_ins
        .confirm(&path.order_id, &rows, query.force)
        .await?;
    Ok(Json(json!({
        "data": outcome.entry,
        "warning": outcome.warning
    })))
}

async fn cancel_walk_in(
    State(state): State<AppState>,
    Path(path): Path<WalkInPath>,
) -> AppResult<Json<Value>> {
    let entry = state.walk_ins.cancel(&path.order_id).await?;
    Ok(Json(json!({ "data": entry })))
}
