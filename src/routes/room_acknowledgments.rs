use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    repository::room_acknowledgments::{acknowledge_room, list_acknowledged_rooms},
    schemas::{validate_input, RoomAckInput},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/room-acknowledgments",
        axum::routing::get(list_today).post(acknowledge),
    )
}

async fn list_today(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let today = state.config.local_today();
    let rooms = list_acknowledged_rooms(pool, today).await?;
    Ok(Json(json!({ "data": rooms, "date": today })))
}

async fn acknowledge(
    State(state): State<AppState>,
    Json(payload): Json<RoomAckInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let today = state.config.local_today();
    let room_number = payload.room_number.trim();
    let created = acknowledge_room(pool, room_number, today).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({
            "room_number": room_number,
            "date": today,
            "acknowledged": true,
            "created": created
        })),
    ))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
