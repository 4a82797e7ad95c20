use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    repository::supplements::{get_supplement, upsert_supplement, SupplementPatch},
    schemas::{validate_input, BookingPath, UpdateSupplementInput},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/supplements/{booking_id}",
        axum::routing::get(read_supplement).patch(update_supplement),
    )
}

async fn read_supplement(
    State(state): State<AppState>,
    Path(path): Path<BookingPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let supplement = get_supplement(pool, path.booking_id.trim()).await?;
    Ok(Json(json!({ "data": supplement })))
}

async fn update_supplement(
    State(state): State<AppState>,
    Path(path): Path<BookingPath>,
    Json(payload): Json<UpdateSupplementInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let booking_id = path.booking_id.trim();
    if booking_id.is_empty() {
        return Err(AppError::BadRequest("booking_id is required.".to_string()));
    }
    let pool = db_pool(&state)?;
    let patch = SupplementPatch::from(payload);
    let supplement = upsert_supplement(pool, booking_id, &patch).await?;
    tracing::info!(booking_id = %booking_id, "Supplement updated");
    Ok(Json(json!({ "data": supplement })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
