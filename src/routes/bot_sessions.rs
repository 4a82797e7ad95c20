use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    repository::bot_sessions::{delete_session, get_session, upsert_session},
    schemas::{validate_input, BotSessionInput, BotSessionPath},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/bot/sessions/{user_id}",
        axum::routing::get(read_session)
            .put(save_session)
            .delete(remove_session),
    )
}

async fn read_session(
    State(state): State<AppState>,
    Path(path): Path<BotSessionPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let session = get_session(pool, path.user_id.trim()).await?;
    Ok(Json(json!({ "data": session })))
}

async fn save_session(
    State(state): State<AppState>,
    Path(path): Path<BotSessionPath>,
    Json(payload): Json<BotSessionInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    if let Some(data) = &payload.data {
        if !data.is_object() {
            return Err(AppError::UnprocessableEntity(
                "Session data must be a JSON object.".to_string(),
            ));
        }
    }
    let pool = db_pool(&state)?;
    let session = upsert_session(
        pool,
        path.user_id.trim(),
        payload.state.as_deref(),
        payload.data.as_ref(),
    )
    .await?;
    Ok(Json(json!({ "data": session })))
}

async fn remove_session(
    State(state): State<AppState>,
    Path(path): Path<BotSessionPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_session(pool, path.user_id.trim()).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
