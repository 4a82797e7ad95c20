use axum::{routing::get, Router};

use crate::state::AppState;

pub mod bookings;
pub mod bot_sessions;
pub mod health;
pub mod room_acknowledgments;
pub mod supplements;
pub mod walk_ins;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(bookings::router())
        .merge(supplements::router())
        .merge(bot_sessions::router())
        .merge(room_acknowledgments::router())
        .merge(walk_ins::router())
}
