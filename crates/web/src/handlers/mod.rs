use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

mod events;
mod logs;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/events", post(events::post_event))
        .route("/buildlogs", get(logs::get_build_logs))
        .route("/health", get(health))
}

async fn health() -> &'static str { "OK" }
