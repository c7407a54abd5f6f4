pub mod config;
pub mod error;
pub mod models;
pub mod util;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
pub use error::{Error, Result};
use serde::Serialize;

pub enum AppError {
    Status(StatusCode),
    BadRequest(String),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Status(status) => status.into_response(),
            Self::BadRequest(message) => {
                tracing::debug!("Bad request: {message}");
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message })).into_response()
            }
            Self::Internal(err) => {
                tracing::error!("{:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Something went wrong: {}", err))
                    .into_response()
            }
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self { Self::Internal(err.into()) }
}
