use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use codebuild_logs_aws::{Services, presigned_log_url};
use codebuild_logs_core::{AppError, config::Config};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BuildLogsQuery {
    key: Option<String>,
}

/// Redirect to a short-lived download URL for an archived build log.
pub async fn get_build_logs(
    State(config): State<Arc<Config>>,
    State(services): State<Services>,
    Query(query): Query<BuildLogsQuery>,
) -> Result<Response, AppError> {
    let Some(key) = query.key.filter(|key| !key.is_empty()) else {
        return Err(AppError::BadRequest("missing expected query parameter: key".to_string()));
    };
    match presigned_log_url(services.archive.as_ref(), &key, config.url_ttl()).await? {
        Some(url) => Ok(Redirect::temporary(&url).into_response()),
        None => Err(AppError::Status(StatusCode::NOT_FOUND)),
    }
}
