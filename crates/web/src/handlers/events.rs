use anyhow::Context;
use axum::{Json, extract::State};
use codebuild_logs_core::{AppError, models::BuildEvent};
use codebuild_logs_events::{Outcome, SkipReason};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct EventResponse {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pr_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs_url: Option<String>,
}

impl From<Outcome> for EventResponse {
    fn from(outcome: Outcome) -> Self {
        let outcome_str = outcome.as_str();
        match outcome {
            Outcome::Skipped(reason) => {
                Self { outcome: outcome_str, reason: Some(reason), pr_id: None, logs_url: None }
            }
            Outcome::Processed { pr_id, logs_url, .. } => Self {
                outcome: outcome_str,
                reason: None,
                pr_id: Some(pr_id),
                logs_url: Some(logs_url),
            },
        }
    }
}

/// Build state change events, delivered by an EventBridge API destination.
///
/// Processing runs in its own task and always completes, even if the client disconnects or the
/// request times out. Failures return 500 so the event source's retry policy applies.
pub async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<BuildEvent>,
) -> Result<Json<EventResponse>, AppError> {
    let processor = state.processor.clone();
    let task = tokio::spawn(async move {
        let result = processor.process(&event).await;
        match &result {
            Ok(outcome) => tracing::debug!("Build {}: {}", event.detail.build_id, outcome),
            Err(e) if e.is_configuration() => {
                tracing::error!("Configuration error, fix the deployment: {e}");
            }
            Err(_) => {}
        }
        result
    });
    let outcome = task.await.context("Event processing task failed")??;
    Ok(Json(outcome.into()))
}
