//! Interfaces to the AWS services the event processor depends on.
//!
//! Each service is a trait so the processor can be driven by the SDK-backed implementations in
//! [`sdk`] in production and by the in-memory ones in [`memory`] in tests.

pub mod memory;
pub mod sdk;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use codebuild_logs_core::{
    Result,
    models::{BuildRecord, LogEventPage, LogLocation, ObjectLookup, ProjectSourceConfig},
};

/// Build metadata (CodeBuild).
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Fetch a single build. Fails with `Upstream` when the build does not exist.
    async fn get_build(&self, build_id: &str) -> Result<BuildRecord>;

    /// Fetch the source configuration of a build project.
    async fn get_project_source(&self, project_name: &str) -> Result<ProjectSourceConfig>;
}

/// Build log events (CloudWatch Logs).
#[async_trait]
pub trait LogService: Send + Sync {
    /// Fetch one page of events for a log stream, continuing from `next_token` if given.
    async fn filter_events(
        &self,
        location: &LogLocation,
        next_token: Option<String>,
    ) -> Result<LogEventPage>;
}

/// Object storage for archived logs (S3). Bound to a single bucket.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Write an object, replacing any existing object at `key`.
    async fn put_object(&self, key: &str, body: String, content_type: &str) -> Result<()>;

    async fn head_object(&self, key: &str) -> Result<ObjectLookup>;

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> Result<String>;
}

/// Secret values (Secrets Manager).
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn secret_string(&self, secret_id: &str) -> Result<String>;
}

/// Service clients, constructed once at startup and shared by every invocation.
#[derive(Clone)]
pub struct Services {
    pub builds: Arc<dyn BuildService>,
    pub logs: Arc<dyn LogService>,
    pub archive: Arc<dyn ArchiveStore>,
    pub secrets: Arc<dyn SecretStore>,
}

/// Generate a time-limited download URL for an archived object, or `None` if it doesn't exist.
pub async fn presigned_log_url(
    archive: &dyn ArchiveStore,
    key: &str,
    expires_in: Duration,
) -> Result<Option<String>> {
    if key.is_empty() {
        return Ok(None);
    }
    match archive.head_object(key).await? {
        ObjectLookup::NotFound => {
            tracing::debug!("No archived object for key {}", key);
            Ok(None)
        }
        ObjectLookup::Found => archive.presigned_get_url(key, expires_in).await.map(Some),
    }
}
