//! In-memory service implementations for tests and local runs.
//!
//! Thread-safe via `Mutex`. Every fake records the requests it receives so tests can assert on
//! exactly which upstream calls were made.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use codebuild_logs_core::{
    Error, Result,
    models::{BuildRecord, LogEventPage, LogLocation, ObjectLookup, ProjectSourceConfig},
};

use crate::{ArchiveStore, BuildService, LogService, SecretStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryBuildService {
    builds: Mutex<HashMap<String, BuildRecord>>,
    projects: Mutex<HashMap<String, ProjectSourceConfig>>,
    build_requests: Mutex<Vec<String>>,
    project_requests: Mutex<Vec<String>>,
}

impl MemoryBuildService {
    pub fn new() -> Self { Self::default() }

    pub fn insert_build(&self, record: BuildRecord) {
        lock(&self.builds).insert(record.id.clone(), record);
    }

    pub fn insert_project(&self, name: &str, source: ProjectSourceConfig) {
        lock(&self.projects).insert(name.to_string(), source);
    }

    pub fn build_requests(&self) -> Vec<String> { lock(&self.build_requests).clone() }

    pub fn project_requests(&self) -> Vec<String> { lock(&self.project_requests).clone() }
}

#[async_trait]
impl BuildService for MemoryBuildService {
    async fn get_build(&self, build_id: &str) -> Result<BuildRecord> {
        lock(&self.build_requests).push(build_id.to_string());
        lock(&self.builds).get(build_id).cloned().ok_or_else(|| {
            Error::upstream_msg("CodeBuild BatchGetBuilds", format!("build {build_id} not found"))
        })
    }

    async fn get_project_source(&self, project_name: &str) -> Result<ProjectSourceConfig> {
        lock(&self.project_requests).push(project_name.to_string());
        lock(&self.projects).get(project_name).cloned().ok_or_else(|| {
            Error::upstream_msg(
                "CodeBuild BatchGetProjects",
                format!("project {project_name} not found"),
            )
        })
    }
}

/// Log streams split into pages. Continuation tokens are page indices.
#[derive(Debug, Default)]
pub struct MemoryLogService {
    streams: Mutex<HashMap<LogLocation, Vec<Vec<String>>>>,
    requests: Mutex<Vec<(LogLocation, Option<String>)>>,
    failing: Mutex<bool>,
}

impl MemoryLogService {
    pub fn new() -> Self { Self::default() }

    pub fn insert_stream(&self, location: LogLocation, pages: &[&[&str]]) {
        let pages = pages
            .iter()
            .map(|page| page.iter().map(|message| message.to_string()).collect())
            .collect();
        lock(&self.streams).insert(location, pages);
    }

    pub fn set_failing(&self, failing: bool) { *lock(&self.failing) = failing; }

    pub fn requests(&self) -> Vec<(LogLocation, Option<String>)> { lock(&self.requests).clone() }
}

#[async_trait]
impl LogService for MemoryLogService {
    async fn filter_events(
        &self,
        location: &LogLocation,
        next_token: Option<String>,
    ) -> Result<LogEventPage> {
        lock(&self.requests).push((location.clone(), next_token.clone()));
        if *lock(&self.failing) {
            return Err(Error::upstream_msg(
                "CloudWatch Logs FilterLogEvents",
                "service unavailable",
            ));
        }
        let index = match next_token {
            Some(token) => token.parse::<usize>().map_err(|e| {
                Error::upstream_msg("CloudWatch Logs FilterLogEvents", format!("bad token: {e}"))
            })?,
            None => 0,
        };
        let streams = lock(&self.streams);
        let Some(pages) = streams.get(location) else {
            return Ok(LogEventPage::default());
        };
        Ok(LogEventPage {
            messages: pages.get(index).cloned().unwrap_or_default(),
            next_token: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StoredObject {
    pub body: String,
    pub content_type: String,
}

#[derive(Debug)]
pub struct MemoryArchive {
    bucket: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    puts: Mutex<Vec<String>>,
    head_requests: Mutex<Vec<String>>,
    presign_requests: Mutex<Vec<(String, Duration)>>,
    failing_heads: Mutex<HashSet<String>>,
    failing_puts: Mutex<bool>,
}

impl MemoryArchive {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::default(),
            puts: Mutex::default(),
            head_requests: Mutex::default(),
            presign_requests: Mutex::default(),
            failing_heads: Mutex::default(),
            failing_puts: Mutex::default(),
        }
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = lock(&self.objects).keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Keys of every `put_object` call, in order.
    pub fn puts(&self) -> Vec<String> { lock(&self.puts).clone() }

    pub fn head_requests(&self) -> Vec<String> { lock(&self.head_requests).clone() }

    pub fn presign_requests(&self) -> Vec<(String, Duration)> {
        lock(&self.presign_requests).clone()
    }

    /// Make `head_object` fail with an error other than "not found" for `key`.
    pub fn fail_head(&self, key: &str) { lock(&self.failing_heads).insert(key.to_string()); }

    pub fn set_failing_puts(&self, failing: bool) { *lock(&self.failing_puts) = failing; }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    fn bucket(&self) -> &str { &self.bucket }

    async fn put_object(&self, key: &str, body: String, content_type: &str) -> Result<()> {
        lock(&self.puts).push(key.to_string());
        if *lock(&self.failing_puts) {
            return Err(Error::upstream_msg("S3 PutObject", "access denied"));
        }
        lock(&self.objects)
            .insert(key.to_string(), StoredObject { body, content_type: content_type.to_string() });
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<ObjectLookup> {
        lock(&self.head_requests).push(key.to_string());
        if lock(&self.failing_heads).contains(key) {
            return Err(Error::upstream_msg("S3 HeadObject", "access denied"));
        }
        Ok(if lock(&self.objects).contains_key(key) {
            ObjectLookup::Found
        } else {
            ObjectLookup::NotFound
        })
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        lock(&self.presign_requests).push((key.to_string(), expires_in));
        Ok(format!("https://{}.s3.memory/{}?expires={}", self.bucket, key, expires_in.as_secs()))
    }
}

#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, secret_id: &str, value: &str) {
        lock(&self.secrets).insert(secret_id.to_string(), value.to_string());
    }

    pub fn requests(&self) -> Vec<String> { lock(&self.requests).clone() }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn secret_string(&self, secret_id: &str) -> Result<String> {
        lock(&self.requests).push(secret_id.to_string());
        lock(&self.secrets).get(secret_id).cloned().ok_or_else(|| {
            Error::upstream_msg(
                "Secrets Manager GetSecretValue",
                format!("secret {secret_id} not found"),
            )
        })
    }
}
