//! In-memory GitHub issue threads for tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use codebuild_logs_core::{Error, Result};

use crate::{Connector, IssueComment, IssueComments, RepoSource};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Thread {
    next_id: u64,
    /// `(issue number, comment)` in creation order.
    comments: Vec<(u64, IssueComment)>,
    delete_attempts: Vec<u64>,
    failing_deletes: HashSet<u64>,
    failing_list: bool,
    create_delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct MemoryIssues {
    inner: Mutex<Thread>,
}

impl MemoryIssues {
    pub fn new() -> Self { Self::default() }

    /// Add an existing comment and return its id.
    pub fn insert(&self, issue_number: u64, body: &str) -> u64 {
        let mut thread = lock(&self.inner);
        thread.next_id += 1;
        let id = thread.next_id;
        thread.comments.push((issue_number, IssueComment { id, body: Some(body.to_string()) }));
        id
    }

    pub fn comments(&self, issue_number: u64) -> Vec<IssueComment> {
        lock(&self.inner)
            .comments
            .iter()
            .filter(|(issue, _)| *issue == issue_number)
            .map(|(_, comment)| comment.clone())
            .collect()
    }

    pub fn delete_attempts(&self) -> Vec<u64> { lock(&self.inner).delete_attempts.clone() }

    pub fn fail_delete(&self, comment_id: u64) {
        lock(&self.inner).failing_deletes.insert(comment_id);
    }

    pub fn set_failing_list(&self, failing: bool) { lock(&self.inner).failing_list = failing; }

    /// Make `create_comment` take `delay` before the comment appears.
    pub fn set_create_delay(&self, delay: Duration) {
        lock(&self.inner).create_delay = Some(delay);
    }
}

#[async_trait]
impl IssueComments for MemoryIssues {
    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>> {
        if lock(&self.inner).failing_list {
            return Err(Error::upstream_msg("GitHub list issue comments", "502 Bad Gateway"));
        }
        Ok(self.comments(issue_number))
    }

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<()> {
        let delay = lock(&self.inner).create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.insert(issue_number, body);
        Ok(())
    }

    async fn delete_comment(&self, comment_id: u64) -> Result<()> {
        let mut thread = lock(&self.inner);
        thread.delete_attempts.push(comment_id);
        if thread.failing_deletes.contains(&comment_id) {
            return Err(Error::upstream_msg("GitHub delete issue comment", "403 Forbidden"));
        }
        let before = thread.comments.len();
        thread.comments.retain(|(_, comment)| comment.id != comment_id);
        if thread.comments.len() == before {
            return Err(Error::upstream_msg("GitHub delete issue comment", "404 Not Found"));
        }
        Ok(())
    }
}

/// Hands out the same [`MemoryIssues`] for every repository and records each connection.
pub struct MemoryConnector {
    issues: Arc<MemoryIssues>,
    connects: Mutex<Vec<RepoSource>>,
}

impl MemoryConnector {
    pub fn new(issues: Arc<MemoryIssues>) -> Self { Self { issues, connects: Mutex::default() } }

    pub fn connects(&self) -> Vec<RepoSource> { lock(&self.connects).clone() }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, source: &RepoSource) -> Result<Arc<dyn IssueComments>> {
        lock(&self.connects).push(source.clone());
        Ok(self.issues.clone())
    }
}
