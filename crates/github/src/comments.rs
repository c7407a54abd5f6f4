use std::time::Duration;

use async_trait::async_trait;
use codebuild_logs_core::{Error, Result, error::with_timeout};
use octocrab::{Octocrab, models::CommentId};

use crate::GitHub;

/// Hidden marker identifying comments posted by this service.
pub const HIDDEN_MARKER: &str = "<!-- github-codebuild-logs: build status -->";

const SAR_HOMEPAGE: &str = "https://aws.amazon.com/serverless/serverlessrepo/";

/// Fields of a rendered build status comment.
#[derive(Debug, Clone, Copy)]
pub struct StatusComment<'a> {
    pub project_name: &'a str,
    pub commit_id: Option<&'a str>,
    pub build_status: &'a str,
    pub logs_url: &'a str,
    pub expiration_in_days: u32,
}

impl StatusComment<'_> {
    pub fn render(&self) -> String {
        format!(
            "### AWS CodeBuild CI Report\n\
             \n\
             * CodeBuild project: {}\n\
             * Commit ID: {}\n\
             * Result: {}\n\
             * [Build Logs]({}) (available for {} days)\n\
             \n\
             *Powered by github-codebuild-logs, available on the \
             [AWS Serverless Application Repository]({SAR_HOMEPAGE})*\n\
             \n\
             {HIDDEN_MARKER}\n",
            self.project_name,
            self.commit_id.unwrap_or("unknown"),
            self.build_status,
            self.logs_url,
            self.expiration_in_days,
        )
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IssueComment {
    pub id: u64,
    pub body: Option<String>,
}

impl IssueComment {
    pub fn is_status_comment(&self) -> bool {
        self.body.as_deref().is_some_and(|body| body.contains(HIDDEN_MARKER))
    }
}

/// Comment operations on the issue thread of a pull request.
#[async_trait]
pub trait IssueComments: Send + Sync {
    /// All comments on the issue, across every page.
    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>>;

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<()>;

    async fn delete_comment(&self, comment_id: u64) -> Result<()>;
}

pub(crate) struct OctocrabIssues {
    client: Octocrab,
    owner: String,
    repo: String,
    timeout: Duration,
}

impl OctocrabIssues {
    pub(crate) fn new(client: Octocrab, owner: String, repo: String, timeout: Duration) -> Self {
        Self { client, owner, repo, timeout }
    }
}

#[async_trait]
impl IssueComments for OctocrabIssues {
    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>> {
        const OP: &str = "GitHub list issue comments";
        let comments = with_timeout(OP, self.timeout, async {
            let page = self
                .client
                .issues(&self.owner, &self.repo)
                .list_comments(issue_number)
                .per_page(100)
                .send()
                .await
                .map_err(|e| Error::upstream(OP, e))?;
            self.client.all_pages(page).await.map_err(|e| Error::upstream(OP, e))
        })
        .await?;
        Ok(comments
            .into_iter()
            .map(|comment| IssueComment { id: comment.id.into_inner(), body: comment.body })
            .collect())
    }

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<()> {
        const OP: &str = "GitHub create issue comment";
        let comment = with_timeout(OP, self.timeout, async {
            self.client
                .issues(&self.owner, &self.repo)
                .create_comment(issue_number, body)
                .await
                .map_err(|e| Error::upstream(OP, e))
        })
        .await?;
        tracing::debug!("Created comment {} on #{}", comment.id, issue_number);
        Ok(())
    }

    async fn delete_comment(&self, comment_id: u64) -> Result<()> {
        const OP: &str = "GitHub delete issue comment";
        with_timeout(OP, self.timeout, async {
            self.client
                .issues(&self.owner, &self.repo)
                .delete_comment(CommentId(comment_id))
                .await
                .map_err(|e| Error::upstream(OP, e))
        })
        .await
    }
}

impl GitHub {
    /// Post a new status comment on the pull request.
    pub async fn publish_status_comment(
        &self,
        pr_id: u64,
        comment: &StatusComment<'_>,
    ) -> Result<()> {
        let repo = self.repo().await?;
        let body = comment.render();
        tracing::debug!(
            "Publishing PR comment: repo={}/{}, pr_id={}, comment={}",
            repo.owner,
            repo.repo,
            pr_id,
            body
        );
        repo.comments.create_comment(pr_id, &body).await
    }

    /// Delete every status comment previously posted on the pull request.
    ///
    /// Individual deletion failures are logged and skipped. Returns the number deleted.
    pub async fn delete_previous_comments(&self, pr_id: u64) -> Result<usize> {
        let repo = self.repo().await?;
        let comments = repo.comments.list_comments(pr_id).await?;
        let mut deleted = 0;
        for comment in comments.iter().filter(|c| c.is_status_comment()) {
            match repo.comments.delete_comment(comment.id).await {
                Ok(()) => {
                    tracing::debug!("Deleted previous comment {} on #{}", comment.id, pr_id);
                    deleted += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to delete previous comment {}: {}", comment.id, e);
                }
            }
        }
        tracing::info!(
            "Deleted {} previous comments on {}/{}#{}",
            deleted,
            repo.owner,
            repo.repo,
            pr_id
        );
        Ok(deleted)
    }
}
