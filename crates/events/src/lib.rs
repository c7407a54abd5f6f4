pub mod archive;
pub mod build;

use std::{fmt, sync::Arc};

use codebuild_logs_aws::Services;
use codebuild_logs_core::{Result, config::Config, models::BuildEvent};
use codebuild_logs_github::{GitHub, StatusComment};
use serde::Serialize;

pub use crate::build::Build;

/// Why an event was ignored.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OtherProject,
    NotPullRequest,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outcome {
    Skipped(SkipReason),
    Processed { pr_id: u64, logs_url: String, deleted_comments: usize },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped(_) => "skipped",
            Self::Processed { .. } => "processed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped ({reason:?})"),
            Self::Processed { pr_id, .. } => write!(f, "processed PR #{pr_id}"),
        }
    }
}

/// Handles build state change events for the configured CodeBuild project.
pub struct Processor {
    config: Arc<Config>,
    services: Services,
    github: Arc<GitHub>,
}

impl Processor {
    pub fn new(config: Arc<Config>, services: Services, github: Arc<GitHub>) -> Self {
        Self { config, services, github }
    }

    /// Process one build event.
    ///
    /// If the event is for the managed project and the build was triggered by a pull request,
    /// archive the build logs and post a comment on the pull request linking to them.
    pub async fn process(&self, event: &BuildEvent) -> Result<Outcome> {
        tracing::debug!("Received event: {:?}", event);

        let build = Build::new(event, self.services.builds.clone());
        if build.project_name != self.config.project_name {
            tracing::debug!("Not our CodeBuild project: {}", build.project_name);
            return Ok(Outcome::Skipped(SkipReason::OtherProject));
        }

        let Some(pr_id) = build.pr_id().await? else {
            tracing::debug!("Not a PR build: {}", build.id);
            return Ok(Outcome::Skipped(SkipReason::NotPullRequest));
        };
        let record = build.record().await?;

        let archived = archive::archive_logs(
            self.services.logs.as_ref(),
            self.services.archive.as_ref(),
            record,
        )
        .await?;
        let logs_url = archived.proxy_url(&self.config.archive.api_endpoint).to_string();
        tracing::info!(
            "Copied build logs for PR build: project={}, pr_id={}, build_logs_url={}",
            build.project_name,
            pr_id,
            logs_url
        );

        let deleted_comments = if self.config.github.delete_previous_comments {
            self.github.delete_previous_comments(pr_id).await?
        } else {
            0
        };
        let comment = StatusComment {
            project_name: &build.project_name,
            commit_id: record.commit_id.as_deref(),
            build_status: &build.status,
            logs_url: &logs_url,
            expiration_in_days: self.config.expiration_in_days,
        };
        self.github.publish_status_comment(pr_id, &comment).await?;

        Ok(Outcome::Processed { pr_id, logs_url, deleted_comments })
    }
}

#[cfg(test)]
mod tests {
    use codebuild_logs_aws::memory::{
        MemoryArchive, MemoryBuildService, MemoryLogService, MemorySecretStore,
    };
    use codebuild_logs_core::{
        Error,
        models::{BuildEventDetail, BuildRecord, LogLocation, ProjectSourceConfig, SourceAuth},
    };
    use codebuild_logs_github::{
        HIDDEN_MARKER,
        memory::{MemoryConnector, MemoryIssues},
    };

    use super::*;

    const PROJECT_NAME: &str = "TestProject";
    const BUILD_ID: &str = "some-build";
    const COMMIT_ID: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    struct Fixture {
        builds: Arc<MemoryBuildService>,
        logs: Arc<MemoryLogService>,
        archive: Arc<MemoryArchive>,
        issues: Arc<MemoryIssues>,
        processor: Processor,
    }

    fn fixture(source_version: &str, delete_previous_comments: bool) -> Fixture {
        let builds = Arc::new(MemoryBuildService::new());
        let logs_location =
            LogLocation { group_name: "log-group".into(), stream_name: "log-stream".into() };
        builds.insert_build(BuildRecord {
            id: BUILD_ID.into(),
            source_version: source_version.into(),
            commit_id: Some(COMMIT_ID.into()),
            logs: logs_location.clone(),
        });
        builds.insert_project(PROJECT_NAME, ProjectSourceConfig {
            source_type: "GITHUB".into(),
            location: Some("https://github.com/gh-user/gh-repo.git".into()),
            auth: Some(SourceAuth { auth_type: "OAUTH".into(), resource: Some("token".into()) }),
        });
        let logs = Arc::new(MemoryLogService::new());
        logs.insert_stream(logs_location, &[&["foo", "bar"], &["baz", "blah"]]);
        let archive = Arc::new(MemoryArchive::new("TestBucket"));
        let issues = Arc::new(MemoryIssues::new());
        let services = Services {
            builds: builds.clone(),
            logs: logs.clone(),
            archive: archive.clone(),
            secrets: Arc::new(MemorySecretStore::new()),
        };
        let config = Arc::new(
            Config::from_vars(|name| match name {
                "CODEBUILD_PROJECT_NAME" => Some(PROJECT_NAME.into()),
                "BUILD_LOGS_BUCKET_NAME" => Some("TestBucket".into()),
                "BUILD_LOGS_API_ENDPOINT" => Some("https://logs.example.com/buildlogs".into()),
                "EXPIRATION_IN_DAYS" => Some("20".into()),
                "DELETE_PREVIOUS_COMMENTS" => Some(delete_previous_comments.to_string()),
                _ => None,
            })
            .unwrap(),
        );
        let github = Arc::new(GitHub::new(
            &config,
            &services,
            Arc::new(MemoryConnector::new(issues.clone())),
        ));
        let processor = Processor::new(config, services, github);
        Fixture { builds, logs, archive, issues, processor }
    }

    fn event(project_name: &str) -> BuildEvent {
        BuildEvent {
            detail: BuildEventDetail {
                build_id: BUILD_ID.into(),
                project_name: project_name.into(),
                build_status: "SUCCEEDED".into(),
            },
        }
    }

    #[tokio::test]
    async fn relevant_pr_build() {
        let f = fixture("pr/123", false);
        let outcome = f.processor.process(&event(PROJECT_NAME)).await.unwrap();

        assert_eq!(outcome, Outcome::Processed {
            pr_id: 123,
            logs_url: "https://logs.example.com/buildlogs?key=log-stream%2Fbuild.log".into(),
            deleted_comments: 0,
        });
        assert_eq!(f.builds.build_requests(), vec![BUILD_ID]);
        assert_eq!(f.archive.puts(), vec!["log-stream/build.log"]);
        assert_eq!(f.archive.object("log-stream/build.log").unwrap().body, "foobarbazblah");

        let comments = f.issues.comments(123);
        assert_eq!(comments.len(), 1);
        let body = comments[0].body.as_deref().unwrap();
        assert!(body.contains(COMMIT_ID));
        assert!(body.contains("* Result: SUCCEEDED"));
        assert!(body.contains("(available for 20 days)"));
        assert!(body.contains(HIDDEN_MARKER));
        assert!(f.issues.delete_attempts().is_empty());
    }

    #[tokio::test]
    async fn other_project() {
        let f = fixture("pr/123", true);
        let outcome = f.processor.process(&event("different-project")).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::OtherProject));
        assert!(f.builds.build_requests().is_empty());
        assert!(f.builds.project_requests().is_empty());
        assert!(f.logs.requests().is_empty());
        assert!(f.archive.puts().is_empty());
        assert!(f.issues.comments(123).is_empty());
    }

    #[tokio::test]
    async fn not_pr_build() {
        let f = fixture("master", true);
        let outcome = f.processor.process(&event(PROJECT_NAME)).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::NotPullRequest));
        assert!(f.logs.requests().is_empty());
        assert!(f.archive.puts().is_empty());
        assert!(f.builds.project_requests().is_empty());
        assert!(f.issues.delete_attempts().is_empty());
    }

    #[tokio::test]
    async fn deletes_previous_comments_first() {
        let f = fixture("pr/123", true);
        let stale = f.issues.insert(123, &format!("old report {HIDDEN_MARKER}"));
        let human = f.issues.insert(123, "please fix the tests");

        let outcome = f.processor.process(&event(PROJECT_NAME)).await.unwrap();

        assert!(matches!(outcome, Outcome::Processed { deleted_comments: 1, .. }));
        assert_eq!(f.issues.delete_attempts(), vec![stale]);
        let comments = f.issues.comments(123);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, human);
        assert!(comments[1].is_status_comment());
    }

    #[tokio::test]
    async fn failed_deletion_still_posts() {
        let f = fixture("pr/123", true);
        let stale = f.issues.insert(123, HIDDEN_MARKER);
        f.issues.fail_delete(stale);

        f.processor.process(&event(PROJECT_NAME)).await.unwrap();

        let comments = f.issues.comments(123);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, stale);
        assert!(comments[1].body.as_deref().unwrap().contains(COMMIT_ID));
    }

    #[tokio::test]
    async fn reprocessing_replaces_archive_and_comment() {
        let f = fixture("pr/123", true);
        f.processor.process(&event(PROJECT_NAME)).await.unwrap();
        f.processor.process(&event(PROJECT_NAME)).await.unwrap();

        assert_eq!(f.archive.keys(), vec!["log-stream/build.log"]);
        let live = f.issues.comments(123).iter().filter(|c| c.is_status_comment()).count();
        assert_eq!(live, 1);
        assert_eq!(f.builds.project_requests().len(), 1);
    }

    #[tokio::test]
    async fn configuration_error_propagates() {
        let f = fixture("pr/123", false);
        f.builds.insert_project(PROJECT_NAME, ProjectSourceConfig {
            source_type: "CODECOMMIT".into(),
            location: None,
            auth: None,
        });

        let err = f.processor.process(&event(PROJECT_NAME)).await.unwrap_err();

        assert!(err.is_configuration());
        assert!(f.issues.comments(123).is_empty());
    }

    #[tokio::test]
    async fn archive_failure_posts_nothing() {
        let f = fixture("pr/123", false);
        f.archive.set_failing_puts(true);

        let err = f.processor.process(&event(PROJECT_NAME)).await.unwrap_err();

        assert!(matches!(err, Error::Upstream { .. }));
        assert!(f.issues.comments(123).is_empty());
    }
}
