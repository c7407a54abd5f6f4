use std::sync::{Arc, OnceLock};

use codebuild_logs_aws::BuildService;
use codebuild_logs_core::{
    Result,
    models::{BuildEvent, BuildRecord},
};
use regex::Regex;
use tokio::sync::OnceCell;

/// A build referenced by an event. Details are fetched from CodeBuild on first use.
pub struct Build {
    pub id: String,
    pub project_name: String,
    pub status: String,
    builds: Arc<dyn BuildService>,
    record: OnceCell<BuildRecord>,
}

impl Build {
    pub fn new(event: &BuildEvent, builds: Arc<dyn BuildService>) -> Self {
        Self {
            id: event.detail.build_id.clone(),
            project_name: event.detail.project_name.clone(),
            status: event.detail.build_status.clone(),
            builds,
            record: OnceCell::new(),
        }
    }

    pub async fn record(&self) -> Result<&BuildRecord> {
        self.record.get_or_try_init(|| self.builds.get_build(&self.id)).await
    }

    /// The pull request this build was triggered for, if any.
    pub async fn pr_id(&self) -> Result<Option<u64>> {
        Ok(pr_id(&self.record().await?.source_version))
    }

    pub async fn is_pr_build(&self) -> Result<bool> { Ok(self.pr_id().await?.is_some()) }
}

/// Parse a `pr/<number>` source version. Only matches at the start of the string.
pub fn pr_id(source_version: &str) -> Option<u64> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = REGEX.get_or_init(|| Regex::new(r"^pr/(?P<id>\d+)").unwrap());
    regex.captures(source_version)?.name("id")?.as_str().parse().ok()
}
