pub mod comments;
pub mod memory;

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use codebuild_logs_aws::{BuildService, SecretStore, Services};
use codebuild_logs_core::{
    Error, Result,
    config::Config,
    error::with_timeout,
    models::{SourceAuth, Token},
};
pub use comments::{HIDDEN_MARKER, IssueComment, IssueComments, StatusComment};
use octocrab::Octocrab;
use regex::Regex;
use tokio::sync::OnceCell;

use crate::comments::OctocrabIssues;

const SUPPORTED_SOURCE_TYPE: &str = "GITHUB";
const OAUTH_AUTH_TYPE: &str = "OAUTH";

/// Repository coordinates and credential, before any GitHub session exists.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RepoSource {
    pub owner: String,
    pub repo: String,
    pub token: Token,
}

/// An authenticated handle to the managed repository.
#[derive(Clone)]
pub struct RepoHandle {
    pub owner: String,
    pub repo: String,
    pub comments: Arc<dyn IssueComments>,
}

/// Opens a GitHub session for a repository.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, source: &RepoSource) -> Result<Arc<dyn IssueComments>>;
}

pub struct OctocrabConnector {
    api_url: Option<String>,
    timeout: Duration,
}

impl OctocrabConnector {
    pub fn new(config: &Config) -> Self {
        Self { api_url: config.github.api_url.clone(), timeout: config.upstream_timeout() }
    }
}

impl OctocrabConnector {
    // The builder isn't `Send`, so it must not live across an await point.
    fn client(&self, token: &Token) -> Result<Octocrab> {
        let mut builder = Octocrab::builder().personal_token(token.expose().to_string());
        if let Some(api_url) = &self.api_url {
            builder = builder.base_uri(api_url.as_str()).map_err(|e| {
                Error::configuration(format!("invalid GitHub API URL {api_url}: {e}"))
            })?;
        }
        builder.build().map_err(|e| Error::upstream("GitHub client", e))
    }
}

#[async_trait]
impl Connector for OctocrabConnector {
    async fn connect(&self, source: &RepoSource) -> Result<Arc<dyn IssueComments>> {
        let client = self.client(&source.token)?;
        let repository = with_timeout("GitHub get repository", self.timeout, async {
            client
                .repos(&source.owner, &source.repo)
                .get()
                .await
                .map_err(|e| Error::upstream("GitHub get repository", e))
        })
        .await?;
        tracing::info!(
            "Connected to GitHub repository {}",
            repository
                .full_name
                .unwrap_or_else(|| format!("{}/{}", source.owner, source.repo))
        );
        Ok(Arc::new(OctocrabIssues::new(
            client,
            source.owner.clone(),
            source.repo.clone(),
            self.timeout,
        )))
    }
}

/// Resolves the managed repository from the CodeBuild project configuration, once per process.
pub struct GitHub {
    project_name: String,
    token_secret: Option<String>,
    builds: Arc<dyn BuildService>,
    secrets: Arc<dyn SecretStore>,
    connector: Arc<dyn Connector>,
    repo: OnceCell<RepoHandle>,
}

impl GitHub {
    pub fn new(config: &Config, services: &Services, connector: Arc<dyn Connector>) -> Self {
        Self {
            project_name: config.project_name.clone(),
            token_secret: config.github.token_secret.clone().filter(|s| !s.is_empty()),
            builds: services.builds.clone(),
            secrets: services.secrets.clone(),
            connector,
            repo: OnceCell::new(),
        }
    }

    /// The repository handle, resolved on first use. Failures are not cached.
    pub async fn repo(&self) -> Result<&RepoHandle> {
        self.repo
            .get_or_try_init(|| async {
                let source = self.resolve_source().await?;
                tracing::info!(
                    "Resolved GitHub repository {}/{} for project {}",
                    source.owner,
                    source.repo,
                    self.project_name
                );
                let comments = self.connector.connect(&source).await?;
                Ok(RepoHandle { owner: source.owner, repo: source.repo, comments })
            })
            .await
    }

    /// Inspect the project's source configuration and pick a credential.
    ///
    /// A configured secret always wins over the project's OAuth token, which is then never used.
    pub async fn resolve_source(&self) -> Result<RepoSource> {
        let source = self.builds.get_project_source(&self.project_name).await?;
        if source.source_type != SUPPORTED_SOURCE_TYPE {
            return Err(Error::configuration(format!(
                "project {} source is not {SUPPORTED_SOURCE_TYPE}: {}",
                self.project_name, source.source_type
            )));
        }

        let token = if let Some(secret_id) = &self.token_secret {
            tracing::debug!("Using GitHub token from secret {}", secret_id);
            let value = self.secrets.secret_string(secret_id).await?;
            if value.trim().is_empty() {
                return Err(Error::configuration(format!("secret {secret_id} is empty")));
            }
            Token::new(value.trim())
        } else {
            match &source.auth {
                Some(SourceAuth { auth_type, resource: Some(resource) })
                    if auth_type == OAUTH_AUTH_TYPE && !resource.is_empty() =>
                {
                    tracing::debug!("Using project {} OAuth token", self.project_name);
                    Token::new(resource.as_str())
                }
                Some(SourceAuth { auth_type, .. }) if auth_type == OAUTH_AUTH_TYPE => {
                    return Err(Error::configuration(format!(
                        "project {} OAuth resource is empty, and no GitHub token secret is \
                         configured",
                        self.project_name
                    )));
                }
                Some(SourceAuth { auth_type, .. }) => {
                    return Err(Error::configuration(format!(
                        "project {} auth type is not {OAUTH_AUTH_TYPE}: {auth_type}, \
                         and no GitHub token secret is configured",
                        self.project_name
                    )));
                }
                None => {
                    return Err(Error::configuration(format!(
                        "project {} has no source auth and no GitHub token secret is configured",
                        self.project_name
                    )));
                }
            }
        };

        let location = source.location.as_deref().unwrap_or_default();
        let (owner, repo) = extract_github_url(location).ok_or_else(|| {
            Error::configuration(format!("unsupported GitHub source location: {location:?}"))
        })?;
        Ok(RepoSource { owner: owner.to_string(), repo: repo.to_string(), token })
    }
}

/// Extract `(owner, repo)` from a `https://github.com/<owner>/<repo>[.git]` location.
pub fn extract_github_url(url: &str) -> Option<(&str, &str)> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let caps = REGEX
        .get_or_init(|| {
            Regex::new(
                r"^https?://(?:[^@/]+@)?github\.com/(?P<owner>[^/]+)/(?P<repo>[^/]+?)(?:\.git)?/?$",
            )
            .unwrap()
        })
        .captures(url)?;
    let owner = caps.name("owner").map(|m| m.as_str()).unwrap_or_default();
    let repo = caps.name("repo").map(|m| m.as_str()).unwrap_or_default();
    Some((owner, repo))
}
