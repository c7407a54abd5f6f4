use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::util::UrlExt;

/// A CodeBuild "Build State Change" event. Envelope fields other than `detail` are ignored.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct BuildEvent {
    pub detail: BuildEventDetail,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildEventDetail {
    pub build_id: String,
    pub project_name: String,
    pub build_status: String,
}

/// Authoritative build details as reported by the build service.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BuildRecord {
    pub id: String,
    /// Requested source version, e.g. `pr/123` for pull request builds.
    pub source_version: String,
    /// Commit the source version resolved to.
    pub commit_id: Option<String>,
    pub logs: LogLocation,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LogLocation {
    pub group_name: String,
    pub stream_name: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProjectSourceConfig {
    pub source_type: String,
    pub location: Option<String>,
    pub auth: Option<SourceAuth>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SourceAuth {
    pub auth_type: String,
    pub resource: Option<String>,
}

/// One page of a log stream query.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LogEventPage {
    pub messages: Vec<String>,
    pub next_token: Option<String>,
}

/// Where an archived build log was written.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ArchivedLogRef {
    pub bucket: String,
    pub key: String,
}

impl ArchivedLogRef {
    /// Link through the log proxy, which redirects to a short-lived pre-signed URL.
    pub fn proxy_url(&self, api_endpoint: &Url) -> Url {
        api_endpoint.query_param("key", Some(&self.key))
    }
}

/// Result of an object existence check.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ObjectLookup {
    Found,
    NotFound,
}

/// A GitHub API token. Never printed.
#[derive(Clone, Eq, PartialEq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    pub fn expose(&self) -> &str { &self.0 }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Token(***)") }
}
