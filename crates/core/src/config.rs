use std::{fs::File, io::BufReader, path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// The CodeBuild project this deployment manages.
    pub project_name: String,
    #[serde(default = "default_expiration_in_days")]
    pub expiration_in_days: u32,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default)]
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub aws: AwsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self { Self { port: 8080 } }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    pub bucket: String,
    /// Public endpoint of the log proxy; comments link here with `?key=`.
    pub api_endpoint: Url,
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// Secrets Manager id of a GitHub token. Takes priority over the project's OAuth token.
    pub token_secret: Option<String>,
    #[serde(default)]
    pub delete_previous_comments: bool,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

fn default_log_level() -> String { "info".to_string() }

fn default_expiration_in_days() -> u32 { 90 }

fn default_upstream_timeout_secs() -> u64 { 30 }

fn default_url_ttl_secs() -> u64 { 600 }

impl Config {
    /// Load `config.yml` if it exists, otherwise read the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() { Self::from_yaml_file(path) } else { Self::from_env() }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::configuration(format!("failed to open {}: {e}", path.display()))
        })?;
        let config: Self = serde_yaml::from_reader(BufReader::new(file)).map_err(|e| {
            Error::configuration(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()
    }

    pub fn from_env() -> Result<Self> { Self::from_vars(|name| std::env::var(name).ok()) }

    pub fn from_vars(vars: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| vars(name).filter(|v| !v.trim().is_empty());
        let config = Self {
            log_level: var("LOG_LEVEL").unwrap_or_else(default_log_level),
            project_name: required(&var, "CODEBUILD_PROJECT_NAME")?,
            expiration_in_days: parsed(&var, "EXPIRATION_IN_DAYS", default_expiration_in_days())?,
            upstream_timeout_secs: parsed(
                &var,
                "UPSTREAM_TIMEOUT_SECONDS",
                default_upstream_timeout_secs(),
            )?,
            server: ServerConfig { port: parsed(&var, "PORT", ServerConfig::default().port)? },
            archive: ArchiveConfig {
                bucket: required(&var, "BUILD_LOGS_BUCKET_NAME")?,
                api_endpoint: parsed_required(&var, "BUILD_LOGS_API_ENDPOINT")?,
                url_ttl_secs: parsed(&var, "LOG_URL_TTL_SECONDS", default_url_ttl_secs())?,
            },
            github: GitHubConfig {
                token_secret: var("GITHUB_OAUTH_TOKEN_SECRET_ARN"),
                delete_previous_comments: match var("DELETE_PREVIOUS_COMMENTS") {
                    Some(value) => parse_bool("DELETE_PREVIOUS_COMMENTS", &value)?,
                    None => false,
                },
                api_url: var("GITHUB_API_URL"),
            },
            aws: AwsConfig {
                region: var("AWS_DEFAULT_REGION").or_else(|| var("AWS_REGION")),
                endpoint_url: var("AWS_ENDPOINT_URL"),
            },
        };
        config.validate()
    }

    fn validate(mut self) -> Result<Self> {
        if self.project_name.is_empty() {
            return Err(Error::configuration("project name must not be empty"));
        }
        if self.archive.bucket.is_empty() {
            return Err(Error::configuration("archive bucket must not be empty"));
        }
        // An empty secret reference means "use the project's OAuth token".
        if self.github.token_secret.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.github.token_secret = None;
        }
        Ok(self)
    }

    pub fn upstream_timeout(&self) -> Duration { Duration::from_secs(self.upstream_timeout_secs) }

    pub fn url_ttl(&self) -> Duration { Duration::from_secs(self.archive.url_ttl_secs) }
}

fn required(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    var(name).ok_or_else(|| Error::configuration(format!("missing environment variable {name}")))
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where T::Err: std::fmt::Display {
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| Error::configuration(format!("invalid {name} {value:?}: {e}"))),
        None => Ok(default),
    }
}

fn parsed_required<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<T>
where T::Err: std::fmt::Display {
    let value = required(var, name)?;
    value.trim().parse().map_err(|e| Error::configuration(format!("invalid {name} {value:?}: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::configuration(format!("invalid {name} {value:?}: expected true or false"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("CODEBUILD_PROJECT_NAME", "TestProject"),
        ("BUILD_LOGS_BUCKET_NAME", "TestBucket"),
        ("BUILD_LOGS_API_ENDPOINT", "https://logs.example.com/buildlogs"),
    ];

    #[test]
    fn defaults() {
        let config = Config::from_vars(vars(BASE)).unwrap();
        assert_eq!(config.project_name, "TestProject");
        assert_eq!(config.archive.bucket, "TestBucket");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.expiration_in_days, 90);
        assert_eq!(config.url_ttl(), Duration::from_secs(600));
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
        assert!(!config.github.delete_previous_comments);
        assert!(config.github.token_secret.is_none());
    }

    #[test]
    fn overrides() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("EXPIRATION_IN_DAYS", "20"),
            ("DELETE_PREVIOUS_COMMENTS", "True"),
            ("GITHUB_OAUTH_TOKEN_SECRET_ARN", "arn:secret"),
            ("AWS_DEFAULT_REGION", "us-east-1"),
            ("LOG_LEVEL", "DEBUG"),
        ]);
        let config = Config::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.expiration_in_days, 20);
        assert!(config.github.delete_previous_comments);
        assert_eq!(config.github.token_secret.as_deref(), Some("arn:secret"));
        assert_eq!(config.aws.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.log_level, "DEBUG");
    }

    #[test]
    fn empty_secret_reference_is_unset() {
        let mut pairs = BASE.to_vec();
        pairs.push(("GITHUB_OAUTH_TOKEN_SECRET_ARN", ""));
        let config = Config::from_vars(vars(&pairs)).unwrap();
        assert!(config.github.token_secret.is_none());
    }

    #[test]
    fn missing_required() {
        let err = Config::from_vars(vars(&BASE[1..])).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("CODEBUILD_PROJECT_NAME"));
    }

    #[test]
    fn invalid_values() {
        for (name, value) in [
            ("EXPIRATION_IN_DAYS", "soon"),
            ("DELETE_PREVIOUS_COMMENTS", "maybe"),
            ("BUILD_LOGS_API_ENDPOINT", "not a url"),
        ] {
            let mut pairs = BASE.to_vec();
            pairs.retain(|(k, _)| *k != name);
            pairs.push((name, value));
            let err = Config::from_vars(vars(&pairs)).unwrap_err();
            assert!(err.is_configuration(), "{name}");
        }
    }

    #[test]
    fn yaml() {
        let config: Config = serde_yaml::from_str(
            "project_name: TestProject\n\
             archive:\n  bucket: TestBucket\n  api_endpoint: https://logs.example.com/buildlogs\n\
             github:\n  delete_previous_comments: true\n",
        )
        .unwrap();
        let config = config.validate().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.archive.url_ttl_secs, 600);
        assert!(config.github.delete_previous_comments);
    }
}
