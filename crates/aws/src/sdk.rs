//! AWS SDK-backed service implementations.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use aws_sdk_cloudwatchlogs as cloudwatchlogs;
use aws_sdk_codebuild as codebuild;
use aws_sdk_s3::{
    self as s3, config::Region, error::DisplayErrorContext, presigning::PresigningConfig,
    primitives::ByteStream,
};
use aws_sdk_secretsmanager as secretsmanager;
use codebuild_logs_core::{
    Error, Result,
    config::Config,
    error::with_timeout,
    models::{
        BuildRecord, LogEventPage, LogLocation, ObjectLookup, ProjectSourceConfig, SourceAuth,
    },
};

use crate::{ArchiveStore, BuildService, LogService, SecretStore, Services};

fn sdk_error<E>(operation: &'static str) -> impl FnOnce(E) -> Error
where E: std::error::Error + Send + Sync + 'static {
    move |err| Error::Upstream {
        operation,
        message: DisplayErrorContext(&err).to_string(),
        source: Some(Box::new(err)),
    }
}

impl Services {
    /// Create SDK clients from the default credential chain.
    pub async fn from_config(config: &Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.aws.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &config.aws.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;
        tracing::info!(
            "AWS region: {}",
            sdk_config.region().map(|r| r.as_ref()).unwrap_or("[default]")
        );

        let timeout = config.upstream_timeout();
        let s3_client = if config.aws.endpoint_url.is_some() {
            // Custom endpoints (e.g. LocalStack) don't support virtual-hosted buckets.
            s3::Client::from_conf(
                s3::config::Builder::from(&sdk_config).force_path_style(true).build(),
            )
        } else {
            s3::Client::new(&sdk_config)
        };
        Self {
            builds: Arc::new(CodeBuild { client: codebuild::Client::new(&sdk_config), timeout }),
            logs: Arc::new(CloudWatchLogs {
                client: cloudwatchlogs::Client::new(&sdk_config),
                timeout,
            }),
            archive: Arc::new(S3Archive {
                client: s3_client,
                bucket: config.archive.bucket.clone(),
                timeout,
            }),
            secrets: Arc::new(SecretsManager {
                client: secretsmanager::Client::new(&sdk_config),
                timeout,
            }),
        }
    }
}

pub struct CodeBuild {
    client: codebuild::Client,
    timeout: Duration,
}

#[async_trait]
impl BuildService for CodeBuild {
    async fn get_build(&self, build_id: &str) -> Result<BuildRecord> {
        const OP: &str = "CodeBuild BatchGetBuilds";
        let output = with_timeout(OP, self.timeout, async {
            self.client.batch_get_builds().ids(build_id).send().await.map_err(sdk_error(OP))
        })
        .await?;
        let build = output
            .builds()
            .first()
            .ok_or_else(|| Error::upstream_msg(OP, format!("build {build_id} not found")))?;
        tracing::debug!("Build {} details: {:?}", build_id, build);

        let logs = build
            .logs()
            .ok_or_else(|| Error::upstream_msg(OP, format!("build {build_id} has no logs")))?;
        let (Some(group_name), Some(stream_name)) = (logs.group_name(), logs.stream_name()) else {
            return Err(Error::upstream_msg(
                OP,
                format!("build {build_id} has no CloudWatch Logs location"),
            ));
        };
        Ok(BuildRecord {
            id: build.id().unwrap_or(build_id).to_string(),
            source_version: build.source_version().unwrap_or_default().to_string(),
            commit_id: build.resolved_source_version().map(str::to_string),
            logs: LogLocation {
                group_name: group_name.to_string(),
                stream_name: stream_name.to_string(),
            },
        })
    }

    async fn get_project_source(&self, project_name: &str) -> Result<ProjectSourceConfig> {
        const OP: &str = "CodeBuild BatchGetProjects";
        let output = with_timeout(OP, self.timeout, async {
            self.client.batch_get_projects().names(project_name).send().await.map_err(sdk_error(OP))
        })
        .await?;
        let source = output
            .projects()
            .first()
            .and_then(|project| project.source())
            .ok_or_else(|| Error::upstream_msg(OP, format!("project {project_name} not found")))?;
        Ok(ProjectSourceConfig {
            source_type: source.r#type().as_str().to_string(),
            location: source.location().map(str::to_string),
            auth: source.auth().map(|auth| SourceAuth {
                auth_type: auth.r#type().as_str().to_string(),
                resource: auth.resource().map(str::to_string),
            }),
        })
    }
}

pub struct CloudWatchLogs {
    client: cloudwatchlogs::Client,
    timeout: Duration,
}

#[async_trait]
impl LogService for CloudWatchLogs {
    async fn filter_events(
        &self,
        location: &LogLocation,
        next_token: Option<String>,
    ) -> Result<LogEventPage> {
        const OP: &str = "CloudWatch Logs FilterLogEvents";
        let output = with_timeout(OP, self.timeout, async {
            self.client
                .filter_log_events()
                .log_group_name(&location.group_name)
                .log_stream_names(&location.stream_name)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(sdk_error(OP))
        })
        .await?;
        Ok(LogEventPage {
            messages: output
                .events()
                .iter()
                .filter_map(|event| event.message().map(str::to_string))
                .collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }
}

pub struct S3Archive {
    client: s3::Client,
    bucket: String,
    timeout: Duration,
}

#[async_trait]
impl ArchiveStore for S3Archive {
    fn bucket(&self) -> &str { &self.bucket }

    async fn put_object(&self, key: &str, body: String, content_type: &str) -> Result<()> {
        const OP: &str = "S3 PutObject";
        with_timeout(OP, self.timeout, async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(body.into_bytes()))
                .content_type(content_type)
                .send()
                .await
                .map_err(sdk_error(OP))
        })
        .await?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<ObjectLookup> {
        const OP: &str = "S3 HeadObject";
        with_timeout(OP, self.timeout, async {
            match self.client.head_object().bucket(&self.bucket).key(key).send().await {
                Ok(_) => Ok(ObjectLookup::Found),
                Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                    Ok(ObjectLookup::NotFound)
                }
                Err(err) => Err(sdk_error(OP)(err)),
            }
        })
        .await
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        const OP: &str = "S3 GetObject presign";
        let presigning = PresigningConfig::expires_in(expires_in).map_err(sdk_error(OP))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(sdk_error(OP))?;
        Ok(request.uri().to_string())
    }
}

pub struct SecretsManager {
    client: secretsmanager::Client,
    timeout: Duration,
}

#[async_trait]
impl SecretStore for SecretsManager {
    async fn secret_string(&self, secret_id: &str) -> Result<String> {
        const OP: &str = "Secrets Manager GetSecretValue";
        let output = with_timeout(OP, self.timeout, async {
            self.client.get_secret_value().secret_id(secret_id).send().await.map_err(sdk_error(OP))
        })
        .await?;
        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| {
                Error::upstream_msg(OP, format!("secret {secret_id} has no string value"))
            })
    }
}
