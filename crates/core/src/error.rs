use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures that abort the processing of a build event.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A call to an external service failed, timed out, or returned an unusable response.
    #[error("{operation}: {message}")]
    Upstream {
        operation: &'static str,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// The deployment is misconfigured. Recurs on every event until fixed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn upstream(operation: &'static str, source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self::Upstream { operation, message: source.to_string(), source: Some(source) }
    }

    pub fn upstream_msg(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream { operation, message: message.into(), source: None }
    }

    pub fn configuration(message: impl Into<String>) -> Self { Self::Configuration(message.into()) }

    pub fn is_configuration(&self) -> bool { matches!(self, Self::Configuration(_)) }
}

/// Run an upstream call with an explicit deadline. Expiry is reported as [`Error::Upstream`].
pub async fn with_timeout<T>(
    operation: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::upstream_msg(
            operation,
            format!("timed out after {}ms", timeout.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn timeout_is_upstream_error() {
        let result: Result<()> = with_timeout("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Upstream { operation: "slow call", .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn completed_call_passes_through() {
        let result = with_timeout("fast call", Duration::from_secs(5), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
