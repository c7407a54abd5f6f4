use codebuild_logs_aws::{ArchiveStore, LogService};
use codebuild_logs_core::{
    Result,
    models::{ArchivedLogRef, BuildRecord, LogLocation},
};

const LOG_CONTENT_TYPE: &str = "text/plain";

/// Archive object key for a build's log stream.
pub fn archive_key(logs: &LogLocation) -> String { format!("{}/build.log", logs.stream_name) }

/// Copy a build's log stream into the archive as a single object.
///
/// Messages are concatenated verbatim in the order the log service returns them. The key only
/// depends on the stream name, so archiving the same build again replaces the object.
pub async fn archive_logs(
    logs: &dyn LogService,
    archive: &dyn ArchiveStore,
    record: &BuildRecord,
) -> Result<ArchivedLogRef> {
    let mut content = String::new();
    let mut next_token = None;
    let mut pages = 0;
    loop {
        let page = logs.filter_events(&record.logs, next_token).await?;
        pages += 1;
        for message in &page.messages {
            content.push_str(message);
        }
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    let key = archive_key(&record.logs);
    tracing::debug!(
        "Archiving {} bytes ({} pages) of build {} logs to s3://{}/{}",
        content.len(),
        pages,
        record.id,
        archive.bucket(),
        key
    );
    archive.put_object(&key, content, LOG_CONTENT_TYPE).await?;
    Ok(ArchivedLogRef { bucket: archive.bucket().to_string(), key })
}

#[cfg(test)]
mod tests {
    use codebuild_logs_aws::memory::{MemoryArchive, MemoryLogService};
    use codebuild_logs_core::Error;

    use super::*;

    fn location() -> LogLocation {
        LogLocation { group_name: "log-group".into(), stream_name: "log-stream".into() }
    }

    fn record() -> BuildRecord {
        BuildRecord {
            id: "some-build".into(),
            source_version: "pr/123".into(),
            commit_id: None,
            logs: location(),
        }
    }

    #[tokio::test]
    async fn concatenates_pages_in_order() {
        let logs = MemoryLogService::new();
        logs.insert_stream(location(), &[&["foo", "bar"], &["baz", "blah"]]);
        let archive = MemoryArchive::new("TestBucket");

        let archived = archive_logs(&logs, &archive, &record()).await.unwrap();

        assert_eq!(archived, ArchivedLogRef {
            bucket: "TestBucket".into(),
            key: "log-stream/build.log".into()
        });
        let object = archive.object("log-stream/build.log").unwrap();
        assert_eq!(object.body, "foobarbazblah");
        assert_eq!(object.content_type, "text/plain");
        assert_eq!(logs.requests(), vec![(location(), None), (location(), Some("1".to_string()))]);
    }

    #[tokio::test]
    async fn keeps_message_content_verbatim() {
        let logs = MemoryLogService::new();
        logs.insert_stream(location(), &[&["[Container] Running\n", "", "line 2\n"]]);
        let archive = MemoryArchive::new("TestBucket");
        archive_logs(&logs, &archive, &record()).await.unwrap();
        assert_eq!(
            archive.object("log-stream/build.log").unwrap().body,
            "[Container] Running\nline 2\n"
        );
    }

    #[tokio::test]
    async fn empty_stream_writes_empty_object() {
        let logs = MemoryLogService::new();
        let archive = MemoryArchive::new("TestBucket");
        archive_logs(&logs, &archive, &record()).await.unwrap();
        assert_eq!(archive.object("log-stream/build.log").unwrap().body, "");
    }

    #[tokio::test]
    async fn archiving_twice_replaces() {
        let logs = MemoryLogService::new();
        logs.insert_stream(location(), &[&["first"]]);
        let archive = MemoryArchive::new("TestBucket");
        archive_logs(&logs, &archive, &record()).await.unwrap();
        logs.insert_stream(location(), &[&["second"]]);
        archive_logs(&logs, &archive, &record()).await.unwrap();

        assert_eq!(archive.keys(), vec!["log-stream/build.log"]);
        assert_eq!(archive.object("log-stream/build.log").unwrap().body, "second");
    }

    #[tokio::test]
    async fn paging_failure() {
        let logs = MemoryLogService::new();
        logs.set_failing(true);
        let archive = MemoryArchive::new("TestBucket");
        let err = archive_logs(&logs, &archive, &record()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
        assert!(archive.puts().is_empty());
    }

    #[tokio::test]
    async fn write_failure() {
        let logs = MemoryLogService::new();
        logs.insert_stream(location(), &[&["foo"]]);
        let archive = MemoryArchive::new("TestBucket");
        archive.set_failing_puts(true);
        let err = archive_logs(&logs, &archive, &record()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
    }
}
