use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::bucket::BucketWriter;
use crate::config::{SegmentSinkConfig, DEFAULT_CALL_TIMEOUT};
use crate::error::{ConfigError, SinkError};
use crate::executor::CallTimeoutExecutor;
use crate::factory::WriterFactory;
use crate::record::{JsonLinesFormat, LogRecord, RecordFormat};
use crate::roller::RollTimer;
use crate::sink::LogSink;

/// Host-facing sink: owns the rolling segment writer together with its
/// call-timeout executor and roll timer.
///
/// Construction resolves the backend writer kind and fails fast on
/// configuration mistakes; after that the sink accepts records until
/// [`SegmentSink::shutdown`] is called. Implements [`LogSink`], so it
/// plugs into the tracing layer like any other backend.
pub struct SegmentSink {
    bucket: Arc<BucketWriter>,
    executor: Arc<CallTimeoutExecutor>,
    timer: parking_lot::Mutex<RollTimer>,
    call_timeout: Duration,
}

impl SegmentSink {
    /// Build and start the sink with the default JSON Lines record format.
    ///
    /// Must be called within a Tokio runtime: the roll timer tasks are
    /// spawned here.
    pub fn activate(config: SegmentSinkConfig) -> Result<Self, ConfigError> {
        Self::activate_with_format(config, Arc::new(JsonLinesFormat))
    }

    /// Build and start the sink with a custom record format.
    pub fn activate_with_format(
        mut config: SegmentSinkConfig,
        format: Arc<dyn RecordFormat>,
    ) -> Result<Self, ConfigError> {
        config.normalize();
        config.validate()?;
        let factory = WriterFactory::from_config(&config)?;

        let executor = Arc::new(CallTimeoutExecutor::new(
            config.threads_pool_size,
            config.call_timeout,
        ));
        let bucket = Arc::new(BucketWriter::new(
            config.clone(),
            factory,
            format,
            Arc::clone(&executor),
        ));
        let timer = RollTimer::start(Arc::clone(&bucket), &config);

        Ok(Self {
            bucket,
            executor,
            timer: parking_lot::Mutex::new(timer),
            call_timeout: config.call_timeout,
        })
    }

    /// Forward one record to the rolling segment writer.
    pub async fn append(&self, record: LogRecord) -> Result<(), SinkError> {
        self.bucket.append(record).await
    }

    /// Force buffered bytes of the current segment durable.
    pub async fn sync(&self) -> Result<(), SinkError> {
        self.bucket.sync().await
    }

    /// Stop the timers, close the current segment, and drain the executor.
    ///
    /// The final close is always attempted, even after earlier append
    /// failures; a permanently failed close is logged, never propagated.
    /// The executor is then given `max(default timeout, call_timeout)` to
    /// drain before remaining calls are abandoned.
    pub async fn shutdown(&self, force: bool) {
        self.timer.lock().shutdown();
        if let Err(e) = self.bucket.close(force).await {
            eprintln!("segment sink: closing current segment at shutdown failed: {e}");
        }
        let grace = self.call_timeout.max(DEFAULT_CALL_TIMEOUT);
        self.executor.shutdown(grace).await;
    }
}

#[async_trait]
impl LogSink for SegmentSink {
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.bucket.append(record.clone()).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.bucket.sync().await?;
        Ok(())
    }

    async fn shutdown(&self) {
        SegmentSink::shutdown(self, true).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "zstd")]
    use crate::factory::WriterKind;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::tempdir;

    fn record(message: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level: "INFO".to_string(),
            target: "test".to_string(),
            module_path: None,
            file: None,
            line: None,
            fields: BTreeMap::new(),
            message: Some(message.to_string()),
            service_name: None,
        }
    }

    #[cfg(feature = "zstd")]
    #[tokio::test]
    async fn activation_fails_fast_on_bad_configuration() {
        let config =
            SegmentSinkConfig::new("/tmp/segments").with_writer_type(WriterKind::CompressedStream);
        assert!(matches!(
            SegmentSink::activate(config),
            Err(ConfigError::MissingCodec)
        ));
    }

    #[tokio::test]
    async fn records_roll_into_finalized_segments() {
        let dir = tempdir().unwrap();
        let config = SegmentSinkConfig::new(dir.path())
            .with_file_name("app")
            .with_roll_interval(Duration::ZERO)
            .with_roll_count(2)
            .with_roll_size(0)
            .with_batch_size(1)
            .with_call_timeout(Duration::from_secs(2));
        let sink = SegmentSink::activate(config).unwrap();

        for i in 0..5 {
            LogSink::send(&sink, &record(&format!("message {i}")))
                .await
                .unwrap();
        }
        sink.shutdown(false).await;

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        // 5 records with roll_count=2: segments of 2, 2 and 1 records
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.starts_with("app.")));
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));

        let mut total_lines = 0;
        for name in &names {
            let contents = std::fs::read_to_string(dir.path().join(name)).unwrap();
            for line in contents.lines() {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                assert!(value["message"]
                    .as_str()
                    .unwrap()
                    .starts_with("message "));
                total_lines += 1;
            }
        }
        assert_eq!(total_lines, 5);
    }

    #[tokio::test]
    async fn appends_after_shutdown_are_rejected() {
        let dir = tempdir().unwrap();
        let config = SegmentSinkConfig::new(dir.path())
            .with_roll_interval(Duration::ZERO)
            .with_batch_size(0);
        let sink = SegmentSink::activate(config).unwrap();

        sink.append(record("before")).await.unwrap();
        sink.shutdown(false).await;

        let err = sink.append(record("after")).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }
}
