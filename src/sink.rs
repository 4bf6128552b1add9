use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`LogRecord`]s produced by the logging layer.
///
/// Implementations persist records somewhere durable: the rolling segment
/// sink in this crate, or anything else a deployment plugs in. The layer
/// calls `send` from a background task and never awaits it on the
/// application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persist a single log record.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was accepted by the backend.
    /// - `Err(..)` if the record was lost for this attempt (I/O failure,
    ///   timeout, sink already closed). The layer logs the failure and
    ///   moves on; it does not retry individual records.
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered records, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    /// Release the sink's resources when the layer is torn down.
    ///
    /// The segment sink finalizes its current segment here; sinks without
    /// durable state can rely on the default no-op.
    async fn shutdown(&self) {}
}
