use std::io;
use std::time::Duration;

use thiserror::Error;

/// Error type returned when validating sink configuration.
///
/// Configuration errors are fatal: they are surfaced once at construction
/// and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("writer type \"{0}\" is not supported")]
    UnknownWriterType(String),

    #[error("the compressed stream writer requires a compression codec")]
    MissingCodec,

    #[error("compression support is not compiled in (enable the `zstd` feature)")]
    CompressionDisabled,

    #[error("segment file name must not be empty")]
    EmptyFileName,
}

/// Outcome of a single backend call routed through the call-timeout executor.
#[derive(Debug, Error)]
pub enum CallError {
    /// The call did not complete within the configured deadline. The
    /// underlying operation keeps running in the background; its eventual
    /// outcome is logged but never surfaced to the caller.
    #[error("{op} call timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// The worker running the call failed (e.g. panicked).
    #[error("worker failed while running the call: {0}")]
    Worker(String),

    #[error("executor is shut down and no longer accepts calls")]
    ShuttingDown,
}

/// Errors surfaced by the rolling segment writer to the host collaborator.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Opening a new segment failed. The writer is left without a current
    /// segment and will retry opening on the next append.
    #[error("failed to open segment: {0}")]
    Open(#[source] CallError),

    /// A single record could not be written. The segment stays open; the
    /// record is lost for this attempt.
    #[error("failed to append record: {0}")]
    Append(#[source] CallError),

    #[error("failed to sync segment: {0}")]
    Sync(#[source] CallError),

    /// Every close attempt in the retry budget failed. The in-use file may
    /// remain unfinalized on storage.
    #[error("segment close failed permanently after {attempts} attempt(s): {last}")]
    CloseExhausted {
        attempts: u32,
        #[source]
        last: CallError,
    },

    /// The backend closed the segment but the in-use to final rename failed.
    #[error("failed to finalize segment name: {0}")]
    Rename(#[source] CallError),

    /// The writer was shut down; no further segments may be opened.
    #[error("segment writer is closed")]
    Closed,
}
