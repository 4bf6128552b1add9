use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::factory::WriterKind;
use crate::writer::{CompressionCodec, CompressionType};

/// Default bound on a single backend call, also the floor for the shutdown
/// grace period.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the rolling segment sink.
///
/// Rolling triggers are independent: `roll_interval`, `roll_size` and
/// `roll_count` each disable their trigger when set to zero, so size-only,
/// count-only or interval-only rolling are all valid setups. `idle_timeout`
/// of zero disables the proactive idle close.
#[derive(Clone, Debug)]
pub struct SegmentSinkConfig {
    /// Directory the segments are written into.
    pub directory: PathBuf,
    /// File-name prefix shared by every segment of this sink.
    pub file_name: String,
    /// Close the current segment once it is older than this. ZERO disables.
    pub roll_interval: Duration,
    /// Close the current segment once it holds at least this many payload
    /// bytes. 0 disables.
    pub roll_size: u64,
    /// Close the current segment once it holds this many records. 0 disables.
    pub roll_count: u64,
    /// Force a sync every this many appends. 0 disables forced syncs.
    pub batch_size: u64,
    /// Close the current segment after this much time without appends.
    /// ZERO disables.
    pub idle_timeout: Duration,
    /// Deadline for every individual backend call.
    pub call_timeout: Duration,
    /// Pause between close attempts.
    pub retry_interval: Duration,
    /// Total number of close attempts before the close is reported as
    /// permanently failed.
    pub max_close_retries: u32,
    /// Number of workers executing blocking backend calls.
    pub threads_pool_size: usize,
    /// Marker inserted after the file name while a segment is unfinalized.
    pub in_use_prefix: String,
    /// Suffix marking an unfinalized segment.
    pub in_use_suffix: String,
    /// Suffix of finalized segments. When empty, compressed segments use
    /// their codec's canonical extension instead.
    pub file_suffix: String,
    /// Backend writer selection tag.
    pub writer_type: WriterKind,
    /// Codec passed through to writers that compress.
    pub compression_codec: Option<CompressionCodec>,
    /// Compression layout passed through to writers that compress.
    pub compression_type: CompressionType,
}

impl SegmentSinkConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file_name: "LogData".to_string(),
            roll_interval: Duration::from_secs(10),
            roll_size: 10 * 1024,
            roll_count: 10 * 1024,
            batch_size: 100,
            idle_timeout: Duration::ZERO,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            retry_interval: Duration::from_secs(180),
            max_close_retries: u32::MAX,
            threads_pool_size: 10,
            in_use_prefix: String::new(),
            in_use_suffix: ".tmp".to_string(),
            file_suffix: String::new(),
            writer_type: WriterKind::DataStream,
            compression_codec: None,
            compression_type: CompressionType::default(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_roll_interval(mut self, interval: Duration) -> Self {
        self.roll_interval = interval;
        self
    }

    pub fn with_roll_size(mut self, bytes: u64) -> Self {
        self.roll_size = bytes;
        self
    }

    pub fn with_roll_count(mut self, events: u64) -> Self {
        self.roll_count = events;
        self
    }

    pub fn with_batch_size(mut self, appends: u64) -> Self {
        self.batch_size = appends;
        self
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, max_close_retries: u32, retry_interval: Duration) -> Self {
        self.max_close_retries = max_close_retries;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_writer_type(mut self, kind: WriterKind) -> Self {
        self.writer_type = kind;
        self
    }

    pub fn with_compression(mut self, codec: CompressionCodec, layout: CompressionType) -> Self {
        self.compression_codec = Some(codec);
        self.compression_type = layout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.file_name.is_empty() {
            return Err(ConfigError::EmptyFileName);
        }
        Ok(())
    }

    /// Clamp degenerate values instead of failing on them.
    pub(crate) fn normalize(&mut self) {
        self.threads_pool_size = self.threads_pool_size.max(1);
        self.max_close_retries = self.max_close_retries.max(1);
        if self.call_timeout < Duration::from_millis(1) {
            self.call_timeout = DEFAULT_CALL_TIMEOUT;
        }
    }

    /// Build the in-use and final paths for segment number `seq`.
    pub(crate) fn segment_paths(&self, seq: u64) -> (PathBuf, PathBuf) {
        let suffix = if !self.file_suffix.is_empty() {
            self.file_suffix.as_str()
        } else if self.writer_type == WriterKind::CompressedStream {
            self.compression_codec
                .map(|codec| codec.extension())
                .unwrap_or("")
        } else {
            ""
        };
        let in_use = format!(
            "{}{}.{}{}",
            self.file_name, self.in_use_prefix, seq, self.in_use_suffix
        );
        let finished = format!("{}.{}{}", self.file_name, seq, suffix);
        (self.directory.join(in_use), self.directory.join(finished))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_tmp_marker() {
        let config = SegmentSinkConfig::new("/var/log/segments");
        let (in_use, finished) = config.segment_paths(7);
        assert_eq!(in_use, PathBuf::from("/var/log/segments/LogData.7.tmp"));
        assert_eq!(finished, PathBuf::from("/var/log/segments/LogData.7"));
    }

    #[test]
    fn explicit_suffixes_and_prefix_are_honored() {
        let mut config = SegmentSinkConfig::new("/data").with_file_name("audit");
        config.in_use_prefix = "_".to_string();
        config.in_use_suffix = ".open".to_string();
        config.file_suffix = ".log".to_string();

        let (in_use, finished) = config.segment_paths(3);
        assert_eq!(in_use, PathBuf::from("/data/audit_.3.open"));
        assert_eq!(finished, PathBuf::from("/data/audit.3.log"));
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn compressed_segments_get_the_codec_extension() {
        let config = SegmentSinkConfig::new("/data")
            .with_writer_type(WriterKind::CompressedStream)
            .with_compression(CompressionCodec::Zstd, CompressionType::Block);

        let (in_use, finished) = config.segment_paths(1);
        assert_eq!(in_use, PathBuf::from("/data/LogData.1.tmp"));
        assert_eq!(finished, PathBuf::from("/data/LogData.1.zst"));
    }

    #[test]
    fn empty_file_name_is_rejected() {
        let config = SegmentSinkConfig::new("/data").with_file_name("");
        assert!(matches!(config.validate(), Err(ConfigError::EmptyFileName)));
    }

    #[test]
    fn normalize_clamps_degenerate_values() {
        let mut config = SegmentSinkConfig::new("/data");
        config.threads_pool_size = 0;
        config.max_close_retries = 0;
        config.call_timeout = Duration::ZERO;
        config.normalize();
        assert_eq!(config.threads_pool_size, 1);
        assert_eq!(config.max_close_retries, 1);
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
    }
}
