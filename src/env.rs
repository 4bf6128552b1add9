//! Environment variable names used by this crate for convenient
//! configuration of the segment sink from services.
//!
//! These are purely helpers; the core sink types remain decoupled from
//! environment access.

use crate::config::SegmentSinkConfig;
use crate::error::ConfigError;

/// Directory segments are written into, e.g. `/mnt/logs/segments`.
pub const LOG_SINK_SEGMENT_DIR_ENV: &str = "LOG_SINK_SEGMENT_DIR";

/// File-name prefix shared by every segment.
pub const LOG_SINK_FILE_NAME_ENV: &str = "LOG_SINK_FILE_NAME";

/// Backend writer selection tag, e.g. `DataStream`.
pub const LOG_SINK_WRITER_TYPE_ENV: &str = "LOG_SINK_WRITER_TYPE";

/// Optional logical service name stamped into records.
pub const LOG_SINK_SERVICE_NAME_ENV: &str = "LOG_SINK_SERVICE_NAME";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Build a [`SegmentSinkConfig`] from the `LOG_SINK_*` variables, keeping
/// the built-in defaults for everything not set.
///
/// An unparseable writer type is a [`ConfigError`], consistent with how
/// the factory treats unknown tags at construction.
pub fn config_from_env() -> Result<SegmentSinkConfig, ConfigError> {
    let directory = env_or(LOG_SINK_SEGMENT_DIR_ENV, "./segments");
    let mut config = SegmentSinkConfig::new(directory);
    config.file_name = env_or(LOG_SINK_FILE_NAME_ENV, &config.file_name);
    if let Ok(tag) = std::env::var(LOG_SINK_WRITER_TYPE_ENV) {
        config.writer_type = tag.parse()?;
    }
    Ok(config)
}
