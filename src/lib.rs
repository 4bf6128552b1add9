pub mod record;
pub mod sink;
pub mod layer;

pub mod writer;
pub mod data_stream;
#[cfg(feature = "zstd")]
pub mod compressed_stream;
pub mod factory;
pub mod executor;
pub mod bucket;
pub mod roller;
pub mod appender;

pub mod config;
pub mod error;
pub mod init;
pub mod env;
