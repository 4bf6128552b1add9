use std::str::FromStr;

use crate::config::SegmentSinkConfig;
use crate::data_stream::DataStreamWriter;
use crate::error::ConfigError;
use crate::writer::SegmentWriter;

#[cfg(feature = "zstd")]
use crate::compressed_stream::CompressedStreamWriter;
#[cfg(feature = "zstd")]
use crate::writer::CompressionType;

/// Supported backend writer kinds that can be selected via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterKind {
    /// Raw uncompressed record stream.
    #[default]
    DataStream,
    /// zstd-compressed container (requires the `zstd` feature and a codec).
    CompressedStream,
}

impl FromStr for WriterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("datastream")
            || s.eq_ignore_ascii_case("data-stream")
            || s.eq_ignore_ascii_case("data_stream")
        {
            Ok(WriterKind::DataStream)
        } else if s.eq_ignore_ascii_case("compressedstream")
            || s.eq_ignore_ascii_case("compressed-stream")
            || s.eq_ignore_ascii_case("compressed_stream")
        {
            Ok(WriterKind::CompressedStream)
        } else {
            Err(ConfigError::UnknownWriterType(s.to_string()))
        }
    }
}

/// Writer factory resolved once at sink construction.
///
/// Resolution is where configuration mistakes surface: an unknown tag, a
/// compressed writer without a codec, or a codec the build does not carry
/// all fail here, before the first record is ever appended. After that,
/// [`WriterFactory::make`] cannot fail and hands out a fresh writer for
/// every segment open.
pub(crate) enum WriterFactory {
    DataStream,
    #[cfg(feature = "zstd")]
    CompressedStream { mode: CompressionType },
    #[cfg(test)]
    Mock(std::sync::Arc<dyn Fn() -> Box<dyn SegmentWriter> + Send + Sync>),
}

impl WriterFactory {
    pub(crate) fn from_config(config: &SegmentSinkConfig) -> Result<Self, ConfigError> {
        match config.writer_type {
            WriterKind::DataStream => Ok(WriterFactory::DataStream),
            WriterKind::CompressedStream => {
                #[cfg(feature = "zstd")]
                {
                    if config.compression_codec.is_none() {
                        return Err(ConfigError::MissingCodec);
                    }
                    Ok(WriterFactory::CompressedStream {
                        mode: config.compression_type,
                    })
                }
                #[cfg(not(feature = "zstd"))]
                {
                    Err(ConfigError::CompressionDisabled)
                }
            }
        }
    }

    /// Build a fresh backend writer for the next segment.
    pub(crate) fn make(&self) -> Box<dyn SegmentWriter> {
        match self {
            WriterFactory::DataStream => Box::new(DataStreamWriter::new()),
            #[cfg(feature = "zstd")]
            WriterFactory::CompressedStream { mode } => {
                Box::new(CompressedStreamWriter::new(*mode))
            }
            #[cfg(test)]
            WriterFactory::Mock(make) => make(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::CompressionCodec;

    #[test]
    fn tags_parse_case_insensitively() {
        assert_eq!(
            "DataStream".parse::<WriterKind>().unwrap(),
            WriterKind::DataStream
        );
        assert_eq!(
            "compressed_stream".parse::<WriterKind>().unwrap(),
            WriterKind::CompressedStream
        );
    }

    #[test]
    fn unknown_tag_is_a_config_error() {
        let err = "SequenceFile".parse::<WriterKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownWriterType(tag) if tag == "SequenceFile"));
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn compressed_stream_requires_a_codec() {
        let mut config = SegmentSinkConfig::new("/tmp/segments");
        config.writer_type = WriterKind::CompressedStream;
        assert!(matches!(
            WriterFactory::from_config(&config),
            Err(ConfigError::MissingCodec)
        ));

        config.compression_codec = Some(CompressionCodec::Zstd);
        assert!(WriterFactory::from_config(&config).is_ok());
    }

    #[test]
    fn data_stream_resolves_and_builds() {
        let config = SegmentSinkConfig::new("/tmp/segments");
        let factory = WriterFactory::from_config(&config).unwrap();
        // each call must hand out an independent writer instance
        let _a = factory.make();
        let _b = factory.make();
    }
}
