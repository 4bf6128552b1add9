use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use zstd::stream::write::Encoder as ZstdEncoder;

use crate::record::{LogRecord, RecordFormat};
use crate::writer::{CompressionType, SegmentWriter};

/// Compressed container writer backed by zstd.
///
/// In `Block` mode the whole segment is one zstd stream, finished when the
/// segment closes. In `Record` mode every record is compressed on its own
/// and written as a length-prefixed frame (u32 big-endian length followed
/// by the compressed bytes), so readers can split records without
/// decompressing the rest of the segment.
///
/// Byte accounting reported to the rolling writer is the uncompressed
/// record size: roll thresholds describe the logical volume of log data,
/// not what compression happened to achieve.
pub struct CompressedStreamWriter {
    mode: CompressionType,
    level: i32,
    state: Option<State>,
}

enum State {
    Block {
        encoder: ZstdEncoder<'static, File>,
        format: Arc<dyn RecordFormat>,
    },
    Record {
        out: BufWriter<File>,
        format: Arc<dyn RecordFormat>,
    },
}

impl CompressedStreamWriter {
    pub fn new(mode: CompressionType) -> Self {
        Self {
            mode,
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
            state: None,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn create_file(path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().write(true).create_new(true).open(path)
    }

    fn state_mut(&mut self) -> io::Result<&mut State> {
        self.state
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "segment is not open"))
    }
}

impl SegmentWriter for CompressedStreamWriter {
    fn open(&mut self, path: &Path, format: Arc<dyn RecordFormat>) -> io::Result<()> {
        if self.state.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "writer already has an open segment",
            ));
        }
        let file = Self::create_file(path)?;
        self.state = Some(match self.mode {
            CompressionType::Record => State::Record {
                out: BufWriter::new(file),
                format,
            },
            // a compressed writer with layout `None` degenerates to the
            // block container
            CompressionType::Block | CompressionType::None => State::Block {
                encoder: ZstdEncoder::new(file, self.level)?,
                format,
            },
        });
        Ok(())
    }

    fn append(&mut self, record: &LogRecord) -> io::Result<u64> {
        let level = self.level;
        match self.state_mut()? {
            State::Block { encoder, format } => {
                let buf = format.encode(record)?;
                encoder.write_all(&buf)?;
                Ok(buf.len() as u64)
            }
            State::Record { out, format } => {
                let raw = format.encode(record)?;
                let compressed = zstd::bulk::compress(&raw, level)?;
                out.write_all(&(compressed.len() as u32).to_be_bytes())?;
                out.write_all(&compressed)?;
                Ok(raw.len() as u64)
            }
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        match self.state_mut()? {
            State::Block { encoder, .. } => {
                encoder.flush()?;
                encoder.get_mut().sync_data()
            }
            State::Record { out, .. } => {
                out.flush()?;
                out.get_ref().sync_data()
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        let state = self.state.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "segment already closed")
        })?;
        match state {
            State::Block { encoder, .. } => {
                let file = encoder.finish()?;
                file.sync_all()
            }
            State::Record { out, .. } => {
                let file = out.into_inner().map_err(|e| e.into_error())?;
                file.sync_all()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::JsonLinesFormat;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(message: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level: "WARN".to_string(),
            target: "test".to_string(),
            module_path: None,
            file: None,
            line: None,
            fields: BTreeMap::new(),
            message: Some(message.to_string()),
            service_name: None,
        }
    }

    #[test]
    fn block_mode_produces_a_readable_container() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.1.zst");

        let mut writer = CompressedStreamWriter::new(CompressionType::Block);
        writer.open(&path, Arc::new(JsonLinesFormat)).unwrap();
        writer.append(&record("alpha")).unwrap();
        writer.append(&record("beta")).unwrap();
        writer.close().unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let decoded = zstd::stream::decode_all(file).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("alpha"));
        assert!(text.contains("beta"));
    }

    #[test]
    fn record_mode_frames_each_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.2.zst");

        let mut writer = CompressedStreamWriter::new(CompressionType::Record);
        writer.open(&path, Arc::new(JsonLinesFormat)).unwrap();
        writer.append(&record("gamma")).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), 4 + len);
        let decoded = zstd::bulk::decompress(&bytes[4..], 64 * 1024).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value["message"], "gamma");
    }

    #[test]
    fn open_refuses_existing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.3.zst");
        std::fs::write(&path, b"leftover").unwrap();

        let mut writer = CompressedStreamWriter::new(CompressionType::Block);
        let err = writer.open(&path, Arc::new(JsonLinesFormat)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
