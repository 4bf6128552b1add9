use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::record::{LogRecord, RecordFormat};
use crate::writer::SegmentWriter;

/// Raw stream writer: records are encoded by the configured format and
/// written back to back, uncompressed.
///
/// Compression settings in the sink configuration are accepted but ignored
/// by this writer; select the compressed stream writer to actually compress
/// segment contents.
#[derive(Default)]
pub struct DataStreamWriter {
    stream: Option<Stream>,
}

struct Stream {
    out: BufWriter<File>,
    format: Arc<dyn RecordFormat>,
    bytes_written: u64,
}

impl DataStreamWriter {
    pub fn new() -> Self {
        Self { stream: None }
    }

    fn stream_mut(&mut self) -> io::Result<&mut Stream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "segment is not open"))
    }
}

impl SegmentWriter for DataStreamWriter {
    fn open(&mut self, path: &Path, format: Arc<dyn RecordFormat>) -> io::Result<()> {
        if self.stream.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "writer already has an open segment",
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // create_new refuses a leftover in-use file instead of overwriting it.
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        self.stream = Some(Stream {
            out: BufWriter::new(file),
            format,
            bytes_written: 0,
        });
        Ok(())
    }

    fn append(&mut self, record: &LogRecord) -> io::Result<u64> {
        let stream = self.stream_mut()?;
        let buf = stream.format.encode(record)?;
        stream.out.write_all(&buf)?;
        stream.bytes_written += buf.len() as u64;
        Ok(buf.len() as u64)
    }

    fn sync(&mut self) -> io::Result<()> {
        let stream = self.stream_mut()?;
        stream.out.flush()?;
        stream.out.get_ref().sync_data()
    }

    fn close(&mut self) -> io::Result<()> {
        let stream = self.stream.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "segment already closed")
        })?;
        let file = stream.out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
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

    #[test]
    fn writes_json_lines_and_closes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.1");

        let mut writer = DataStreamWriter::new();
        writer.open(&path, Arc::new(JsonLinesFormat)).unwrap();
        let first = writer.append(&record("one")).unwrap();
        assert!(first > 0);
        writer.append(&record("two")).unwrap();
        writer.sync().unwrap();
        writer.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["message"], "two");
    }

    #[test]
    fn open_refuses_existing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.1");
        std::fs::write(&path, b"leftover").unwrap();

        let mut writer = DataStreamWriter::new();
        let err = writer.open(&path, Arc::new(JsonLinesFormat)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn append_and_close_require_open_segment() {
        let mut writer = DataStreamWriter::new();
        assert!(writer.append(&record("lost")).is_err());
        assert!(writer.close().is_err());

        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.1");
        writer.open(&path, Arc::new(JsonLinesFormat)).unwrap();
        writer.close().unwrap();
        // second close is an error, never a silent success
        assert!(writer.close().is_err());
    }

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("segment.1");

        let mut writer = DataStreamWriter::new();
        writer.open(&path, Arc::new(JsonLinesFormat)).unwrap();
        writer.close().unwrap();
        assert!(path.exists());
    }
}
