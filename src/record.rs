use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;

/// Normalized log event produced by the layer and persisted by the sink.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub message: Option<String>,
    pub service_name: Option<String>,
}

/// Encodes one [`LogRecord`] into the bytes written to a segment.
///
/// The format is supplied to the backend writer when a segment is opened,
/// so a single segment always carries a single encoding. Implementations
/// must be cheap to call per record; any buffering happens below them in
/// the backend writer.
pub trait RecordFormat: Send + Sync {
    /// Encode `record` into a self-delimiting chunk of bytes.
    fn encode(&self, record: &LogRecord) -> io::Result<Vec<u8>>;
}

/// One JSON object per record, newline terminated.
///
/// The default format: segments written this way are valid JSON Lines
/// files and can be ingested by most downstream tooling as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLinesFormat;

impl RecordFormat for JsonLinesFormat {
    fn encode(&self, record: &LogRecord) -> io::Result<Vec<u8>> {
        let mut buf = serde_json::to_vec(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        buf.push(b'\n');
        Ok(buf)
    }
}

/// Human-readable single-line format, close to what a `fmt` console layer
/// prints. Structured fields are appended as a JSON object when present.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextLineFormat;

impl RecordFormat for TextLineFormat {
    fn encode(&self, record: &LogRecord) -> io::Result<Vec<u8>> {
        let mut line = format!(
            "{} {:>5} {}",
            record.timestamp.to_rfc3339(),
            record.level,
            record.target
        );
        if let Some(message) = &record.message {
            line.push(' ');
            line.push_str(message);
        }
        if !record.fields.is_empty() {
            let fields = serde_json::to_string(&record.fields)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            line.push(' ');
            line.push_str(&fields);
        }
        line.push('\n');
        Ok(line.into_bytes())
    }
}
