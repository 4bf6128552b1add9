use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::record::{LogRecord, RecordFormat};

/// How record payloads are compressed inside a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    /// No compression.
    None,
    /// Each record is compressed and framed individually, so a reader can
    /// decode records without scanning the whole segment.
    Record,
    /// The whole segment is a single compressed container, finished when
    /// the segment is closed.
    #[default]
    Block,
}

/// Compression codec applied by writers that support compression.
///
/// A closed set: unknown codecs cannot be configured, only the variants
/// listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCodec {
    Zstd,
}

impl CompressionCodec {
    /// Canonical file extension for segments written with this codec,
    /// used when no explicit file suffix is configured.
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionCodec::Zstd => ".zst",
        }
    }
}

/// Blocking writer for one underlying storage object.
///
/// All methods may block on storage I/O; the rolling segment writer never
/// calls them directly but routes every call through the call-timeout
/// executor. A writer instance serves exactly one segment: it is created
/// fresh for each open and discarded after close.
pub trait SegmentWriter: Send {
    /// Create the underlying object at `path` and remember `format` for
    /// subsequent appends.
    ///
    /// Fails with `AlreadyExists` if the path is occupied: none of the
    /// shipped writers can resume a partially written object, and silently
    /// overwriting an unfinalized segment would lose data.
    fn open(&mut self, path: &Path, format: Arc<dyn RecordFormat>) -> io::Result<()>;

    /// Encode one record with the format given at open and write it.
    ///
    /// Returns the number of payload bytes the record contributed, which
    /// the rolling writer feeds into its size-based roll accounting.
    fn append(&mut self, record: &LogRecord) -> io::Result<u64>;

    /// Force buffered bytes to be durable and visible to readers.
    fn sync(&mut self) -> io::Result<()>;

    /// Finalize and release the underlying handle.
    ///
    /// Calling `close` again after it has succeeded is an error; the
    /// caller is responsible for not doing so.
    fn close(&mut self) -> io::Result<()>;

    /// Move the finished object from its in-use name to its final name.
    ///
    /// The default covers filesystem-like storage; backends with their own
    /// namespace operations override this.
    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    /// Whether the storage reports that the object has not yet reached its
    /// durability/redundancy target. Non-fatal; the rolling writer may
    /// react by rolling to a fresh segment.
    fn is_under_replicated(&self) -> bool {
        false
    }
}
