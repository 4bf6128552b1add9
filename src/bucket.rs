use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::SegmentSinkConfig;
use crate::error::{CallError, SinkError};
use crate::executor::CallTimeoutExecutor;
use crate::factory::WriterFactory;
use crate::record::{LogRecord, RecordFormat};
use crate::writer::SegmentWriter;

/// Cap on back-to-back rolls forced by the under-replication signal.
const MAX_CONSECUTIVE_UNDER_REPLICATED_ROLLS: u32 = 30;

/// The backend writer handle is shared with in-flight blocking calls, which
/// may outlive their deadline and still hold the lock when the next call
/// arrives.
type SharedWriter = Arc<Mutex<Box<dyn SegmentWriter>>>;

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// The segment currently accepting appends.
struct OpenSegment {
    writer: SharedWriter,
    in_use_path: PathBuf,
    final_path: PathBuf,
    created_at: Instant,
    bytes_written: u64,
    events_written: u64,
    appends_since_sync: u64,
}

struct Inner {
    segment: Option<OpenSegment>,
    closed: bool,
    last_append_at: Instant,
    consecutive_under_replicated_rolls: u32,
}

/// Rolling segment writer: owns at most one open segment, decides when to
/// roll it, and drives every backend call through the call-timeout
/// executor.
///
/// All segment state lives behind a single async mutex, so the append path
/// and the timer-driven roll paths never interleave against the same
/// segment. An append and a time roll can race to the lock, but whichever
/// loses observes the other's completed transition, never a half-rolled
/// segment.
pub struct BucketWriter {
    config: SegmentSinkConfig,
    factory: WriterFactory,
    format: Arc<dyn RecordFormat>,
    executor: Arc<CallTimeoutExecutor>,
    /// Segment sequence number; seeded with the activation wall-clock so
    /// restarts do not collide with finalized segments left by a previous
    /// run.
    seq: AtomicU64,
    inner: AsyncMutex<Inner>,
}

impl BucketWriter {
    pub(crate) fn new(
        config: SegmentSinkConfig,
        factory: WriterFactory,
        format: Arc<dyn RecordFormat>,
        executor: Arc<CallTimeoutExecutor>,
    ) -> Self {
        Self {
            config,
            factory,
            format,
            executor,
            seq: AtomicU64::new(epoch_millis()),
            inner: AsyncMutex::new(Inner {
                segment: None,
                closed: false,
                last_append_at: Instant::now(),
                consecutive_under_replicated_rolls: 0,
            }),
        }
    }

    /// Append one record to the current segment, opening or rolling one
    /// first when the roll policy calls for it.
    ///
    /// The roll check runs before the write: a record that would cross the
    /// size threshold still lands in the fresh segment in full, and a
    /// single oversized record can push a segment past `roll_size` and
    /// trigger the roll only for its successor.
    pub async fn append(&self, record: LogRecord) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(SinkError::Closed);
        }

        if self.should_roll(&mut inner) {
            if let Err(e) = self.close_segment(&mut inner).await {
                eprintln!("segment sink: failed to close rolled segment: {e}");
            }
        }

        let mut segment = match inner.segment.take() {
            Some(segment) => segment,
            None => {
                let segment = self.open_segment().await?;
                inner.last_append_at = Instant::now();
                segment
            }
        };

        let writer = Arc::clone(&segment.writer);
        let result = self
            .executor
            .call("append", move || writer.lock().append(&record))
            .await;

        match result {
            Ok(written) => {
                segment.bytes_written += written;
                segment.events_written += 1;
                segment.appends_since_sync += 1;
                inner.last_append_at = Instant::now();

                let sync_due = self.config.batch_size > 0
                    && segment.appends_since_sync >= self.config.batch_size;
                if sync_due {
                    segment.appends_since_sync = 0;
                    let writer = Arc::clone(&segment.writer);
                    let synced = self
                        .executor
                        .call("sync", move || writer.lock().sync())
                        .await;
                    inner.segment = Some(segment);
                    synced.map_err(SinkError::Sync)
                } else {
                    inner.segment = Some(segment);
                    Ok(())
                }
            }
            Err(e) => {
                // a single failed append does not close the segment; the
                // record is lost for this attempt and the caller decides
                inner.segment = Some(segment);
                Err(SinkError::Append(e))
            }
        }
    }

    /// Force buffered bytes of the current segment durable. No-op when no
    /// segment is open.
    pub async fn sync(&self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().await;
        let Some(segment) = inner.segment.as_mut() else {
            return Ok(());
        };
        segment.appends_since_sync = 0;
        let writer = Arc::clone(&segment.writer);
        self.executor
            .call("sync", move || writer.lock().sync())
            .await
            .map_err(SinkError::Sync)
    }

    /// Timer entry point: close the current segment if it is older than the
    /// roll interval. A no-op when nothing is open or the segment is still
    /// young, so append-triggered rolls reset the clock implicitly.
    pub async fn consider_time_roll(&self) {
        if self.config.roll_interval.is_zero() {
            return;
        }
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        let due = inner
            .segment
            .as_ref()
            .is_some_and(|s| s.created_at.elapsed() >= self.config.roll_interval);
        if !due {
            return;
        }
        if let Err(e) = self.close_segment(&mut inner).await {
            eprintln!("segment sink: time-based roll failed: {e}");
        }
    }

    /// Timer entry point: proactively close the current segment after
    /// `idle_timeout` without appends, bounding how long an unfinalized
    /// file stays visible.
    pub async fn consider_idle_close(&self) {
        if self.config.idle_timeout.is_zero() {
            return;
        }
        let mut inner = self.inner.lock().await;
        if inner.closed || inner.segment.is_none() {
            return;
        }
        if inner.last_append_at.elapsed() < self.config.idle_timeout {
            return;
        }
        if let Err(e) = self.close_segment(&mut inner).await {
            eprintln!("segment sink: idle close failed: {e}");
        }
    }

    /// Close the current segment and stop accepting appends.
    ///
    /// On a permanently failed close the in-use file may remain on storage
    /// unfinalized; with `force` the writer still transitions to closed
    /// locally, otherwise it stays usable and the error propagates.
    /// Closing an already-closed writer is a no-op.
    pub async fn close(&self, force: bool) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }
        match self.close_segment(&mut inner).await {
            Ok(()) => {
                inner.closed = true;
                Ok(())
            }
            Err(e) => {
                if force {
                    inner.closed = true;
                }
                Err(e)
            }
        }
    }

    fn should_roll(&self, inner: &mut Inner) -> bool {
        let (due, under_replicated) = match inner.segment.as_ref() {
            None => return false,
            Some(segment) => {
                let count_due = self.config.roll_count > 0
                    && segment.events_written >= self.config.roll_count;
                let size_due =
                    self.config.roll_size > 0 && segment.bytes_written >= self.config.roll_size;
                // try_lock: if an abandoned call still holds the writer,
                // skip the signal rather than stall the append path
                let under = segment
                    .writer
                    .try_lock()
                    .map(|w| w.is_under_replicated())
                    .unwrap_or(false);
                (count_due || size_due, under)
            }
        };

        if under_replicated {
            if inner.consecutive_under_replicated_rolls
                < MAX_CONSECUTIVE_UNDER_REPLICATED_ROLLS
            {
                inner.consecutive_under_replicated_rolls += 1;
                return true;
            }
        } else {
            inner.consecutive_under_replicated_rolls = 0;
        }
        due
    }

    async fn open_segment(&self) -> Result<OpenSegment, SinkError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let (in_use_path, final_path) = self.config.segment_paths(seq);

        let writer: SharedWriter = Arc::new(Mutex::new(self.factory.make()));
        let format = Arc::clone(&self.format);
        let path = in_use_path.clone();
        let opening = Arc::clone(&writer);
        self.executor
            .call("open", move || opening.lock().open(&path, format))
            .await
            .map_err(SinkError::Open)?;

        Ok(OpenSegment {
            writer,
            in_use_path,
            final_path,
            created_at: Instant::now(),
            bytes_written: 0,
            events_written: 0,
            appends_since_sync: 0,
        })
    }

    /// Close the current segment (if any) with the bounded retry budget,
    /// then rename it from its in-use name to its final name.
    ///
    /// Whatever happens, the segment slot ends up empty: on exhausted
    /// retries the in-use file is abandoned on storage instead of leaving
    /// a second claimant for the current role.
    async fn close_segment(&self, inner: &mut Inner) -> Result<(), SinkError> {
        let Some(segment) = inner.segment.take() else {
            return Ok(());
        };

        let attempts = self.config.max_close_retries.max(1);
        let mut last = CallError::Worker("close was never attempted".to_string());
        for attempt in 1..=attempts {
            let writer = Arc::clone(&segment.writer);
            match self
                .executor
                .call("close", move || writer.lock().close())
                .await
            {
                Ok(()) => {
                    let writer = Arc::clone(&segment.writer);
                    let from = segment.in_use_path.clone();
                    let to = segment.final_path.clone();
                    return self
                        .executor
                        .call("rename", move || writer.lock().rename(&from, &to))
                        .await
                        .map_err(SinkError::Rename);
                }
                Err(e) => {
                    eprintln!(
                        "segment sink: close attempt {attempt}/{attempts} for {} failed: {e}",
                        segment.in_use_path.display()
                    );
                    last = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_interval).await;
                    }
                }
            }
        }

        Err(SinkError::CloseExhausted { attempts, last })
    }
}
