use crate::record::LogRecord;
use crate::sink::LogSink;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that observes events and forwards them to an
/// asynchronous [`LogSink`] via a bounded channel and background task.
///
/// Storage I/O is fully decoupled from application threads: `on_event`
/// only normalizes the event into a [`LogRecord`] and enqueues it. When
/// the channel is full the record is dropped and counted rather than
/// blocking the caller.
///
/// Failures inside the pipeline are reported with `eprintln!` rather than
/// `tracing`: this layer is part of the tracing subscriber, and emitting
/// tracing events from here would feed them straight back into itself.
pub struct SegmentLogLayer {
    sender: mpsc::Sender<LogRecord>,
    level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into the channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full.
    pub dropped_events: Arc<AtomicU64>,
}

impl SegmentLogLayer {
    /// Create a new layer and spawn the background task that pulls
    /// [`LogRecord`]s from the bounded channel and sends them to `sink`.
    ///
    /// `level` is the most verbose level still shipped; anything more
    /// verbose is ignored. Minimal thresholds are enforced for `buffer`
    /// and `flush_interval` to avoid degenerate configurations.
    pub fn new(
        sink: Arc<dyn LogSink>,
        buffer: usize,
        flush_interval: Duration,
        level: Level,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<LogRecord>(buffer);

        let total_events = Arc::new(AtomicU64::new(0));
        let enqueued_events = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let enqueued_bg = Arc::clone(&enqueued_events);

        let handle = tokio::spawn(async move {
            let mut flush_tick = interval(flush_interval);
            flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    maybe_record = rx.recv() => match maybe_record {
                        Some(record) => {
                            enqueued_bg.fetch_add(1, Ordering::Relaxed);
                            if let Err(e) = sink.send(&record).await {
                                eprintln!("segment sink: failed to persist log record: {e}");
                            }
                        }
                        None => break,
                    },
                    _ = flush_tick.tick() => {
                        if let Err(e) = sink.flush().await {
                            eprintln!("segment sink: periodic flush failed: {e}");
                        }
                    }
                }
            }

            // the layer went away: flush what made it in, then let the
            // sink finalize its state
            if let Err(e) = sink.flush().await {
                eprintln!("segment sink: final flush failed: {e}");
            }
            sink.shutdown().await;
        });

        (
            Self {
                sender: tx,
                level,
                total_events,
                enqueued_events,
                dropped_events,
            },
            handle,
        )
    }
}

impl<S> Layer<S> for SegmentLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if *event.metadata().level() > self.level {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let meta = event.metadata();
        let record = LogRecord {
            timestamp: Utc::now(),
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            module_path: meta.module_path().map(|s| s.to_string()),
            file: meta.file().map(|s| s.to_string()),
            line: meta.line(),
            fields,
            message,
            service_name: None,
        };

        if self.sender.try_send(record).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            eprintln!("segment sink: log channel full, dropping log record");
        }
    }
}

use tracing::field::{Field, Visit};

struct FieldVisitor<'a> {
    fields: &'a mut BTreeMap<String, serde_json::Value>,
    message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::String(format!("{value:?}")),
        );
    }
}
