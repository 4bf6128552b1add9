use crate::layer::SegmentLogLayer;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the logging layer.
///
/// **Fields**
/// - `channel_buffer`: maximum number of [`crate::record::LogRecord`]s
///   queued before new records are dropped.
/// - `flush_interval`: maximum interval between forced sink flushes even
///   when no records arrive.
/// - `level`: most verbose level still shipped to the sink; more verbose
///   events are only counted, never forwarded.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   stacked on top so events also show up on the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub flush_interval: Duration,
    pub level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            flush_interval: Duration::from_secs(1),
            level: Level::INFO,
            enable_stdout: true,
        }
    }
}

/// Initialize the global `tracing` subscriber using the provided sink and
/// [`LayerConfig`].
///
/// This installs a [`Registry`] combined with [`SegmentLogLayer`] as the
/// global default subscriber, so all `tracing` events in the process are
/// observed by the layer. Keep a clone of the concrete sink around if you
/// need to shut it down explicitly at process exit.
pub fn init_tracing_with_config(sink: Arc<dyn LogSink>, config: LayerConfig) {
    let (layer, _handle) = SegmentLogLayer::new(
        sink,
        config.channel_buffer,
        config.flush_interval,
        config.level,
    );

    // The sink layer is always installed; the fmt layer is optional and
    // the two subscriber shapes differ in type, hence the two branches.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber).expect("set global subscriber");
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber).expect("set global subscriber");
    }
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(sink: Arc<dyn LogSink>) {
    init_tracing_with_config(sink, LayerConfig::default());
}
