//! Roll a handful of tiny segments on local disk and print what ended up
//! on storage.
//!
//! Run with: `cargo run --example local_rolling`

use std::sync::Arc;
use std::time::Duration;

use tracing_segment_sink::appender::SegmentSink;
use tracing_segment_sink::config::SegmentSinkConfig;
use tracing_segment_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_segment_sink::sink::LogSink;

#[tokio::main]
async fn main() {
    let directory = std::env::temp_dir().join("segment-sink-demo");

    let config = SegmentSinkConfig::new(&directory)
        .with_file_name("demo")
        .with_roll_count(3)
        .with_roll_interval(Duration::from_secs(30))
        .with_batch_size(1);
    let sink = Arc::new(SegmentSink::activate(config).expect("activate segment sink"));

    init_tracing_with_config(
        Arc::clone(&sink) as Arc<dyn LogSink>,
        LayerConfig {
            flush_interval: Duration::from_millis(200),
            ..LayerConfig::default()
        },
    );

    for attempt in 1..=8 {
        tracing::info!(attempt, "handling request");
        if attempt % 4 == 0 {
            tracing::warn!(attempt, "slow response");
        }
    }

    // give the background task a moment to drain the channel, then
    // finalize the current segment
    tokio::time::sleep(Duration::from_millis(500)).await;
    sink.shutdown(false).await;

    println!("segments in {}:", directory.display());
    for entry in std::fs::read_dir(&directory).expect("list segment directory") {
        let entry = entry.expect("read dir entry");
        println!(
            "  {} ({} bytes)",
            entry.file_name().to_string_lossy(),
            entry.metadata().map(|m| m.len()).unwrap_or(0)
        );
    }
}
