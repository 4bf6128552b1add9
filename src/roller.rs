use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::bucket::BucketWriter;
use crate::config::SegmentSinkConfig;

/// Background tasks driving time-based rolls and idle closes.
///
/// One task per enabled trigger. The tasks never mutate segment state
/// themselves; they only invoke the bucket writer's synchronized check
/// paths, which decide whether anything is actually due.
pub(crate) struct RollTimer {
    handles: Vec<JoinHandle<()>>,
}

impl RollTimer {
    pub(crate) fn start(bucket: Arc<BucketWriter>, config: &SegmentSinkConfig) -> Self {
        let mut handles = Vec::new();

        if !config.roll_interval.is_zero() {
            let bucket = Arc::clone(&bucket);
            let period = config.roll_interval;
            handles.push(tokio::spawn(async move {
                loop {
                    sleep(period).await;
                    bucket.consider_time_roll().await;
                }
            }));
        }

        if !config.idle_timeout.is_zero() {
            let bucket = Arc::clone(&bucket);
            // poll a few times per idle window so the close lands shortly
            // after the timeout instead of up to a full window late
            let period = (config.idle_timeout / 4).max(Duration::from_millis(25));
            handles.push(tokio::spawn(async move {
                loop {
                    sleep(period).await;
                    bucket.consider_idle_close().await;
                }
            }));
        }

        Self { handles }
    }

    pub(crate) fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for RollTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
