use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::CallError;

/// Bounded worker pool that runs blocking backend calls under a deadline.
///
/// Every call occupies one of `pool_size` permits and executes on the
/// blocking thread pool. The submitting task waits at most `call_timeout`
/// for the result. A call that misses its deadline is abandoned, never
/// killed: the worker keeps running it to completion in the background,
/// still holding its permit so the pool stays bounded. A detached watcher
/// logs the eventual outcome of an abandoned call.
///
/// When all permits are busy, new submissions queue on the semaphore
/// rather than spawning unbounded workers.
pub struct CallTimeoutExecutor {
    semaphore: Arc<Semaphore>,
    pool_size: usize,
    call_timeout: Duration,
}

impl CallTimeoutExecutor {
    pub fn new(pool_size: usize, call_timeout: Duration) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            call_timeout,
        }
    }

    /// Run `f` on a worker, waiting up to the configured call timeout.
    ///
    /// `op` names the operation for diagnostics ("open", "append", ...).
    pub async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, CallError>
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(CallError::ShuttingDown),
        };

        let mut handle = tokio::task::spawn_blocking(f);
        match timeout(self.call_timeout, &mut handle).await {
            Ok(Ok(result)) => {
                drop(permit);
                result.map_err(CallError::Io)
            }
            Ok(Err(join_err)) => {
                drop(permit);
                Err(CallError::Worker(join_err.to_string()))
            }
            Err(_elapsed) => {
                let after = self.call_timeout;
                tokio::spawn(async move {
                    let outcome = handle.await;
                    drop(permit);
                    match outcome {
                        Ok(Ok(_)) => eprintln!(
                            "segment sink: {op} call completed after missing its {after:?} deadline"
                        ),
                        Ok(Err(e)) => {
                            eprintln!("segment sink: abandoned {op} call eventually failed: {e}")
                        }
                        Err(e) => {
                            eprintln!("segment sink: worker running abandoned {op} call failed: {e}")
                        }
                    }
                });
                Err(CallError::Timeout { op, after })
            }
        }
    }

    /// Stop accepting new calls, then wait up to `grace` for in-flight
    /// calls (including abandoned ones) to drain. Calls still running when
    /// the grace period elapses are logged and left behind.
    pub async fn shutdown(&self, grace: Duration) {
        self.semaphore.close();
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let outstanding = self.pool_size - self.semaphore.available_permits();
            if outstanding == 0 {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                eprintln!(
                    "segment sink: executor shut down with {outstanding} call(s) still running"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn results_and_errors_pass_through() {
        let executor = CallTimeoutExecutor::new(2, Duration::from_secs(1));

        let value = executor.call("append", || Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);

        let err = executor
            .call("append", || {
                Err::<(), _>(io::Error::new(io::ErrorKind::BrokenPipe, "wire cut"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[tokio::test]
    async fn deadline_bounds_the_caller_not_the_call() {
        let executor = CallTimeoutExecutor::new(1, Duration::from_millis(50));

        let started = Instant::now();
        let err = executor
            .call("append", || {
                std::thread::sleep(Duration::from_millis(400));
                Ok(())
            })
            .await
            .unwrap_err();
        let waited = started.elapsed();

        assert!(matches!(err, CallError::Timeout { op: "append", .. }));
        // the caller comes back at ~50ms even though the call runs 400ms
        assert!(waited < Duration::from_millis(300), "waited {waited:?}");
    }

    #[tokio::test]
    async fn abandoned_call_keeps_its_permit_until_done() {
        let executor = CallTimeoutExecutor::new(1, Duration::from_millis(30));

        let _ = executor
            .call("sync", || {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await;

        // the single permit is still held by the abandoned call, so the
        // next submission queues behind it instead of running immediately
        let started = Instant::now();
        executor.call("sync", || Ok(())).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_calls() {
        let executor = CallTimeoutExecutor::new(2, Duration::from_millis(100));
        executor.call("open", || Ok(())).await.unwrap();

        executor.shutdown(Duration::from_millis(200)).await;

        let err = executor.call("open", || Ok(())).await.unwrap_err();
        assert!(matches!(err, CallError::ShuttingDown));
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_work() {
        let executor = Arc::new(CallTimeoutExecutor::new(1, Duration::from_millis(20)));

        // park a call well past its deadline so it is abandoned but running
        let _ = executor
            .call("close", || {
                std::thread::sleep(Duration::from_millis(150));
                Ok(())
            })
            .await;

        let started = Instant::now();
        executor.shutdown(Duration::from_secs(2)).await;
        // shutdown returned only once the abandoned call finished
        assert!(started.elapsed() >= Duration::from_millis(80));
    }
}
