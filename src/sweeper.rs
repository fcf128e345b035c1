//! Periodic background eviction for the cache and session store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, trace};

/// Handle to a running sweep task. Dropping it also stops the task.
pub struct Sweeper {
    name: &'static str,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Runs `sweep` every `interval` on the current tokio runtime.
    /// `sweep` returns how many entries it evicted.
    ///
    /// A zero interval yields a sweeper that never runs.
    pub fn spawn<F>(name: &'static str, interval: Duration, sweep: F) -> Self
    where
        F: Fn() -> usize + Send + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        if interval.is_zero() {
            debug!(sweeper = name, "sweeper disabled");
            return Self {
                name,
                shutdown,
                handle: None,
            };
        }

        let signal = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = time::sleep(interval) => {
                        let evicted = sweep();
                        if evicted > 0 {
                            debug!(sweeper = name, evicted, "sweep evicted entries");
                        } else {
                            trace!(sweeper = name, "sweep found nothing");
                        }
                    }
                    _ = signal.notified() => break,
                }
            }
        });

        Self {
            name,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(sweeper = self.name, error = %e, "sweeper task failed");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}
