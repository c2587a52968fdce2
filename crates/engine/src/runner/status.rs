use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use benchdrive_api::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::completion::CompletionTimeService;

/// Counters shared between the scheduling loop, the handlers and the
/// status display.
#[derive(Debug, Default)]
pub struct RunCounters {
    pub dispatched: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
}

impl RunCounters {
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Logs progress every `interval` until `cancel` fires.
pub fn spawn_status_display(
    interval: Duration,
    counters: Arc<RunCounters>,
    completion: Arc<CompletionTimeService>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = interval
        .to_std()
        .max(std::time::Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let gct = completion
                        .global_completion_time()
                        .map_or_else(|| "-".to_string(), |t| t.to_string());
                    info!(
                        "status: dispatched={} completed={} failed={} gct={gct}",
                        counters.dispatched(),
                        counters.completed(),
                        counters.failed()
                    );
                }
            }
        }
    })
}
