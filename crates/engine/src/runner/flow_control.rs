use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{EngineError, EngineResult};
use crate::types::RunnerConfig;

#[derive(Debug, Clone)]
pub struct FlowControlConfig {
    pub max_in_flight: usize,
    pub worker_count: usize,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 100,
            worker_count: 1,
        }
    }
}

impl From<&RunnerConfig> for FlowControlConfig {
    fn from(value: &RunnerConfig) -> Self {
        Self {
            max_in_flight: value.max_in_flight,
            worker_count: value.thread_count,
        }
    }
}

/// Bounds the number of operation handlers alive at once and the number
/// executing against the database at once.
#[derive(Debug, Clone)]
pub struct FlowController {
    in_flight: Arc<Semaphore>,
    workers: Arc<Semaphore>,
}

impl FlowController {
    pub fn new(config: &FlowControlConfig) -> Self {
        Self {
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            workers: Arc::new(Semaphore::new(config.worker_count.max(1))),
        }
    }

    /// Waits for room for one more handler.
    pub async fn acquire_in_flight(&self) -> EngineResult<OwnedSemaphorePermit> {
        self.in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::ServiceClosed("in-flight flow controller"))
    }

    /// Waits for a free worker.
    pub async fn acquire_worker(&self) -> EngineResult<OwnedSemaphorePermit> {
        self.workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::ServiceClosed("worker pool"))
    }

    pub fn close(&self) {
        self.in_flight.close();
        self.workers.close();
    }
}
