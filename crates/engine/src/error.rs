use benchdrive_api::{Duration, Instant, OperationType, TemporalError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("stream construction failed: {0}")]
    StreamConstruction(String),
    #[error("completion time ordering violated: {0}")]
    CompletionTimeOrdering(String),
    #[error("{0} is closed")]
    ServiceClosed(&'static str),
    #[error("no free peer slots ({0} configured)")]
    NoPeerSlots(usize),
    #[error("global completion time did not reach {target} within {timeout}")]
    GctTimeout { target: Instant, timeout: Duration },
    #[error(
        "{operation_type} scheduled at {scheduled_start} started {delay} late (tolerated {tolerated})"
    )]
    ExecutionDelay {
        operation_type: OperationType,
        scheduled_start: Instant,
        delay: Duration,
        tolerated: Duration,
    },
    #[error("{operation_type} scheduled at {scheduled_start} failed: {reason}")]
    OperationExecution {
        operation_type: OperationType,
        scheduled_start: Instant,
        reason: String,
    },
    #[error("{operation_type} scheduled at {scheduled_start} did not finish within {grace}")]
    DrainTimeout {
        operation_type: OperationType,
        scheduled_start: Instant,
        grace: Duration,
    },
    #[error("results requested before shutdown")]
    MetricsNotFinalized,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("task join failure: {0}")]
    Join(String),
    #[error(transparent)]
    Temporal(#[from] TemporalError),
}

impl EngineError {
    /// Name of the component that raised the error.
    pub fn component(&self) -> &'static str {
        match self {
            EngineError::StreamConstruction(_) => "stream merger",
            EngineError::CompletionTimeOrdering(_) | EngineError::NoPeerSlots(_) => {
                "completion time service"
            }
            EngineError::ServiceClosed(service) => service,
            EngineError::GctTimeout { .. }
            | EngineError::ExecutionDelay { .. }
            | EngineError::DrainTimeout { .. }
            | EngineError::InvalidState(_)
            | EngineError::Join(_) => "workload runner",
            EngineError::OperationExecution { .. } => "database",
            EngineError::MetricsNotFinalized => "metrics service",
            EngineError::Temporal(_) => "time",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
