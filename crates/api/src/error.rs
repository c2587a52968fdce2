use crate::models::{OperationType, TimeUnit};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemporalError {
    #[error("Overflow converting {value} from {from} to {to}")]
    Overflow {
        value: i64,
        from: TimeUnit,
        to: TimeUnit,
    },
    #[error("Arithmetic overflow: {0}")]
    Arithmetic(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Initialization failed: {0}")]
    Init(String),
    #[error("Execution of {operation_type} failed: {reason}")]
    Execution {
        operation_type: OperationType,
        reason: String,
    },
    #[error("No handler registered for operation type {0}")]
    UnsupportedOperation(OperationType),
    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Initialization failed: {0}")]
    Init(String),
    #[error("Stream generation failed: {0}")]
    Stream(String),
    #[error("Cleanup failed: {0}")]
    Cleanup(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;
pub type WorkloadResult<T> = std::result::Result<T, WorkloadError>;
