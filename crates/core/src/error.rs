use benchdrive_api::{DbError, WorkloadError};
use benchdrive_engine::EngineError;
use thiserror::Error;

use crate::client::ExecutionReport;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("{component}: {0}", component = .0.component())]
    Engine(#[from] EngineError),
    #[error("database: {0}")]
    Db(#[from] DbError),
    #[error("workload: {0}")]
    Workload(#[from] WorkloadError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation: {0}")]
    Validation(String),
    #[error("{component}: {message}")]
    RunFailed {
        component: String,
        message: String,
        /// What finished before the run stopped, when dispatch had begun.
        report: Option<Box<ExecutionReport>>,
    },
    #[error("registry: no {kind} named {name:?} (available: {available})")]
    UnknownPlugin {
        kind: &'static str,
        name: String,
        available: String,
    },
}

impl DriverError {
    /// Name of the component that failed, used for the final diagnostic.
    pub fn component(&self) -> &str {
        match self {
            DriverError::Config(_) => "configuration",
            DriverError::Engine(e) => e.component(),
            DriverError::Db(_) => "database",
            DriverError::Workload(_) => "workload",
            DriverError::Io(_) => "io",
            DriverError::Csv(_) => "csv",
            DriverError::Json(_) => "json",
            DriverError::Validation(_) => "validation",
            DriverError::RunFailed { component, .. } => component,
            DriverError::UnknownPlugin { .. } => "registry",
        }
    }

    /// Results gathered by a run that failed after it started dispatching.
    pub fn partial_report(&self) -> Option<&ExecutionReport> {
        match self {
            DriverError::RunFailed { report, .. } => report.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
