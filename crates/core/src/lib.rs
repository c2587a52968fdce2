pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod registry;
pub mod statistics;
pub mod validation;

pub use client::{Client, ClientOutcome, ExecutionReport, prepare_results_dir};
pub use config::{ClientMode, DriverConfig};
pub use error::{DriverError, Result};
pub use registry::{DbFactory, Registry, WorkloadFactory};
pub use statistics::{OperationStatistics, WorkloadStatistics, calculate_statistics};
pub use validation::{DbValidationResult, ValidationFailure, WorkloadValidationResult};
