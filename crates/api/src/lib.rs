pub mod db;
pub mod error;
pub mod models;
pub mod workload;

// Re-export commonly used types
pub use db::{Db, HandlerTable, OperationHandler};
pub use error::{DbError, DbResult, TemporalError, WorkloadError, WorkloadResult};
pub use models::*;
pub use workload::{OperationIter, Workload, WorkloadStream};
