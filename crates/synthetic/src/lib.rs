//! Built-in plugins: a synthetic key/value workload and the databases it
//! can run against without any external system.

pub mod db;
pub mod generator;
pub mod payload;
pub mod workload;

pub use db::{MemoryDb, NoopDb};
pub use payload::{READ, SCAN, SyntheticPayload, UPDATE};
pub use workload::{SyntheticConfig, SyntheticWorkload};

pub const WORKLOAD_NAME: &str = "synthetic";
pub const MEMORY_DB_NAME: &str = "memory";
pub const NOOP_DB_NAME: &str = "noop";
