use std::path::Path;

use benchdrive_core::Registry;
use benchdrive_synthetic::{
    MEMORY_DB_NAME, MemoryDb, NOOP_DB_NAME, NoopDb, SyntheticPayload, SyntheticWorkload,
    WORKLOAD_NAME,
};
use tracing_appender::non_blocking::WorkerGuard;

/// Payload type understood by every built-in plugin.
pub type DefaultPayload = SyntheticPayload;

/// Assembles a registry holding every built-in workload and database.
pub fn build_default_registry() -> Registry<DefaultPayload> {
    let mut registry = Registry::new();

    // Databases
    registry.register_db(MEMORY_DB_NAME, || Box::new(MemoryDb::new()));
    registry.register_db(NOOP_DB_NAME, || Box::new(NoopDb::new()));

    // Workloads
    registry.register_workload(WORKLOAD_NAME, || Box::new(SyntheticWorkload::new()));

    registry
}

/// Sets up file logging under `log_dir` (or the per-user default) for the
/// binary named `component`. Keep the guard alive until exit.
pub fn init_logging(component: &str, log_dir: Option<&Path>, to_stderr: bool) -> WorkerGuard {
    benchdrive_core::logging::init_logging(component, log_dir, to_stderr)
}
