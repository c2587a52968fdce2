pub mod clock;
pub mod completion;
pub mod error;
pub mod metrics;
pub mod reporter;
pub mod runner;
pub mod stream;
pub mod traits;
pub mod types;

pub use clock::{DynTimeSource, SystemTimeSource, TimeSource};
pub use completion::{CompletionTimeService, LocalCompletionTimeWriter, LocalCompletionTracker};
pub use error::{EngineError, EngineResult};
pub use metrics::{
    DelayStats, MetricsService, OperationMetricsSnapshot, WorkloadResultsSnapshot,
};
pub use reporter::{ErrorReporter, ReportedError};
pub use runner::{DynDb, FlowControlConfig, FlowController, RunnerComponents, WorkloadRunner};
pub use stream::{
    LimitedStream, MergedStream, ScheduledOperation, WorkloadLimits, compress_stream,
    limit_stream, merge_streams, offset_stream, time_map,
};
pub use traits::{ResultsSink, SinkError};
pub use types::{
    AbandonedOperation, ExecutionDelayPolicy, MetricsConfig, MetricsRecord, RunSummary,
    RunnerConfig, RunnerState,
};
