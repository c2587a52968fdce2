use crate::error::WorkloadResult;
use crate::models::{Duration, Operation, OperationType, WorkloadParams};

/// A lazy, finite sequence of operations. Errors are yielded in place.
pub type OperationIter<P> = Box<dyn Iterator<Item = WorkloadResult<Operation<P>>> + Send>;

/// Operations of one kind, split into those whose completion other
/// operations depend on and everything else. Each half must be ordered by
/// scheduled start.
pub struct WorkloadStream<P> {
    pub operation_type: OperationType,
    pub dependencies: OperationIter<P>,
    pub others: OperationIter<P>,
}

impl<P: Send + 'static> WorkloadStream<P> {
    pub fn new(
        operation_type: impl Into<OperationType>,
        dependencies: OperationIter<P>,
        others: OperationIter<P>,
    ) -> Self {
        Self {
            operation_type: operation_type.into(),
            dependencies,
            others,
        }
    }

    /// Builds a stream from already materialized operations.
    pub fn from_vecs(
        operation_type: impl Into<OperationType>,
        dependencies: Vec<Operation<P>>,
        others: Vec<Operation<P>>,
    ) -> Self {
        Self::new(
            operation_type,
            Box::new(dependencies.into_iter().map(Ok)),
            Box::new(others.into_iter().map(Ok)),
        )
    }
}

impl<P> std::fmt::Debug for WorkloadStream<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadStream")
            .field("operation_type", &self.operation_type)
            .finish_non_exhaustive()
    }
}

/// A workload definition: produces the timed operation streams to replay.
pub trait Workload<P>: Send {
    fn init(&mut self, params: &WorkloadParams) -> WorkloadResult<()>;

    /// Builds the operation streams. The same seed must yield the same
    /// operations.
    fn streams(&mut self, seed: u64) -> WorkloadResult<Vec<WorkloadStream<P>>>;

    /// Upper bound on how far apart a dependency and its dependent may be
    /// scheduled.
    fn max_expected_interleave(&self) -> Duration;

    /// Decides whether an operation is kept when building validation
    /// parameters.
    fn validation_filter(&self, _operation: &Operation<P>) -> bool {
        true
    }

    fn cleanup(&mut self) -> WorkloadResult<()>;
}
