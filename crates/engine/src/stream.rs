//! Merging of per-type operation streams into one time-ordered sequence.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use benchdrive_api::{
    Duration, Instant, Operation, OperationIter, OperationType, WorkloadError, WorkloadResult,
    WorkloadStream,
};

use crate::error::{EngineError, EngineResult};

/// An operation as it leaves the merger.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledOperation<P> {
    pub operation: Operation<P>,
    /// Set for operations from a dependency sub-sequence. Their completion
    /// is reported to the completion time service.
    pub tracked: bool,
}

struct Source<P> {
    label: String,
    tracked: bool,
    iter: OperationIter<P>,
    last_start: Option<Instant>,
}

impl<P> Source<P> {
    fn pull(&mut self) -> EngineResult<Option<Operation<P>>> {
        let Some(item) = self.iter.next() else {
            return Ok(None);
        };
        let operation =
            item.map_err(|e| EngineError::StreamConstruction(format!("{}: {e}", self.label)))?;
        if let Some(last) = self.last_start
            && operation.scheduled_start < last
        {
            return Err(EngineError::StreamConstruction(format!(
                "{} is not time ordered: {} follows {last}",
                self.label, operation.scheduled_start
            )));
        }
        if !operation.dependency_time_is_valid() {
            return Err(EngineError::StreamConstruction(format!(
                "{} operation at {} has dependency time {} after its start",
                self.label, operation.scheduled_start, operation.dependency_time
            )));
        }
        self.last_start = Some(operation.scheduled_start);
        Ok(Some(operation))
    }
}

/// Lazy k-way merge of workload streams by scheduled start.
///
/// Ties are broken by source index: stream `i` contributes index `2i` for
/// its dependencies and `2i + 1` for everything else. The first error ends
/// the sequence.
pub struct MergedStream<P> {
    sources: Vec<Source<P>>,
    heads: Vec<Option<Operation<P>>>,
    heap: BinaryHeap<Reverse<(Instant, usize)>>,
    primed: bool,
    pending_error: Option<EngineError>,
    finished: bool,
}

pub fn merge_streams<P>(streams: Vec<WorkloadStream<P>>) -> MergedStream<P> {
    let mut sources = Vec::with_capacity(streams.len() * 2);
    for stream in streams {
        let WorkloadStream {
            operation_type,
            dependencies,
            others,
        } = stream;
        sources.push(Source {
            label: format!("{operation_type} dependencies"),
            tracked: true,
            iter: dependencies,
            last_start: None,
        });
        sources.push(Source {
            label: format!("{operation_type} operations"),
            tracked: false,
            iter: others,
            last_start: None,
        });
    }
    let heads = sources.iter().map(|_| None).collect();
    MergedStream {
        sources,
        heads,
        heap: BinaryHeap::new(),
        primed: false,
        pending_error: None,
        finished: false,
    }
}

impl<P> MergedStream<P> {
    fn refill(&mut self, index: usize) -> EngineResult<()> {
        if let Some(operation) = self.sources[index].pull()? {
            self.heap.push(Reverse((operation.scheduled_start, index)));
            self.heads[index] = Some(operation);
        }
        Ok(())
    }

    fn prime(&mut self) -> EngineResult<()> {
        self.primed = true;
        for index in 0..self.sources.len() {
            self.refill(index)?;
        }
        Ok(())
    }
}

impl<P> Iterator for MergedStream<P> {
    type Item = EngineResult<ScheduledOperation<P>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if !self.primed
            && let Err(e) = self.prime()
        {
            self.finished = true;
            return Some(Err(e));
        }
        if let Some(e) = self.pending_error.take() {
            self.finished = true;
            return Some(Err(e));
        }

        let Some(Reverse((_, index))) = self.heap.pop() else {
            self.finished = true;
            return None;
        };
        let Some(operation) = self.heads[index].take() else {
            self.finished = true;
            return Some(Err(EngineError::InvalidState(
                "merge heap referenced an empty source".to_string(),
            )));
        };
        if let Err(e) = self.refill(index) {
            self.pending_error = Some(e);
        }
        Some(Ok(ScheduledOperation {
            operation,
            tracked: self.sources[index].tracked,
        }))
    }
}

fn validate_ratio(ratio: f64) -> EngineResult<()> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(EngineError::StreamConstruction(format!(
            "compression ratio must be a positive finite number, got {ratio}"
        )));
    }
    Ok(())
}

fn scale_from(anchor: Instant, time: Instant, ratio: f64) -> WorkloadResult<Instant> {
    time.checked_duration_since(anchor)
        .and_then(|gap| gap.mul_f64(ratio))
        .and_then(|gap| anchor.checked_add(gap))
        .ok_or_else(|| {
            WorkloadError::Stream(format!(
                "overflow compressing {time} around {anchor} by {ratio}"
            ))
        })
}

/// Scales the distance of every scheduled start and dependency time from
/// `anchor` by `ratio`.
pub fn compress_stream<P: Send + 'static>(
    operations: OperationIter<P>,
    ratio: f64,
    anchor: Instant,
) -> EngineResult<OperationIter<P>> {
    validate_ratio(ratio)?;
    Ok(Box::new(operations.map(
        move |item: WorkloadResult<Operation<P>>| -> WorkloadResult<Operation<P>> {
            let operation = item?;
            let scheduled_start = scale_from(anchor, operation.scheduled_start, ratio)?;
            let dependency_time = scale_from(anchor, operation.dependency_time, ratio)?;
            Ok(operation.with_times(scheduled_start, dependency_time))
        },
    )))
}

/// Shifts every scheduled start and dependency time by `by`.
pub fn offset_stream<P: Send + 'static>(operations: OperationIter<P>, by: Duration) -> OperationIter<P> {
    Box::new(operations.map(
        move |item: WorkloadResult<Operation<P>>| -> WorkloadResult<Operation<P>> {
            let operation = item?;
            let shift = |time: Instant| {
                time.checked_add(by).ok_or_else(|| {
                    WorkloadError::Stream(format!("overflow offsetting {time} by {by}"))
                })
            };
            let scheduled_start = shift(operation.scheduled_start)?;
            let dependency_time = shift(operation.dependency_time)?;
            Ok(operation.with_times(scheduled_start, dependency_time))
        },
    ))
}

/// Pulls the first item so it can be inspected, returning it alongside an
/// iterator that still yields it.
fn peek_first<P: Send + 'static>(
    mut operations: OperationIter<P>,
) -> (Option<Instant>, OperationIter<P>) {
    match operations.next() {
        None => (None, operations),
        Some(first) => {
            let start = first.as_ref().ok().map(|op| op.scheduled_start);
            (start, Box::new(std::iter::once(first).chain(operations)))
        }
    }
}

/// Moves all streams so they begin at `start`, with every gap scaled by
/// `ratio`.
///
/// Compression is applied first, anchored at the earliest first operation
/// across all streams; the result is then offset so that anchor lands on
/// `start`.
pub fn time_map<P: Send + 'static>(
    streams: Vec<WorkloadStream<P>>,
    start: Instant,
    ratio: f64,
) -> EngineResult<Vec<WorkloadStream<P>>> {
    validate_ratio(ratio)?;

    let mut peeked: Vec<(OperationType, OperationIter<P>, OperationIter<P>)> =
        Vec::with_capacity(streams.len());
    let mut anchor: Option<Instant> = None;
    for stream in streams {
        let (dep_first, dependencies) = peek_first(stream.dependencies);
        let (other_first, others) = peek_first(stream.others);
        for first in [dep_first, other_first].into_iter().flatten() {
            anchor = Some(anchor.map_or(first, |a| a.min(first)));
        }
        peeked.push((stream.operation_type, dependencies, others));
    }

    let Some(anchor) = anchor else {
        return Ok(peeked
            .into_iter()
            .map(|(t, d, o)| WorkloadStream::new(t, d, o))
            .collect());
    };
    let shift = start.checked_duration_since(anchor).ok_or_else(|| {
        EngineError::StreamConstruction(format!("overflow moving {anchor} to {start}"))
    })?;

    peeked
        .into_iter()
        .map(|(operation_type, dependencies, others)| -> EngineResult<WorkloadStream<P>> {
            let dependencies = offset_stream(compress_stream(dependencies, ratio, anchor)?, shift);
            let others = offset_stream(compress_stream(others, ratio, anchor)?, shift);
            Ok(WorkloadStream::new(operation_type, dependencies, others))
        })
        .collect()
}

/// Bounds on how much of a merged stream is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadLimits {
    pub operation_count: Option<u64>,
    /// Relative to the first operation's scheduled start.
    pub duration: Option<Duration>,
}

pub struct LimitedStream<I> {
    inner: I,
    limits: WorkloadLimits,
    emitted: u64,
    first_start: Option<Instant>,
    done: bool,
}

/// Stops after `operation_count` operations, or at the first operation
/// scheduled later than the first start plus `duration`.
pub fn limit_stream<P, I>(operations: I, limits: WorkloadLimits) -> LimitedStream<I>
where
    I: Iterator<Item = EngineResult<ScheduledOperation<P>>>,
{
    LimitedStream {
        inner: operations,
        limits,
        emitted: 0,
        first_start: None,
        done: false,
    }
}

impl<P, I> Iterator for LimitedStream<I>
where
    I: Iterator<Item = EngineResult<ScheduledOperation<P>>>,
{
    type Item = EngineResult<ScheduledOperation<P>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self
            .limits
            .operation_count
            .is_some_and(|limit| self.emitted >= limit)
        {
            self.done = true;
            return None;
        }
        let item = match self.inner.next() {
            Some(Ok(item)) => item,
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e));
            }
            None => {
                self.done = true;
                return None;
            }
        };

        let start = item.operation.scheduled_start;
        let first = *self.first_start.get_or_insert(start);
        if let Some(duration) = self.limits.duration {
            let end = first.checked_add(duration).unwrap_or(Instant::MAX);
            if start > end {
                self.done = true;
                return None;
            }
        }
        self.emitted += 1;
        Some(Ok(item))
    }
}
