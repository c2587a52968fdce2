use std::collections::BTreeMap;

use benchdrive_api::{Duration, Instant, OperationType};
use benchdrive_engine::{EngineResult, ScheduledOperation};
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStatistics {
    pub operation_type: OperationType,
    pub count: u64,
    pub first_start: Instant,
    pub last_start: Instant,
    /// Gaps between consecutive starts of this type. `None` below two
    /// operations.
    pub min_gap: Option<Duration>,
    pub mean_gap: Option<Duration>,
    pub max_gap: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkloadStatistics {
    pub total_count: u64,
    pub first_start: Option<Instant>,
    pub last_start: Option<Instant>,
    pub duration: Duration,
    /// Operations from dependency sub-sequences.
    pub dependency_count: u64,
    pub gated_count: u64,
    pub operations: Vec<OperationStatistics>,
}

impl WorkloadStatistics {
    pub fn operation(&self, operation_type: &OperationType) -> Option<&OperationStatistics> {
        self.operations
            .iter()
            .find(|op| &op.operation_type == operation_type)
    }
}

struct Accumulator {
    count: u64,
    first: Instant,
    last: Instant,
    min_gap: Option<Duration>,
    max_gap: Option<Duration>,
    gap_sum: i128,
}

impl Accumulator {
    fn new(start: Instant) -> Self {
        Self {
            count: 1,
            first: start,
            last: start,
            min_gap: None,
            max_gap: None,
            gap_sum: 0,
        }
    }

    fn push(&mut self, start: Instant) {
        let gap = Duration::from_nanos(start.as_nanos().saturating_sub(self.last.as_nanos()));
        self.min_gap = Some(self.min_gap.map_or(gap, |g| g.min(gap)));
        self.max_gap = Some(self.max_gap.map_or(gap, |g| g.max(gap)));
        self.gap_sum += i128::from(gap.as_nanos());
        self.last = start;
        self.count += 1;
    }

    fn finish(self, operation_type: OperationType) -> OperationStatistics {
        let mean_gap = (self.count > 1).then(|| {
            let mean = self.gap_sum / i128::from(self.count - 1);
            Duration::from_nanos(i64::try_from(mean).unwrap_or(i64::MAX))
        });
        OperationStatistics {
            operation_type,
            count: self.count,
            first_start: self.first,
            last_start: self.last,
            min_gap: self.min_gap,
            mean_gap,
            max_gap: self.max_gap,
        }
    }
}

/// Summarizes a merged, time-ordered operation sequence without executing
/// it.
pub fn calculate_statistics<P, I>(operations: I) -> Result<WorkloadStatistics>
where
    I: Iterator<Item = EngineResult<ScheduledOperation<P>>>,
{
    let mut per_type: BTreeMap<OperationType, Accumulator> = BTreeMap::new();
    let mut stats = WorkloadStatistics::default();

    for item in operations {
        let scheduled = item?;
        let operation = &scheduled.operation;
        let start = operation.scheduled_start;

        stats.total_count += 1;
        stats.first_start.get_or_insert(start);
        stats.last_start = Some(start);
        if scheduled.tracked {
            stats.dependency_count += 1;
        }
        if operation.is_gated() {
            stats.gated_count += 1;
        }
        match per_type.get_mut(&operation.operation_type) {
            Some(acc) => acc.push(start),
            None => {
                per_type.insert(operation.operation_type.clone(), Accumulator::new(start));
            }
        }
    }

    if let (Some(first), Some(last)) = (stats.first_start, stats.last_start) {
        stats.duration = last
            .checked_duration_since(first)
            .unwrap_or(Duration::from_nanos(i64::MAX));
    }
    stats.operations = per_type
        .into_iter()
        .map(|(operation_type, acc)| acc.finish(operation_type))
        .collect();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchdrive_api::Operation;

    fn op(kind: &'static str, at: i64, tracked: bool) -> EngineResult<ScheduledOperation<()>> {
        let mut operation = Operation::new(kind, Instant::from_millis(at), ());
        if kind == "read" {
            operation = operation.gated_on(Instant::from_millis(at - 1));
        }
        Ok(ScheduledOperation { operation, tracked })
    }

    #[test]
    fn test_per_type_gaps() {
        let ops = vec![
            op("update", 0, true),
            op("read", 10, false),
            op("update", 20, true),
            op("read", 40, false),
            op("update", 50, true),
        ];
        let stats = calculate_statistics(ops.into_iter()).expect("statistics");

        assert_eq!(stats.total_count, 5);
        assert_eq!(stats.duration, Duration::from_millis(50));
        assert_eq!(stats.dependency_count, 3);
        assert_eq!(stats.gated_count, 2);

        let update = stats.operation(&"update".into()).expect("update stats");
        assert_eq!(update.count, 3);
        assert_eq!(update.min_gap, Some(Duration::from_millis(20)));
        assert_eq!(update.max_gap, Some(Duration::from_millis(30)));
        assert_eq!(update.mean_gap, Some(Duration::from_millis(25)));

        let read = stats.operation(&"read".into()).expect("read stats");
        assert_eq!(read.first_start, Instant::from_millis(10));
        assert_eq!(read.mean_gap, Some(Duration::from_millis(30)));
    }

    #[test]
    fn test_single_operation_has_no_gaps() {
        let stats = calculate_statistics(vec![op("scan", 5, false)].into_iter()).expect("stats");
        let scan = &stats.operations[0];
        assert_eq!(scan.count, 1);
        assert_eq!(scan.min_gap, None);
        assert_eq!(scan.mean_gap, None);
        assert_eq!(stats.duration, Duration::ZERO);
    }

    #[test]
    fn test_empty_sequence() {
        let stats =
            calculate_statistics(std::iter::empty::<EngineResult<ScheduledOperation<()>>>())
                .expect("stats");
        assert_eq!(stats, WorkloadStatistics::default());
    }
}
