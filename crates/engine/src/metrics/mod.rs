use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use benchdrive_api::{Duration, Instant, OperationType, TimeUnit};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::reporter::ErrorReporter;
use crate::traits::ResultsSink;
use crate::types::{MetricsConfig, MetricsRecord};

pub mod histogram;

pub use histogram::{HistogramBucket, HistogramSnapshot, Log2Histogram};

const SERVICE_NAME: &str = "metrics service";

enum MetricsMessage {
    Record(MetricsRecord),
    Shutdown,
}

fn to_unit(duration: Duration, unit: TimeUnit) -> u64 {
    duration.as_unit(unit).map_or(u64::MAX, |v| v.max(0) as u64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayStats {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Aggregates for one operation type. Latencies and delays are in `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMetricsSnapshot {
    pub operation_type: OperationType,
    pub count: u64,
    pub failures: u64,
    pub unit: TimeUnit,
    pub min_latency: u64,
    pub max_latency: u64,
    pub mean_latency: f64,
    pub p50_latency: u64,
    pub p90_latency: u64,
    pub p95_latency: u64,
    pub p99_latency: u64,
    pub histogram: HistogramSnapshot,
    pub start_delay: Option<DelayStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadResultsSnapshot {
    pub unit: TimeUnit,
    /// Earliest actual start.
    pub start: Option<Instant>,
    /// Latest actual start plus execution duration.
    pub finish: Option<Instant>,
    pub total_run_duration: Duration,
    pub total_count: u64,
    pub total_failures: u64,
    pub operations: Vec<OperationMetricsSnapshot>,
}

impl WorkloadResultsSnapshot {
    pub fn operation(&self, operation_type: &OperationType) -> Option<&OperationMetricsSnapshot> {
        self.operations
            .iter()
            .find(|op| &op.operation_type == operation_type)
    }

    /// Operations per second over the whole run.
    pub fn throughput(&self) -> f64 {
        let nanos = self.total_run_duration.as_nanos();
        if nanos <= 0 {
            return 0.0;
        }
        self.total_count as f64 / (nanos as f64 / 1e9)
    }
}

#[derive(Default)]
struct TypeAggregate {
    count: u64,
    failures: u64,
    latency: Log2Histogram,
    start_delay: Log2Histogram,
}

struct Aggregator {
    config: MetricsConfig,
    by_type: BTreeMap<OperationType, TypeAggregate>,
    start: Option<Instant>,
    finish: Option<Instant>,
}

impl Aggregator {
    fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            by_type: BTreeMap::new(),
            start: None,
            finish: None,
        }
    }

    fn add(&mut self, record: &MetricsRecord) {
        let unit = self.config.time_unit;
        let entry = self
            .by_type
            .entry(record.operation_type.clone())
            .or_default();
        entry.count += 1;
        if !record.success {
            entry.failures += 1;
        }
        entry
            .latency
            .record(to_unit(record.execution_duration, unit));
        if self.config.record_start_delay {
            entry.start_delay.record(to_unit(record.start_delay(), unit));
        }

        let end = record
            .actual_start
            .checked_add(record.execution_duration)
            .unwrap_or(Instant::MAX);
        self.start = Some(self.start.map_or(record.actual_start, |s| s.min(record.actual_start)));
        self.finish = Some(self.finish.map_or(end, |f| f.max(end)));
    }

    fn finish(self) -> WorkloadResultsSnapshot {
        let unit = self.config.time_unit;
        let operations: Vec<OperationMetricsSnapshot> = self
            .by_type
            .into_iter()
            .map(|(operation_type, agg)| OperationMetricsSnapshot {
                operation_type,
                count: agg.count,
                failures: agg.failures,
                unit,
                min_latency: agg.latency.min().unwrap_or(0),
                max_latency: agg.latency.max().unwrap_or(0),
                mean_latency: agg.latency.mean().unwrap_or(0.0),
                p50_latency: agg.latency.percentile(0.50).unwrap_or(0),
                p90_latency: agg.latency.percentile(0.90).unwrap_or(0),
                p95_latency: agg.latency.percentile(0.95).unwrap_or(0),
                p99_latency: agg.latency.percentile(0.99).unwrap_or(0),
                histogram: agg.latency.snapshot(),
                start_delay: (agg.start_delay.count() > 0).then(|| DelayStats {
                    min: agg.start_delay.min().unwrap_or(0),
                    max: agg.start_delay.max().unwrap_or(0),
                    mean: agg.start_delay.mean().unwrap_or(0.0),
                }),
            })
            .collect();

        let total_run_duration = match (self.start, self.finish) {
            (Some(start), Some(finish)) => finish
                .checked_duration_since(start)
                .unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        };
        WorkloadResultsSnapshot {
            unit,
            start: self.start,
            finish: self.finish,
            total_run_duration,
            total_count: operations.iter().map(|op| op.count).sum(),
            total_failures: operations.iter().map(|op| op.failures).sum(),
            operations,
        }
    }
}

fn consume(
    mut rx: mpsc::Receiver<MetricsMessage>,
    config: MetricsConfig,
    mut sink: Option<Box<dyn ResultsSink>>,
    reporter: ErrorReporter,
) -> WorkloadResultsSnapshot {
    let mut aggregator = Aggregator::new(config);
    let mut handle = |record: MetricsRecord, sink: &mut Option<Box<dyn ResultsSink>>| {
        if let Some(writer) = sink.as_mut()
            && let Err(e) = writer.write(&record)
        {
            reporter.report(SERVICE_NAME, format!("results log disabled: {e}"));
            *sink = None;
        }
        aggregator.add(&record);
    };

    while let Some(message) = rx.blocking_recv() {
        match message {
            MetricsMessage::Record(record) => handle(record, &mut sink),
            MetricsMessage::Shutdown => break,
        }
    }
    // Anything accepted while the shutdown marker was in flight.
    rx.close();
    while let Ok(message) = rx.try_recv() {
        if let MetricsMessage::Record(record) = message {
            handle(record, &mut sink);
        }
    }

    if let Some(writer) = sink.as_mut()
        && let Err(e) = writer.flush()
    {
        reporter.report(SERVICE_NAME, format!("flushing results log failed: {e}"));
    }
    aggregator.finish()
}

/// Bounded queue of metrics records drained by a dedicated consumer thread.
///
/// `submit` waits only while the queue is full; records are never dropped.
pub struct MetricsService {
    tx: mpsc::Sender<MetricsMessage>,
    accepting: AtomicBool,
    consumer: tokio::sync::Mutex<Option<JoinHandle<WorkloadResultsSnapshot>>>,
    snapshot: Mutex<Option<WorkloadResultsSnapshot>>,
}

impl MetricsService {
    /// Starts the consumer. Must be called from within a tokio runtime.
    pub fn start(
        config: MetricsConfig,
        reporter: ErrorReporter,
        sink: Option<Box<dyn ResultsSink>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        debug!(
            "starting metrics consumer (capacity {}, unit {})",
            config.queue_capacity, config.time_unit
        );
        let consumer = tokio::task::spawn_blocking(move || consume(rx, config, sink, reporter));
        Self {
            tx,
            accepting: AtomicBool::new(true),
            consumer: tokio::sync::Mutex::new(Some(consumer)),
            snapshot: Mutex::new(None),
        }
    }

    pub async fn submit(&self, record: MetricsRecord) -> EngineResult<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(EngineError::ServiceClosed(SERVICE_NAME));
        }
        self.tx
            .send(MetricsMessage::Record(record))
            .await
            .map_err(|_| EngineError::ServiceClosed(SERVICE_NAME))
    }

    /// Stops accepting records, waits for every queued record to be
    /// consumed and stores the final snapshot. Calling it again is a no-op.
    pub async fn shutdown(&self) -> EngineResult<()> {
        let mut consumer = self.consumer.lock().await;
        let Some(handle) = consumer.take() else {
            return Ok(());
        };
        self.accepting.store(false, Ordering::Release);
        // The consumer may already be gone; its join result says why.
        let _ = self.tx.send(MetricsMessage::Shutdown).await;
        let snapshot = handle
            .await
            .map_err(|e| EngineError::Join(format!("metrics consumer: {e}")))?;
        info!(
            "metrics finalized: {} operations, {} failed",
            snapshot.total_count, snapshot.total_failures
        );
        *self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        Ok(())
    }

    pub fn results(&self) -> EngineResult<WorkloadResultsSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::MetricsNotFinalized)
    }
}
