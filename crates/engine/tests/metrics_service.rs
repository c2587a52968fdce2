use std::sync::{Arc, Mutex};

use benchdrive_api::{Duration, Instant, OperationType, TimeUnit};
use benchdrive_engine::{
    EngineError, ErrorReporter, MetricsConfig, MetricsRecord, MetricsService, ResultsSink,
    SinkError,
};

fn record(operation_type: &str, scheduled_ms: i64, delay_ms: i64, took_ms: i64, success: bool) -> MetricsRecord {
    let scheduled_start = Instant::from_millis(scheduled_ms);
    MetricsRecord {
        operation_type: OperationType::from(operation_type),
        scheduled_start,
        actual_start: scheduled_start + Duration::from_millis(delay_ms),
        execution_duration: Duration::from_millis(took_ms),
        success,
    }
}

fn config(queue_capacity: usize) -> MetricsConfig {
    MetricsConfig {
        queue_capacity,
        time_unit: TimeUnit::Milli,
        record_start_delay: true,
    }
}

#[derive(Clone, Default)]
struct TestSink {
    rows: Arc<Mutex<Vec<MetricsRecord>>>,
    fail_from: Option<usize>,
    pause: Option<std::time::Duration>,
}

impl ResultsSink for TestSink {
    fn write(&mut self, record: &MetricsRecord) -> Result<(), SinkError> {
        if let Some(pause) = self.pause {
            std::thread::sleep(pause);
        }
        let mut rows = self.rows.lock().expect("lock poisoned");
        if self.fail_from.is_some_and(|n| rows.len() >= n) {
            return Err("disk full".into());
        }
        rows.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_beyond_bound_lose_nothing() {
    let service = Arc::new(MetricsService::start(config(16), ErrorReporter::new(), None));
    let producers = 8;
    let per_producer = 250;

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                for i in 0..per_producer {
                    service
                        .submit(record(if p % 2 == 0 { "read" } else { "update" }, i, 0, 1, true))
                        .await
                        .expect("submit while running");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.expect("producer task");
    }

    service.shutdown().await.expect("shutdown");
    let snapshot = service.results().expect("finalized");
    assert_eq!(snapshot.total_count, (producers * per_producer) as u64);
    assert_eq!(
        snapshot
            .operation(&OperationType::from("read"))
            .map(|op| op.count),
        Some(1000)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_blocks_producer() {
    let sink = TestSink {
        pause: Some(std::time::Duration::from_millis(20)),
        ..TestSink::default()
    };
    let rows = Arc::clone(&sink.rows);
    let service = MetricsService::start(config(2), ErrorReporter::new(), Some(Box::new(sink)));

    let started = std::time::Instant::now();
    for i in 0..10 {
        service
            .submit(record("read", i, 0, 1, true))
            .await
            .expect("submit while running");
    }
    // the consumer can be at most one record ahead of a queue of two
    assert!(started.elapsed() >= std::time::Duration::from_millis(100));

    service.shutdown().await.expect("shutdown");
    assert_eq!(rows.lock().expect("lock poisoned").len(), 10);
    assert_eq!(service.results().expect("finalized").total_count, 10);
}

#[tokio::test]
async fn test_results_require_shutdown_and_shutdown_is_idempotent() {
    let service = MetricsService::start(config(8), ErrorReporter::new(), None);
    service
        .submit(record("read", 0, 0, 1, true))
        .await
        .expect("submit");
    assert!(matches!(
        service.results(),
        Err(EngineError::MetricsNotFinalized)
    ));

    service.shutdown().await.expect("first shutdown");
    service.shutdown().await.expect("second shutdown");
    assert_eq!(service.results().expect("finalized").total_count, 1);
    assert!(matches!(
        service.submit(record("read", 1, 0, 1, true)).await,
        Err(EngineError::ServiceClosed(_))
    ));
}

#[tokio::test]
async fn test_per_type_aggregates() {
    let service = MetricsService::start(config(8), ErrorReporter::new(), None);
    let records = [
        record("read", 0, 2, 10, true),
        record("read", 10, 4, 30, false),
        record("read", 20, 0, 20, true),
        record("scan", 5, 1, 100, true),
    ];
    for r in records {
        service.submit(r).await.expect("submit");
    }
    service.shutdown().await.expect("shutdown");
    let snapshot = service.results().expect("finalized");

    assert_eq!(snapshot.unit, TimeUnit::Milli);
    assert_eq!(snapshot.total_count, 4);
    assert_eq!(snapshot.total_failures, 1);
    assert_eq!(
        snapshot.operations
            .iter()
            .map(|op| op.operation_type.as_str())
            .collect::<Vec<_>>(),
        vec!["read", "scan"]
    );

    let read = snapshot
        .operation(&OperationType::from("read"))
        .expect("read metrics");
    assert_eq!(read.count, 3);
    assert_eq!(read.failures, 1);
    assert_eq!(read.min_latency, 10);
    assert_eq!(read.max_latency, 30);
    assert_eq!(read.mean_latency, 20.0);
    assert!(read.p50_latency >= read.min_latency && read.p50_latency <= read.max_latency);
    assert_eq!(read.p99_latency, 30);
    let delay = read.start_delay.as_ref().expect("start delays recorded");
    assert_eq!((delay.min, delay.max), (0, 4));
    assert_eq!(delay.mean, 2.0);

    // earliest actual start is the first read at 2ms, latest finish the scan at 106ms
    assert_eq!(snapshot.start, Some(Instant::from_millis(2)));
    assert_eq!(snapshot.finish, Some(Instant::from_millis(106)));
    assert_eq!(snapshot.total_run_duration, Duration::from_millis(104));
}

#[tokio::test]
async fn test_failing_sink_is_disabled_but_records_are_kept() {
    let reporter = ErrorReporter::new();
    let sink = TestSink {
        fail_from: Some(2),
        ..TestSink::default()
    };
    let rows = Arc::clone(&sink.rows);
    let service = MetricsService::start(config(4), reporter.clone(), Some(Box::new(sink)));
    for i in 0..5 {
        service
            .submit(record("read", i, 0, 1, true))
            .await
            .expect("submit");
    }
    service.shutdown().await.expect("shutdown");

    assert_eq!(rows.lock().expect("lock poisoned").len(), 2);
    assert_eq!(service.results().expect("finalized").total_count, 5);
    assert_eq!(reporter.errors().len(), 1);
    assert!(
        reporter
            .first_error()
            .expect("sink error reported")
            .message
            .contains("disk full")
    );
}
