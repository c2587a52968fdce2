use std::sync::Arc;

use benchdrive_api::{Duration, Instant};
use benchdrive_engine::{CompletionTimeService, EngineError, LocalCompletionTracker};

fn t(nanos: i64) -> Instant {
    Instant::from_nanos(nanos)
}

fn peers(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("peer-{i}")).collect()
}

#[test]
fn test_gct_is_min_over_peers_and_never_decreases() {
    let service = CompletionTimeService::new(peers(3)).expect("service should start");
    let writers: Vec<_> = (0..3)
        .map(|_| {
            service
                .new_local_completion_time_writer()
                .expect("free slot")
        })
        .collect();

    // (writer, initiated, completed) in submission order
    let steps = [
        (0, 10, 5),
        (1, 20, 15),
        (2, 8, 8),
        (0, 30, 25),
        (2, 40, 12),
        (1, 50, 50),
        (2, 60, 60),
        (0, 70, 70),
    ];
    let mut latest = [None::<i64>; 3];
    let mut previous_gct: Option<Instant> = None;
    for (writer, initiated, completed) in steps {
        writers[writer]
            .submit_local_initiated_time(t(initiated))
            .expect("monotonic initiated");
        writers[writer]
            .submit_local_completed_time(t(completed))
            .expect("monotonic completed");
        latest[writer] = Some(completed);

        let gct = service.global_completion_time();
        let expected = if latest.iter().all(Option::is_some) {
            latest.iter().flatten().min().copied().map(t)
        } else {
            None
        };
        assert_eq!(gct, expected);
        if let (Some(before), Some(now)) = (previous_gct, gct) {
            assert!(now >= before, "gct regressed from {before} to {now}");
        }
        previous_gct = gct.or(previous_gct);
    }
    assert_eq!(service.global_completion_time(), Some(t(50)));
}

#[test]
fn test_zero_peers_pins_gct_to_max() {
    let service = CompletionTimeService::new(vec![]).expect("service should start");
    assert_eq!(service.global_completion_time(), Some(Instant::MAX));
    assert_eq!(service.slot_count(), 0);
    assert!(matches!(
        service.new_local_completion_time_writer(),
        Err(EngineError::NoPeerSlots(0))
    ));
}

#[tokio::test]
async fn test_zero_peers_never_blocks_waiters() {
    let service = CompletionTimeService::new(vec![]).expect("service should start");
    let started = std::time::Instant::now();
    assert!(
        service
            .wait_for_global_completion_time(Instant::MAX, Duration::from_secs(5))
            .await
    );
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[test]
fn test_out_of_order_submissions_are_rejected() {
    let service = CompletionTimeService::new(peers(1)).expect("service should start");
    let writer = service
        .new_local_completion_time_writer()
        .expect("free slot");

    writer.submit_local_initiated_time(t(100)).expect("first");
    assert!(matches!(
        writer.submit_local_initiated_time(t(99)),
        Err(EngineError::CompletionTimeOrdering(_))
    ));
    assert!(matches!(
        writer.submit_local_completed_time(t(101)),
        Err(EngineError::CompletionTimeOrdering(_))
    ));
    writer.submit_local_completed_time(t(100)).expect("completed at initiated");
    assert!(matches!(
        writer.submit_local_completed_time(t(50)),
        Err(EngineError::CompletionTimeOrdering(_))
    ));
}

#[test]
fn test_completed_before_any_initiated_is_rejected() {
    let service = CompletionTimeService::new(peers(1)).expect("service should start");
    let writer = service
        .new_local_completion_time_writer()
        .expect("free slot");
    assert!(matches!(
        writer.submit_local_completed_time(t(1)),
        Err(EngineError::CompletionTimeOrdering(_))
    ));
}

#[test]
fn test_shutdown_closes_writers_and_slots() {
    let service = CompletionTimeService::new(peers(2)).expect("service should start");
    let writer = service
        .new_local_completion_time_writer()
        .expect("free slot");
    service.shutdown();
    service.shutdown();

    assert!(matches!(
        writer.submit_local_initiated_time(t(1)),
        Err(EngineError::ServiceClosed(_))
    ));
    assert!(matches!(
        service.new_local_completion_time_writer(),
        Err(EngineError::ServiceClosed(_))
    ));
}

#[test]
fn test_writer_outliving_service_fails_cleanly() {
    let service = CompletionTimeService::new(peers(1)).expect("service should start");
    let writer = service
        .new_local_completion_time_writer()
        .expect("free slot");
    drop(service);
    assert!(matches!(
        writer.submit_local_initiated_time(t(1)),
        Err(EngineError::ServiceClosed(_))
    ));
}

#[tokio::test]
async fn test_wait_times_out_then_succeeds_after_advance() {
    let service = Arc::new(
        CompletionTimeService::new(peers(1))
            .expect("service should start")
            .with_poll_interval(Duration::from_millis(1)),
    );
    let writer = service
        .new_local_completion_time_writer()
        .expect("free slot");
    writer.submit_local_initiated_time(t(10)).expect("initiated");
    writer.submit_local_completed_time(t(10)).expect("completed");

    assert!(
        !service
            .wait_for_global_completion_time(t(20), Duration::from_millis(30))
            .await
    );

    let waiter = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .wait_for_global_completion_time(t(20), Duration::from_secs(5))
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());
    writer.submit_local_initiated_time(t(25)).expect("initiated");
    writer.submit_local_completed_time(t(25)).expect("completed");
    assert!(waiter.await.expect("waiter task"));
}

#[test]
fn test_tracker_watermark_follows_lowest_pending() {
    let service = CompletionTimeService::new(peers(1)).expect("service should start");
    let writer = service
        .new_local_completion_time_writer()
        .expect("free slot");
    let mut tracker = LocalCompletionTracker::new(writer);

    tracker.seed(t(0)).expect("seed");
    tracker.initiate(t(10)).expect("initiate 10");
    tracker.initiate(t(20)).expect("initiate 20");
    tracker.initiate(t(20)).expect("initiate 20 again");
    tracker.initiate(t(30)).expect("initiate 30");

    tracker.complete(t(20)).expect("complete 20");
    assert_eq!(service.global_completion_time(), Some(t(9)));

    tracker.complete(t(10)).expect("complete 10");
    assert_eq!(service.global_completion_time(), Some(t(19)));

    tracker.complete(t(30)).expect("complete 30");
    assert_eq!(service.global_completion_time(), Some(t(19)));

    tracker.complete(t(20)).expect("complete last 20");
    assert_eq!(service.global_completion_time(), Some(t(30)));
    assert_eq!(tracker.pending_count(), 0);

    assert!(matches!(
        tracker.complete(t(40)),
        Err(EngineError::InvalidState(_))
    ));
}
