use benchdrive_api::{
    DbError, Duration, HandlerTable, Instant, Operation, OperationResult, OperationType,
    TemporalError, TimeUnit,
};

#[test]
fn test_instant_duration_arithmetic_round_trips() {
    let samples = [
        (0_i64, 0_i64),
        (1_000, 1),
        (1_700_000_000_000_000_000, 25_000_000),
        (-5_000, 12_345),
        (42, -41),
    ];
    for (at, by) in samples {
        let instant = Instant::from_nanos(at);
        let duration = Duration::from_nanos(by);
        assert_eq!((instant + duration) - duration, instant);
        assert_eq!((instant + duration) - instant, duration);
    }
}

#[test]
fn test_checked_arithmetic_reports_overflow() {
    assert_eq!(Instant::MAX.checked_add(Duration::from_nanos(1)), None);
    assert_eq!(Instant::MIN.checked_sub(Duration::from_nanos(1)), None);
    assert_eq!(
        Instant::MAX.checked_sub(Duration::from_nanos(1)),
        Some(Instant::from_nanos(i64::MAX - 1))
    );
}

#[test]
fn test_coarser_conversion_rejects_boundary_values() {
    let err = Instant::MAX.as_millis().unwrap_err();
    assert_eq!(
        err,
        TemporalError::Overflow {
            value: i64::MAX,
            from: TimeUnit::Nano,
            to: TimeUnit::Milli,
        }
    );
    assert!(Duration::from_nanos(i64::MIN).as_secs().is_err());
    assert_eq!(Duration::from_millis(1_500).as_secs(), Ok(1));
    assert_eq!(Instant::from_nanos(2_500_000).as_micros(), Ok(2_500));
}

#[test]
fn test_finer_conversion_checks_multiplication() {
    assert_eq!(
        Duration::from_unit(3, TimeUnit::Minute),
        Ok(Duration::from_secs(180))
    );
    assert!(Instant::from_unit(i64::MAX / 10, TimeUnit::Micro).is_err());
}

#[test]
fn test_duration_scaling_rounds_to_nearest_nanosecond() {
    assert_eq!(
        Duration::from_nanos(3).mul_f64(0.5),
        Some(Duration::from_nanos(2))
    );
    assert_eq!(Duration::from_nanos(i64::MAX).mul_f64(2.0), None);
    assert_eq!(Duration::from_nanos(10).mul_f64(f64::NAN), None);
}

#[test]
fn test_std_duration_conversion() {
    let std = std::time::Duration::from_millis(7);
    assert_eq!(Duration::from(std), Duration::from_millis(7));
    assert_eq!(Duration::from_millis(7).to_std(), std);
    assert_eq!(Duration::from_nanos(-1).to_std(), std::time::Duration::ZERO);
}

#[test]
fn test_operation_serde_keeps_type_tag_and_times() {
    let op = Operation::new("read", Instant::from_nanos(10), 7_u32).gated_on(Instant::from_nanos(4));
    let json = serde_json::to_string(&op).expect("serialize operation");
    assert!(json.contains("\"operation_type\":\"read\""));
    let back: Operation<u32> = serde_json::from_str(&json).expect("deserialize operation");
    assert_eq!(back, op);
    assert!(back.is_gated());
    assert!(back.dependency_time_is_valid());
}

#[test]
fn test_handler_table_dispatches_by_type() {
    let table: HandlerTable<u32> = HandlerTable::new()
        .with("double", |op: &Operation<u32>| {
            Ok(OperationResult::from(serde_json::json!(op.payload * 2)))
        });

    let op = Operation::new("double", Instant::EPOCH, 21);
    let result = table.dispatch(&op).expect("handler registered");
    assert_eq!(result.value(), &serde_json::json!(42));

    let unknown = Operation::new("triple", Instant::EPOCH, 1);
    match table.dispatch(&unknown) {
        Err(DbError::UnsupportedOperation(t)) => assert_eq!(t, OperationType::from("triple")),
        other => panic!("expected unsupported operation, got {other:?}"),
    }
}
