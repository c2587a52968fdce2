use benchdrive_api::Duration;
use benchdrive_core::{Client, ClientMode, ClientOutcome, DriverConfig};
use benchdrive_runtime::build_default_registry;
use tempfile::tempdir;

#[test]
fn test_registry_lists_builtin_plugins() {
    let registry = build_default_registry();
    assert_eq!(registry.db_names().collect::<Vec<_>>(), vec!["memory", "noop"]);
    assert_eq!(registry.workload_names().collect::<Vec<_>>(), vec!["synthetic"]);
}

fn synthetic_config(mode: ClientMode) -> DriverConfig {
    let mut config = DriverConfig {
        mode,
        db: Some("memory".to_string()),
        workload: Some("synthetic".to_string()),
        start_delay: Duration::from_millis(20),
        tolerated_delay: Duration::from_secs(5),
        compression_ratio: 0.1,
        thread_count: 4,
        ..Default::default()
    };
    config.workload_params.insert("operation_count", "300");
    config.db_params.insert("record_count", "100");
    config.workload_params.insert("record_count", "100");
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_synthetic_workload_runs_against_memory_db() {
    let dir = tempdir().expect("tempdir");
    let config = DriverConfig {
        results_dir: Some(dir.path().to_path_buf()),
        results_log: true,
        peer_ids: vec!["local".to_string()],
        ..synthetic_config(ClientMode::Execute)
    };
    let outcome = Client::new(config, build_default_registry())
        .run()
        .await
        .expect("run succeeds");
    let ClientOutcome::Executed(report) = outcome else {
        panic!("expected an execution report");
    };
    assert_eq!(report.summary.completed, 300);
    assert_eq!(report.results.total_failures, 0);
    let counted: u64 = report.results.operations.iter().map(|op| op.count).sum();
    assert_eq!(counted, 300);
    assert!(dir.path().join("benchdrive-results.json").is_file());
}

#[tokio::test]
async fn test_synthetic_validation_params_replay_on_fresh_db() {
    let dir = tempdir().expect("tempdir");
    let params_file = dir.path().join("validation.csv");

    let create = synthetic_config(ClientMode::CreateValidationParams {
        params_file: params_file.clone(),
        set_size: 50,
    });
    let outcome = Client::new(create, build_default_registry())
        .run()
        .await
        .expect("created");
    assert!(matches!(
        outcome,
        ClientOutcome::ValidationParamsCreated { written: 50, .. }
    ));

    let validate = synthetic_config(ClientMode::ValidateDatabase { params_file });
    let outcome = Client::new(validate, build_default_registry())
        .run()
        .await
        .expect("validated");
    let ClientOutcome::DatabaseValidated(result) = outcome else {
        panic!("expected database validation");
    };
    assert_eq!(result.passed, 50);
    assert!(result.is_successful());
}

#[tokio::test]
async fn test_synthetic_workload_validates() {
    let outcome = Client::new(
        synthetic_config(ClientMode::ValidateWorkload),
        build_default_registry(),
    )
    .run()
    .await
    .expect("validated");
    assert!(outcome.is_successful(), "{}", outcome.render());
}
