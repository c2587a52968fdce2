use std::path::PathBuf;
use std::process::ExitCode;

use benchdrive_api::{Duration, Params, TimeUnit, parse_key_value};
use benchdrive_core::{Client, ClientMode, DriverConfig, DriverError};
use clap::{ArgGroup, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "benchdrive",
    version,
    about = "Replays timed benchmark workloads against a database",
    long_about = "benchdrive merges a workload's operation streams into one time-ordered \
                  schedule and executes it against a database adapter in real time, honouring \
                  dependencies between operations, then reports per-operation latency metrics. \
                  It can also validate workloads and databases and describe a workload offline."
)]
#[command(group(ArgGroup::new("mode").multiple(false)))]
pub struct Cli {
    /// Database adapter to run against
    #[arg(long, value_name = "NAME")]
    pub db: Option<String>,

    /// Workload to replay
    #[arg(long, value_name = "NAME")]
    pub workload: Option<String>,

    /// Stop after this many operations
    #[arg(long, value_name = "N")]
    pub operation_count: Option<u64>,

    /// Stop at operations scheduled later than this after the first one
    #[arg(long, value_name = "MS")]
    pub duration_ms: Option<i64>,

    /// Operations executing concurrently
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Largest start delay accepted before the run is stopped
    #[arg(long, value_name = "MS")]
    pub tolerated_delay_ms: Option<i64>,

    /// Multiplier applied to every gap between scheduled starts
    #[arg(long, value_name = "RATIO")]
    pub compression_ratio: Option<f64>,

    /// Dispatch operations in windows of this size instead of one by one
    #[arg(long, value_name = "MS")]
    pub window_ms: Option<i64>,

    /// Driver instance taking part in the run (repeatable)
    #[arg(long = "peer-id", value_name = "ID")]
    pub peer_ids: Vec<String>,

    /// Start operations as soon as possible, recording delays only
    #[arg(long)]
    pub ignore_scheduled_start_times: bool,

    /// Directory receiving result artifacts and logs
    #[arg(long, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Prefix of every artifact file
    #[arg(long)]
    pub name: Option<String>,

    /// Write one row per executed operation
    #[arg(long)]
    pub results_log: bool,

    /// Unit used when reporting latencies
    #[arg(long, value_name = "UNIT")]
    pub time_unit: Option<TimeUnit>,

    /// Log progress at this interval
    #[arg(long, value_name = "MS")]
    pub status_interval_ms: Option<i64>,

    /// Longest sleep while waiting for an operation's start time
    #[arg(long, value_name = "MS")]
    pub spinner_sleep_ms: Option<i64>,

    /// Time between startup and the first scheduled operation
    #[arg(long, value_name = "MS")]
    pub start_delay_ms: Option<i64>,

    /// Seed for the workload's random generators
    #[arg(long)]
    pub seed: Option<u64>,

    /// Database parameter (repeatable)
    #[arg(long = "db-param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub db_params: Vec<(String, String)>,

    /// Workload parameter (repeatable)
    #[arg(long = "workload-param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub workload_params: Vec<(String, String)>,

    /// Check the workload's streams instead of executing them
    #[arg(long, group = "mode")]
    pub validate_workload: bool,

    /// Replay a validation params file and compare results
    #[arg(long, value_name = "FILE", group = "mode")]
    pub validate_database: Option<PathBuf>,

    /// Record operations and their results into a validation params file
    #[arg(long, value_name = "FILE", group = "mode")]
    pub create_validation_params: Option<PathBuf>,

    /// Number of validation params to create
    #[arg(long, value_name = "N", requires = "create_validation_params")]
    pub validation_set_size: Option<u64>,

    /// Describe the workload without executing it
    #[arg(long, group = "mode")]
    pub calculate_statistics: bool,

    /// Also log to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn mode(&self) -> ClientMode {
        if self.validate_workload {
            ClientMode::ValidateWorkload
        } else if let Some(params_file) = &self.validate_database {
            ClientMode::ValidateDatabase {
                params_file: params_file.clone(),
            }
        } else if let Some(params_file) = &self.create_validation_params {
            ClientMode::CreateValidationParams {
                params_file: params_file.clone(),
                set_size: self.validation_set_size.unwrap_or(0),
            }
        } else if self.calculate_statistics {
            ClientMode::CalculateStatistics
        } else {
            ClientMode::Execute
        }
    }

    /// Resolves the arguments against the driver defaults.
    pub fn into_config(self) -> DriverConfig {
        let defaults = DriverConfig::default();
        let millis = |value: Option<i64>, default: Duration| {
            value.map_or(default, Duration::from_millis)
        };
        DriverConfig {
            mode: self.mode(),
            name: self.name.unwrap_or(defaults.name),
            db: self.db,
            workload: self.workload,
            db_params: self.db_params.into_iter().collect::<Params>(),
            workload_params: self.workload_params.into_iter().collect::<Params>(),
            operation_count: self.operation_count,
            duration: self.duration_ms.map(Duration::from_millis),
            thread_count: self.threads.unwrap_or(defaults.thread_count),
            tolerated_delay: millis(self.tolerated_delay_ms, defaults.tolerated_delay),
            compression_ratio: self.compression_ratio.unwrap_or(defaults.compression_ratio),
            window: self.window_ms.map(Duration::from_millis),
            peer_ids: self.peer_ids,
            ignore_scheduled_start_times: self.ignore_scheduled_start_times,
            results_dir: self.results_dir,
            results_log: self.results_log,
            time_unit: self.time_unit.unwrap_or(defaults.time_unit),
            status_interval: self.status_interval_ms.map(Duration::from_millis),
            spinner_sleep: millis(self.spinner_sleep_ms, defaults.spinner_sleep),
            start_delay: millis(self.start_delay_ms, defaults.start_delay),
            seed: self.seed.unwrap_or(defaults.seed),
            ..defaults
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let config = cli.into_config();

    // A results path that is a file is reported by the client, not the logger.
    let log_dir = config
        .results_dir
        .as_ref()
        .filter(|dir| !dir.exists() || dir.is_dir())
        .map(|dir| dir.join("logs"));
    let _guard = benchdrive_runtime::init_logging("cli", log_dir.as_deref(), verbose);

    match execute(config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if let Some(report) = e.partial_report() {
                println!("{}", benchdrive_core::export::render_results(&report.results));
            }
            tracing::error!("{e}");
            eprintln!("benchdrive: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the configured mode and prints its report. `Ok(false)` means a
/// validation mode completed and found problems.
fn execute(config: DriverConfig) -> Result<bool, DriverError> {
    let rt = tokio::runtime::Runtime::new()?;
    let client = Client::new(config, benchdrive_runtime::build_default_registry());
    let outcome = rt.block_on(client.run())?;
    println!("{}", outcome.render());
    if !outcome.is_successful() {
        eprintln!("benchdrive: validation: {} failed", client.config().mode);
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("benchdrive").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn test_defaults_resolve_to_driver_defaults() {
        let config = parse(&["--db", "memory", "--workload", "synthetic"]).into_config();
        let defaults = DriverConfig::default();
        assert_eq!(config.mode, ClientMode::Execute);
        assert_eq!(config.tolerated_delay, defaults.tolerated_delay);
        assert_eq!(config.start_delay, Duration::from_secs(10));
        assert_eq!(config.seed, 42);
        assert_eq!(config.db.as_deref(), Some("memory"));
    }

    #[test]
    fn test_flags_map_onto_config() {
        let config = parse(&[
            "--db",
            "noop",
            "--workload",
            "synthetic",
            "--threads",
            "8",
            "--tolerated-delay-ms",
            "250",
            "--compression-ratio",
            "0.5",
            "--peer-id",
            "a",
            "--peer-id",
            "b",
            "--time-unit",
            "us",
            "--db-param",
            "latency_us=10",
            "--workload-param",
            "operation_count=5",
        ])
        .into_config();
        assert_eq!(config.thread_count, 8);
        assert_eq!(config.tolerated_delay, Duration::from_millis(250));
        assert_eq!(config.compression_ratio, 0.5);
        assert_eq!(config.peer_ids, vec!["a", "b"]);
        assert_eq!(config.time_unit, TimeUnit::Micro);
        assert_eq!(config.db_params.get("latency_us"), Some("10"));
        assert_eq!(config.workload_params.get("operation_count"), Some("5"));
    }

    #[test]
    fn test_mode_selection() {
        let cli = parse(&[
            "--workload",
            "synthetic",
            "--create-validation-params",
            "out.csv",
            "--validation-set-size",
            "20",
        ]);
        assert_eq!(
            cli.mode(),
            ClientMode::CreateValidationParams {
                params_file: PathBuf::from("out.csv"),
                set_size: 20,
            }
        );
        assert_eq!(
            parse(&["--calculate-statistics"]).mode(),
            ClientMode::CalculateStatistics
        );
    }

    #[test]
    fn test_modes_are_mutually_exclusive() {
        let result = Cli::try_parse_from([
            "benchdrive",
            "--validate-workload",
            "--calculate-statistics",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_size_requires_create_mode() {
        assert!(Cli::try_parse_from(["benchdrive", "--validation-set-size", "3"]).is_err());
    }

    #[test]
    fn test_malformed_param_is_rejected() {
        assert!(Cli::try_parse_from(["benchdrive", "--db-param", "novalue"]).is_err());
    }
}
