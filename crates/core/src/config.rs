use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use benchdrive_api::{DbParams, Duration, TimeUnit, WorkloadParams};
use benchdrive_engine::{ExecutionDelayPolicy, MetricsConfig, RunnerConfig, WorkloadLimits};

use crate::error::{DriverError, Result};

/// What the driver does with the configured workload and database.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClientMode {
    #[default]
    Execute,
    ValidateWorkload,
    ValidateDatabase {
        params_file: PathBuf,
    },
    CreateValidationParams {
        params_file: PathBuf,
        set_size: u64,
    },
    CalculateStatistics,
}

impl ClientMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientMode::Execute => "execute",
            ClientMode::ValidateWorkload => "validate_workload",
            ClientMode::ValidateDatabase { .. } => "validate_database",
            ClientMode::CreateValidationParams { .. } => "create_validation_params",
            ClientMode::CalculateStatistics => "calculate_statistics",
        }
    }

    fn needs_db(&self) -> bool {
        matches!(
            self,
            ClientMode::Execute
                | ClientMode::ValidateDatabase { .. }
                | ClientMode::CreateValidationParams { .. }
        )
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved driver options.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub mode: ClientMode,
    /// Prefix of every artifact written to the results directory.
    pub name: String,
    pub db: Option<String>,
    pub workload: Option<String>,
    pub db_params: DbParams,
    pub workload_params: WorkloadParams,
    pub operation_count: Option<u64>,
    pub duration: Option<Duration>,
    pub thread_count: usize,
    pub max_in_flight: usize,
    pub tolerated_delay: Duration,
    pub compression_ratio: f64,
    pub window: Option<Duration>,
    pub peer_ids: Vec<String>,
    pub ignore_scheduled_start_times: bool,
    pub results_dir: Option<PathBuf>,
    pub results_log: bool,
    pub time_unit: TimeUnit,
    pub status_interval: Option<Duration>,
    pub spinner_sleep: Duration,
    pub start_delay: Duration,
    pub seed: u64,
    pub metrics_queue_capacity: usize,
    pub initialization_timeout: Duration,
    pub gct_wait_timeout: Duration,
    pub drain_grace: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let runner = RunnerConfig::default();
        let metrics = MetricsConfig::default();
        Self {
            mode: ClientMode::Execute,
            name: "benchdrive".to_string(),
            db: None,
            workload: None,
            db_params: DbParams::new(),
            workload_params: WorkloadParams::new(),
            operation_count: None,
            duration: None,
            thread_count: runner.thread_count,
            max_in_flight: runner.max_in_flight,
            tolerated_delay: runner.tolerated_delay,
            compression_ratio: 1.0,
            window: runner.window,
            peer_ids: Vec::new(),
            ignore_scheduled_start_times: runner.ignore_scheduled_start_times,
            results_dir: None,
            results_log: false,
            time_unit: metrics.time_unit,
            status_interval: runner.status_interval,
            spinner_sleep: runner.spinner_sleep,
            start_delay: Duration::from_secs(10),
            seed: 42,
            metrics_queue_capacity: metrics.queue_capacity,
            initialization_timeout: runner.initialization_timeout,
            gct_wait_timeout: runner.gct_wait_timeout,
            drain_grace: runner.drain_grace,
        }
    }
}

impl DriverConfig {
    /// Checks that everything the selected mode needs is present and sane.
    /// All problems are reported at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name must not be empty".to_string());
        }
        if self.workload.is_none() {
            problems.push(format!("--workload is required to {}", self.mode));
        }
        if self.mode.needs_db() && self.db.is_none() {
            problems.push(format!("--db is required to {}", self.mode));
        }

        match &self.mode {
            ClientMode::Execute => {
                if self.thread_count == 0 {
                    problems.push("thread count must be at least 1".to_string());
                }
                if self.max_in_flight == 0 {
                    problems.push("max in-flight operations must be at least 1".to_string());
                }
                if !self.compression_ratio.is_finite() || self.compression_ratio <= 0.0 {
                    problems.push(format!(
                        "compression ratio must be positive, got {}",
                        self.compression_ratio
                    ));
                }
                if self.tolerated_delay.is_negative() {
                    problems.push("tolerated delay must not be negative".to_string());
                }
                if self.spinner_sleep.is_negative() {
                    problems.push("spinner sleep must not be negative".to_string());
                }
                if self.start_delay.is_negative() {
                    problems.push("start delay must not be negative".to_string());
                }
                if let Some(window) = self.window
                    && window.as_nanos() <= 0
                {
                    problems.push("window must be positive".to_string());
                }
                if let Some(interval) = self.status_interval
                    && interval.as_nanos() <= 0
                {
                    problems.push("status interval must be positive".to_string());
                }
                if self.metrics_queue_capacity == 0 {
                    problems.push("metrics queue capacity must be at least 1".to_string());
                }
                if self.results_log && self.results_dir.is_none() {
                    problems.push("--results-log requires --results-dir".to_string());
                }
            }
            ClientMode::ValidateDatabase { params_file } => {
                if !params_file.is_file() {
                    problems.push(format!(
                        "validation params file {} does not exist",
                        params_file.display()
                    ));
                }
            }
            ClientMode::CreateValidationParams { set_size, .. } => {
                if *set_size == 0 {
                    problems.push("--validation-set-size must be at least 1".to_string());
                }
            }
            ClientMode::ValidateWorkload | ClientMode::CalculateStatistics => {}
        }

        if let Some(count) = self.operation_count
            && count == 0
        {
            problems.push("operation count must be at least 1".to_string());
        }
        if let Some(duration) = self.duration
            && duration.as_nanos() <= 0
        {
            problems.push("duration must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DriverError::Config(problems.join("; ")))
        }
    }

    pub fn limits(&self) -> WorkloadLimits {
        WorkloadLimits {
            operation_count: self.operation_count,
            duration: self.duration,
        }
    }

    pub fn artifact_path(&self, dir: &Path, suffix: &str) -> PathBuf {
        dir.join(format!("{}-{suffix}", self.name))
    }

    /// Every resolved option as `key -> value`, ready to be written as a
    /// properties file.
    pub fn to_properties(&self) -> BTreeMap<String, String> {
        fn opt<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        fn nanos(value: Option<Duration>) -> String {
            value.map(|d| d.as_nanos().to_string()).unwrap_or_default()
        }

        let mut props = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            props.insert(key.to_string(), value);
        };
        put("mode", self.mode.to_string());
        put("name", self.name.clone());
        put("db", opt(&self.db));
        put("workload", opt(&self.workload));
        put("operation_count", opt(&self.operation_count));
        put("duration_ns", nanos(self.duration));
        put("thread_count", self.thread_count.to_string());
        put("max_in_flight", self.max_in_flight.to_string());
        put("tolerated_delay_ns", self.tolerated_delay.as_nanos().to_string());
        put("compression_ratio", self.compression_ratio.to_string());
        put("window_ns", nanos(self.window));
        put("peer_ids", self.peer_ids.join(","));
        put(
            "ignore_scheduled_start_times",
            self.ignore_scheduled_start_times.to_string(),
        );
        put(
            "results_dir",
            self.results_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        put("results_log", self.results_log.to_string());
        put("time_unit", self.time_unit.to_string());
        put("status_interval_ns", nanos(self.status_interval));
        put("spinner_sleep_ns", self.spinner_sleep.as_nanos().to_string());
        put("start_delay_ns", self.start_delay.as_nanos().to_string());
        put("seed", self.seed.to_string());
        put(
            "metrics_queue_capacity",
            self.metrics_queue_capacity.to_string(),
        );
        put(
            "initialization_timeout_ns",
            self.initialization_timeout.as_nanos().to_string(),
        );
        put(
            "gct_wait_timeout_ns",
            self.gct_wait_timeout.as_nanos().to_string(),
        );
        put("drain_grace_ns", self.drain_grace.as_nanos().to_string());
        match &self.mode {
            ClientMode::ValidateDatabase { params_file } => {
                put("validation_params_file", params_file.display().to_string());
            }
            ClientMode::CreateValidationParams {
                params_file,
                set_size,
            } => {
                put("validation_params_file", params_file.display().to_string());
                put("validation_set_size", set_size.to_string());
            }
            _ => {}
        }
        for (key, value) in self.db_params.iter() {
            put(&format!("db.{key}"), value.to_string());
        }
        for (key, value) in self.workload_params.iter() {
            put(&format!("workload.{key}"), value.to_string());
        }
        props
    }
}

impl From<&DriverConfig> for RunnerConfig {
    fn from(config: &DriverConfig) -> Self {
        Self {
            thread_count: config.thread_count,
            max_in_flight: config.max_in_flight,
            tolerated_delay: config.tolerated_delay,
            ignore_scheduled_start_times: config.ignore_scheduled_start_times,
            delay_policy: ExecutionDelayPolicy::Terminate,
            spinner_sleep: config.spinner_sleep,
            window: config.window,
            initialization_timeout: config.initialization_timeout,
            gct_wait_timeout: config.gct_wait_timeout,
            drain_grace: config.drain_grace,
            status_interval: config.status_interval,
        }
    }
}

impl From<&DriverConfig> for MetricsConfig {
    fn from(config: &DriverConfig) -> Self {
        Self {
            queue_capacity: config.metrics_queue_capacity,
            time_unit: config.time_unit,
            record_start_delay: !config.ignore_scheduled_start_times,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execute_config() -> DriverConfig {
        DriverConfig {
            db: Some("memory".to_string()),
            workload: Some("synthetic".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_execute_config_is_valid() {
        execute_config().validate().expect("valid config");
    }

    #[test]
    fn test_validate_lists_every_problem() {
        let config = DriverConfig {
            thread_count: 0,
            compression_ratio: -1.0,
            results_log: true,
            ..Default::default()
        };
        let message = match config.validate() {
            Err(DriverError::Config(message)) => message,
            other => panic!("expected config error, got {other:?}"),
        };
        for needle in [
            "--workload",
            "--db",
            "thread count",
            "compression ratio",
            "--results-dir",
        ] {
            assert!(message.contains(needle), "{needle} missing from {message}");
        }
    }

    #[test]
    fn test_statistics_mode_does_not_need_db() {
        let config = DriverConfig {
            mode: ClientMode::CalculateStatistics,
            workload: Some("synthetic".to_string()),
            ..Default::default()
        };
        config.validate().expect("db is optional");
    }

    #[test]
    fn test_properties_are_sorted_and_complete() {
        let mut config = execute_config();
        config.db_params.insert("latency_ms", "2");
        let props = config.to_properties();
        let keys: Vec<&String> = props.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(props["db"], "memory");
        assert_eq!(props["db.latency_ms"], "2");
        assert_eq!(props["tolerated_delay_ns"], "100000000");
        assert_eq!(props["operation_count"], "");
    }

    #[test]
    fn test_metrics_config_skips_delays_when_ignoring_start_times() {
        let config = DriverConfig {
            ignore_scheduled_start_times: true,
            ..execute_config()
        };
        assert!(!MetricsConfig::from(&config).record_start_delay);
        assert_eq!(RunnerConfig::from(&config).thread_count, 1);
    }
}
