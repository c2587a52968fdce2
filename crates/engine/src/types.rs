use benchdrive_api::{Duration, Instant, OperationType, TimeUnit};
use serde::{Deserialize, Serialize};

/// Outcome of one executed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub operation_type: OperationType,
    pub scheduled_start: Instant,
    pub actual_start: Instant,
    pub execution_duration: Duration,
    pub success: bool,
}

impl MetricsRecord {
    /// How late the operation started. Negative when it started early.
    pub fn start_delay(&self) -> Duration {
        self.actual_start
            .checked_duration_since(self.scheduled_start)
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunnerState {
    Idle,
    Initializing,
    Running,
    Draining,
    Terminated,
}

/// What to do when an operation starts later than tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionDelayPolicy {
    /// Report the breach and stop the run.
    #[default]
    Terminate,
    /// Count the breach and keep going.
    Record,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub thread_count: usize,
    pub max_in_flight: usize,
    pub tolerated_delay: Duration,
    pub ignore_scheduled_start_times: bool,
    pub delay_policy: ExecutionDelayPolicy,
    pub spinner_sleep: Duration,
    pub window: Option<Duration>,
    pub initialization_timeout: Duration,
    pub gct_wait_timeout: Duration,
    pub drain_grace: Duration,
    pub status_interval: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            thread_count: 1,
            max_in_flight: 100,
            tolerated_delay: Duration::from_millis(100),
            ignore_scheduled_start_times: false,
            delay_policy: ExecutionDelayPolicy::Terminate,
            spinner_sleep: Duration::from_millis(1),
            window: None,
            initialization_timeout: Duration::from_secs(5),
            gct_wait_timeout: Duration::from_secs(30),
            drain_grace: Duration::from_minutes(30),
            status_interval: None,
        }
    }
}

impl RunnerConfig {
    /// Policy in effect: delays are only recorded when scheduled start
    /// times are ignored.
    pub fn effective_delay_policy(&self) -> ExecutionDelayPolicy {
        if self.ignore_scheduled_start_times {
            ExecutionDelayPolicy::Record
        } else {
            self.delay_policy
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub queue_capacity: usize,
    pub time_unit: TimeUnit,
    /// Whether start delays are aggregated.
    pub record_start_delay: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            time_unit: TimeUnit::Milli,
            record_start_delay: true,
        }
    }
}

/// An operation abandoned when the drain grace period ran out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbandonedOperation {
    pub operation_type: OperationType,
    pub scheduled_start: Instant,
}

/// Counters describing how a run went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub delay_breaches: u64,
    pub start: Option<Instant>,
    pub finish: Option<Instant>,
    pub abandoned: Vec<AbandonedOperation>,
}
