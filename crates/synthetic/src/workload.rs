use benchdrive_api::{
    Duration, Instant, Operation, OperationIter, Workload, WorkloadError, WorkloadParams,
    WorkloadResult, WorkloadStream,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::generator::{random_printable, weighted_choice};
use crate::payload::{READ, SCAN, SyntheticPayload, UPDATE};

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub operation_count: u64,
    /// Keys are drawn uniformly from `0..record_count`.
    pub record_count: u64,
    pub interval: Duration,
    /// Extra random delay in `0..=jitter` added to every interval.
    pub jitter: Duration,
    pub read_proportion: f64,
    pub update_proportion: f64,
    pub scan_proportion: f64,
    pub value_length: usize,
    pub scan_length: u32,
    /// Reads and scans further than this from the latest update run
    /// independently.
    pub max_interleave: Duration,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            operation_count: 1_000,
            record_count: 1_000,
            interval: Duration::from_millis(1),
            jitter: Duration::ZERO,
            read_proportion: 0.5,
            update_proportion: 0.3,
            scan_proportion: 0.2,
            value_length: 32,
            scan_length: 10,
            max_interleave: Duration::from_secs(1),
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> WorkloadError {
    WorkloadError::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

impl SyntheticConfig {
    pub fn from_params(params: &WorkloadParams) -> WorkloadResult<Self> {
        let defaults = Self::default();
        let config = Self {
            operation_count: params.parse_or("operation_count", defaults.operation_count)?,
            record_count: params.parse_or("record_count", defaults.record_count)?,
            interval: Duration::from_micros(
                params.parse_or("interval_us", defaults.interval.as_nanos() / 1_000)?,
            ),
            jitter: Duration::from_micros(
                params.parse_or("jitter_us", defaults.jitter.as_nanos() / 1_000)?,
            ),
            read_proportion: params.parse_or("read_proportion", defaults.read_proportion)?,
            update_proportion: params.parse_or("update_proportion", defaults.update_proportion)?,
            scan_proportion: params.parse_or("scan_proportion", defaults.scan_proportion)?,
            value_length: params.parse_or("value_length", defaults.value_length)?,
            scan_length: params.parse_or("scan_length", defaults.scan_length)?,
            max_interleave: Duration::from_millis(params.parse_or(
                "max_interleave_ms",
                defaults.max_interleave.as_nanos() / 1_000_000,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WorkloadResult<()> {
        if self.record_count == 0 {
            return Err(invalid("record_count", "must be at least 1"));
        }
        if self.interval.as_nanos() <= 0 {
            return Err(invalid("interval_us", "must be positive"));
        }
        if self.jitter.is_negative() {
            return Err(invalid("jitter_us", "must not be negative"));
        }
        if self.max_interleave.as_nanos() <= 0 {
            return Err(invalid("max_interleave_ms", "must be positive"));
        }
        if self.scan_length == 0 {
            return Err(invalid("scan_length", "must be at least 1"));
        }
        let proportions = [
            ("read_proportion", self.read_proportion),
            ("update_proportion", self.update_proportion),
            ("scan_proportion", self.scan_proportion),
        ];
        for (name, value) in proportions {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(name, format!("{value} is not a proportion")));
            }
        }
        if proportions.iter().map(|(_, v)| v).sum::<f64>() <= 0.0 {
            return Err(invalid("read_proportion", "all proportions are zero"));
        }
        Ok(())
    }
}

/// Key/value workload mixing reads, updates and scans at a steady rate.
///
/// Updates form the dependency stream. Every read and scan is gated on the
/// latest update scheduled before it, so it only starts once that update
/// has completed everywhere.
#[derive(Debug, Default)]
pub struct SyntheticWorkload {
    config: SyntheticConfig,
}

impl SyntheticWorkload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SyntheticConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// One kind's share of the seeded sequence. Every call replays the
    /// sequence from the seed, so the three streams agree on gating.
    fn operations_of(&self, seed: u64, kind: usize) -> OperationIter<SyntheticPayload> {
        Box::new(
            SyntheticOperations::new(self.config.clone(), seed).filter_map(move |item| match item {
                Ok((k, operation)) if k == kind => Some(Ok(operation)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }),
        )
    }
}

const READ_KIND: usize = 0;
const UPDATE_KIND: usize = 1;
const SCAN_KIND: usize = 2;

/// The full seeded operation sequence, tagged with each operation's kind.
/// Stops after the first error.
struct SyntheticOperations {
    config: SyntheticConfig,
    rng: StdRng,
    weights: [f64; 3],
    at: Instant,
    last_update: Option<Instant>,
    remaining: u64,
}

impl SyntheticOperations {
    fn new(config: SyntheticConfig, seed: u64) -> Self {
        Self {
            weights: [
                config.read_proportion,
                config.update_proportion,
                config.scan_proportion,
            ],
            rng: StdRng::seed_from_u64(seed),
            at: Instant::EPOCH,
            last_update: None,
            remaining: config.operation_count,
            config,
        }
    }
}

impl Iterator for SyntheticOperations {
    type Item = WorkloadResult<(usize, Operation<SyntheticPayload>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let config = &self.config;

        let jitter = if config.jitter.as_nanos() > 0 {
            Duration::from_nanos(self.rng.gen_range(0..=config.jitter.as_nanos()))
        } else {
            Duration::ZERO
        };
        let Some(at) = self
            .at
            .checked_add(config.interval)
            .and_then(|t| t.checked_add(jitter))
        else {
            self.remaining = 0;
            return Some(Err(WorkloadError::Stream(
                "scheduled start overflows".to_string(),
            )));
        };
        self.at = at;

        let key = self.rng.gen_range(0..config.record_count);
        let kind = weighted_choice(&mut self.rng, &self.weights);
        let payload = match kind {
            READ_KIND => SyntheticPayload::Read { key },
            UPDATE_KIND => SyntheticPayload::Update {
                key,
                value: random_printable(&mut self.rng, config.value_length),
            },
            _ => SyntheticPayload::Scan {
                start_key: key,
                limit: config.scan_length,
            },
        };
        let mut operation = Operation::new(payload.operation_type(), at, payload);
        if kind == UPDATE_KIND {
            self.last_update = Some(at);
        } else if let Some(update) = self.last_update
            && at
                .checked_duration_since(update)
                .is_some_and(|lag| lag <= config.max_interleave)
        {
            operation = operation.gated_on(update);
        }
        Some(Ok((kind, operation)))
    }
}

impl Workload<SyntheticPayload> for SyntheticWorkload {
    fn init(&mut self, params: &WorkloadParams) -> WorkloadResult<()> {
        self.config = SyntheticConfig::from_params(params)?;
        debug!("synthetic workload configured: {:?}", self.config);
        Ok(())
    }

    fn streams(&mut self, seed: u64) -> WorkloadResult<Vec<WorkloadStream<SyntheticPayload>>> {
        debug!(
            "building synthetic streams of {} operations from seed {seed}",
            self.config.operation_count
        );
        Ok(vec![
            WorkloadStream::new(
                READ,
                Box::new(std::iter::empty()),
                self.operations_of(seed, READ_KIND),
            ),
            WorkloadStream::new(
                UPDATE,
                self.operations_of(seed, UPDATE_KIND),
                Box::new(std::iter::empty()),
            ),
            WorkloadStream::new(
                SCAN,
                Box::new(std::iter::empty()),
                self.operations_of(seed, SCAN_KIND),
            ),
        ])
    }

    fn max_expected_interleave(&self) -> Duration {
        self.config.max_interleave
    }

    fn cleanup(&mut self) -> WorkloadResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_override_defaults() {
        let params = WorkloadParams::new()
            .with("operation_count", "5")
            .with("interval_us", "250");
        let config = SyntheticConfig::from_params(&params).expect("valid params");
        assert_eq!(config.operation_count, 5);
        assert_eq!(config.interval, Duration::from_micros(250));
        assert_eq!(config.scan_length, 10);
    }

    #[test]
    fn test_rejects_all_zero_proportions() {
        let params = WorkloadParams::new()
            .with("read_proportion", "0")
            .with("update_proportion", "0")
            .with("scan_proportion", "0");
        assert!(matches!(
            SyntheticConfig::from_params(&params),
            Err(WorkloadError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_streams_are_generated_on_demand() {
        let mut workload = SyntheticWorkload::with_config(SyntheticConfig {
            operation_count: u64::MAX,
            ..SyntheticConfig::default()
        });
        let mut streams = workload.streams(42).expect("streams");
        let updates: Vec<_> = streams[1]
            .dependencies
            .by_ref()
            .take(5)
            .collect::<WorkloadResult<_>>()
            .expect("updates");
        assert_eq!(updates.len(), 5);
        assert!(updates.windows(2).all(|w| w[0].scheduled_start < w[1].scheduled_start));
    }

    #[test]
    fn test_start_overflow_ends_sequence_with_error() {
        let config = SyntheticConfig {
            operation_count: 3,
            interval: Duration::from_nanos(i64::MAX),
            ..SyntheticConfig::default()
        };
        let items: Vec<_> = SyntheticOperations::new(config, 1).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(WorkloadError::Stream(_))));
    }
}
