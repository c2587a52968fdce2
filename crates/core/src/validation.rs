//! Offline checks of workloads and databases: nothing here runs in real
//! time.

use benchdrive_api::{Db, Duration, Instant, Operation, OperationResult, OperationType, Workload};
use benchdrive_engine::{WorkloadLimits, limit_stream, merge_streams};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::export::{ValidationParam, ValidationParamsWriter};

const MAX_REPORTED_PROBLEMS: usize = 50;
/// Operations compared when no operation count is configured.
pub const DEFAULT_VALIDATION_LIMIT: u64 = 100_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadValidationResult {
    pub operations_checked: u64,
    pub problems: Vec<String>,
}

impl WorkloadValidationResult {
    pub fn is_successful(&self) -> bool {
        self.problems.is_empty()
    }

    fn problem(&mut self, problem: String) {
        if self.problems.len() < MAX_REPORTED_PROBLEMS {
            self.problems.push(problem);
        } else if self.problems.len() == MAX_REPORTED_PROBLEMS {
            self.problems.push("further problems omitted".to_string());
        }
    }
}

/// Builds the workload's streams twice with the same seed and checks that
/// they are identical, time ordered, respect the dependency invariant and
/// the workload's maximum interleave, and that every payload survives a
/// JSON round trip.
pub fn validate_workload<P>(
    workload: &mut dyn Workload<P>,
    seed: u64,
    limits: WorkloadLimits,
) -> Result<WorkloadValidationResult>
where
    P: Serialize + DeserializeOwned + Send + 'static,
{
    let limits = WorkloadLimits {
        operation_count: Some(limits.operation_count.unwrap_or(DEFAULT_VALIDATION_LIMIT)),
        ..limits
    };
    let interleave = workload.max_expected_interleave();
    let mut result = WorkloadValidationResult::default();

    let first = match collect_fingerprints(workload, seed, limits, interleave, &mut result) {
        Some(first) => first,
        None => return Ok(result),
    };
    result.operations_checked = first.len() as u64;

    let mut scratch = WorkloadValidationResult::default();
    let Some(second) = collect_fingerprints(workload, seed, limits, interleave, &mut scratch) else {
        result.problem("second construction of the streams failed".to_string());
        result.problems.extend(scratch.problems);
        return Ok(result);
    };

    if let Some(index) = first.iter().zip(&second).position(|(a, b)| a != b) {
        result.problem(format!(
            "operation #{index} differs between two constructions with seed {seed}"
        ));
    } else if first.len() != second.len() {
        result.problem(format!(
            "two constructions with seed {seed} yielded {} and {} operations",
            first.len(),
            second.len()
        ));
    }

    if result.is_successful() {
        info!(
            "workload validation passed ({} operations)",
            result.operations_checked
        );
    } else {
        warn!(
            "workload validation found {} problem(s)",
            result.problems.len()
        );
    }
    Ok(result)
}

/// JSON form of every operation in one construction of the streams, or
/// `None` when the streams could not be built at all.
fn collect_fingerprints<P>(
    workload: &mut dyn Workload<P>,
    seed: u64,
    limits: WorkloadLimits,
    interleave: Duration,
    result: &mut WorkloadValidationResult,
) -> Option<Vec<serde_json::Value>>
where
    P: Serialize + DeserializeOwned + Send + 'static,
{
    let streams = match workload.streams(seed) {
        Ok(streams) => streams,
        Err(e) => {
            result.problem(format!("building streams failed: {e}"));
            return None;
        }
    };

    let mut fingerprints = Vec::new();
    for item in limit_stream(merge_streams(streams), limits) {
        let scheduled = match item {
            Ok(scheduled) => scheduled,
            Err(e) => {
                result.problem(e.to_string());
                break;
            }
        };
        let operation = &scheduled.operation;
        let index = fingerprints.len();

        if operation.is_gated() {
            let lag = operation
                .scheduled_start
                .checked_duration_since(operation.dependency_time);
            if lag.is_none_or(|lag| lag > interleave) {
                result.problem(format!(
                    "operation #{index} ({}) depends on {} but starts at {}, beyond the maximum interleave of {interleave}",
                    operation.operation_type, operation.dependency_time, operation.scheduled_start
                ));
            }
        }

        match round_trip(operation) {
            Ok(value) => fingerprints.push(value),
            Err(reason) => {
                result.problem(format!(
                    "operation #{index} ({}) does not survive serialization: {reason}",
                    operation.operation_type
                ));
                fingerprints.push(serde_json::Value::Null);
            }
        }
    }
    debug!("collected {} operations", fingerprints.len());
    Some(fingerprints)
}

fn round_trip<P>(operation: &Operation<P>) -> std::result::Result<serde_json::Value, String>
where
    P: Serialize + DeserializeOwned,
{
    let value = serde_json::to_value(operation).map_err(|e| e.to_string())?;
    let decoded: Operation<P> = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    let reencoded = serde_json::to_value(&decoded).map_err(|e| e.to_string())?;
    if reencoded != value {
        return Err(format!("{value} decoded as {reencoded}"));
    }
    Ok(value)
}

/// Executes the workload's operations one at a time, in stream order, and
/// records each one the workload's validation filter keeps together with
/// the database's result. Stops after `set_size` rows.
pub fn create_validation_params<P>(
    db: &dyn Db<P>,
    workload: &mut dyn Workload<P>,
    seed: u64,
    set_size: u64,
    writer: &mut ValidationParamsWriter<P>,
) -> Result<u64>
where
    P: Serialize + Send + 'static,
{
    let streams = workload.streams(seed)?;
    for item in merge_streams(streams) {
        if writer.written() >= set_size {
            break;
        }
        let scheduled = item?;
        if !workload.validation_filter(&scheduled.operation) {
            continue;
        }
        let result = db.execute(&scheduled.operation)?;
        writer.write(&scheduled.operation, &result)?;
    }
    if writer.written() < set_size {
        warn!(
            "workload ran out after {} validation params ({set_size} requested)",
            writer.written()
        );
    }
    Ok(writer.written())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    pub operation_type: OperationType,
    pub scheduled_start: Instant,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DbValidationResult {
    pub passed: u64,
    pub failures: Vec<ValidationFailure>,
}

impl DbValidationResult {
    pub fn total(&self) -> u64 {
        self.passed + self.failures.len() as u64
    }

    pub fn is_successful(&self) -> bool {
        self.failures.is_empty()
    }
}

fn describe(result: &OperationResult) -> String {
    result.value().to_string()
}

/// Replays every validation parameter against `db` and compares the
/// results with the recorded ones.
pub fn validate_database<P>(db: &dyn Db<P>, params: &[ValidationParam<P>]) -> DbValidationResult {
    let mut result = DbValidationResult::default();
    for param in params {
        let actual = match db.execute(&param.operation) {
            Ok(actual) if actual == param.expected => {
                result.passed += 1;
                continue;
            }
            Ok(actual) => describe(&actual),
            Err(e) => format!("error: {e}"),
        };
        debug!(
            "validation mismatch for {} at {}",
            param.operation.operation_type, param.operation.scheduled_start
        );
        result.failures.push(ValidationFailure {
            operation_type: param.operation.operation_type.clone(),
            scheduled_start: param.operation.scheduled_start,
            expected: describe(&param.expected),
            actual,
        });
    }
    info!(
        "database validation: {} of {} passed",
        result.passed,
        result.total()
    );
    result
}
