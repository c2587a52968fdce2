//! Artifacts written at the end of a client mode: the results log, the
//! results JSON document, the configuration dump, validation parameter
//! files, and console tables.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use benchdrive_api::{Operation, OperationResult, TimeUnit};
use benchdrive_engine::{
    MetricsRecord, OperationMetricsSnapshot, ResultsSink, RunSummary, SinkError,
    WorkloadResultsSnapshot,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled, settings::Style};

use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::statistics::WorkloadStatistics;
use crate::validation::{DbValidationResult, WorkloadValidationResult};

pub const RESULTS_LOG_SUFFIX: &str = "results_log.csv";
pub const RESULTS_JSON_SUFFIX: &str = "results.json";
pub const CONFIGURATION_SUFFIX: &str = "configuration.properties";

const DELIMITER: u8 = b'|';
const RESULTS_LOG_HEADER: [&str; 4] = [
    "operation_type",
    "scheduled_start_time",
    "actual_start_time",
    "execution_duration",
];

/// One `|`-separated row per executed operation, times in nanoseconds.
pub struct ResultsLogWriter {
    writer: csv::Writer<File>,
}

impl ResultsLogWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .from_path(path)?;
        writer.write_record(RESULTS_LOG_HEADER)?;
        Ok(Self { writer })
    }
}

impl ResultsSink for ResultsLogWriter {
    fn write(&mut self, record: &MetricsRecord) -> std::result::Result<(), SinkError> {
        let scheduled = record.scheduled_start.as_nanos().to_string();
        let actual = record.actual_start.as_nanos().to_string();
        let duration = record.execution_duration.as_nanos().to_string();
        self.writer.write_record([
            record.operation_type.as_str(),
            scheduled.as_str(),
            actual.as_str(),
            duration.as_str(),
        ])?;
        Ok(())
    }

    fn flush(&mut self) -> std::result::Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ResultsDocument<'a> {
    name: &'a str,
    unit: TimeUnit,
    start_time: Option<i64>,
    finish_time: Option<i64>,
    total_run_duration_ns: i64,
    total_count: u64,
    total_failures: u64,
    throughput_per_second: f64,
    summary: &'a RunSummary,
    operations: BTreeMap<&'a str, &'a OperationMetricsSnapshot>,
}

pub fn write_results_json(
    path: &Path,
    name: &str,
    snapshot: &WorkloadResultsSnapshot,
    summary: &RunSummary,
) -> Result<()> {
    let document = ResultsDocument {
        name,
        unit: snapshot.unit,
        start_time: snapshot.start.map(|t| t.as_nanos()),
        finish_time: snapshot.finish.map(|t| t.as_nanos()),
        total_run_duration_ns: snapshot.total_run_duration.as_nanos(),
        total_count: snapshot.total_count,
        total_failures: snapshot.total_failures,
        throughput_per_second: snapshot.throughput(),
        summary,
        operations: snapshot
            .operations
            .iter()
            .map(|op| (op.operation_type.as_str(), op))
            .collect(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Writes `key=value` lines sorted by key.
pub fn write_configuration(path: &Path, config: &DriverConfig) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (key, value) in config.to_properties() {
        writeln!(writer, "{key}={}", escape_property(&value))?;
    }
    writer.flush()?;
    Ok(())
}

fn escape_property(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// An operation and the result a reference database produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationParam<P> {
    pub operation: Operation<P>,
    pub expected: OperationResult,
}

/// Rows of `operation_json|result_json`.
pub struct ValidationParamsWriter<P> {
    writer: csv::Writer<File>,
    written: u64,
    _marker: PhantomData<fn(&P)>,
}

impl<P: Serialize> ValidationParamsWriter<P> {
    pub fn create(path: &Path) -> Result<Self> {
        let writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .from_path(path)?;
        Ok(Self {
            writer,
            written: 0,
            _marker: PhantomData,
        })
    }

    pub fn write(&mut self, operation: &Operation<P>, result: &OperationResult) -> Result<()> {
        let operation = serde_json::to_string(operation)?;
        let result = serde_json::to_string(result)?;
        self.writer.write_record([operation, result])?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

pub fn read_validation_params<P: DeserializeOwned>(path: &Path) -> Result<Vec<ValidationParam<P>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .from_path(path)?;
    let mut params = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let (Some(operation), Some(expected), None) = (row.get(0), row.get(1), row.get(2)) else {
            return Err(DriverError::Validation(format!(
                "{} line {}: expected 2 columns, found {}",
                path.display(),
                line + 1,
                row.len()
            )));
        };
        params.push(ValidationParam {
            operation: serde_json::from_str(operation)?,
            expected: serde_json::from_str(expected)?,
        });
    }
    Ok(params)
}

#[derive(Tabled)]
struct MetricsRow {
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "Failed")]
    failures: u64,
    #[tabled(rename = "Min")]
    min: u64,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "P50")]
    p50: u64,
    #[tabled(rename = "P90")]
    p90: u64,
    #[tabled(rename = "P95")]
    p95: u64,
    #[tabled(rename = "P99")]
    p99: u64,
    #[tabled(rename = "Max")]
    max: u64,
}

pub fn render_results(snapshot: &WorkloadResultsSnapshot) -> String {
    let rows: Vec<MetricsRow> = snapshot
        .operations
        .iter()
        .map(|op| MetricsRow {
            operation: op.operation_type.to_string(),
            count: op.count,
            failures: op.failures,
            min: op.min_latency,
            mean: format!("{:.2}", op.mean_latency),
            p50: op.p50_latency,
            p90: op.p90_latency,
            p95: op.p95_latency,
            p99: op.p99_latency,
            max: op.max_latency,
        })
        .collect();
    format!(
        "{}\ntotal: {} operations, {} failed, {} elapsed, {:.2} ops/s (latencies in {})",
        Table::new(rows).with(Style::psql()),
        snapshot.total_count,
        snapshot.total_failures,
        snapshot.total_run_duration,
        snapshot.throughput(),
        snapshot.unit
    )
}

#[derive(Tabled)]
struct StatisticsRow {
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "First start")]
    first_start: String,
    #[tabled(rename = "Last start")]
    last_start: String,
    #[tabled(rename = "Min gap")]
    min_gap: String,
    #[tabled(rename = "Mean gap")]
    mean_gap: String,
    #[tabled(rename = "Max gap")]
    max_gap: String,
}

pub fn render_statistics(statistics: &WorkloadStatistics) -> String {
    let dash = || "-".to_string();
    let rows: Vec<StatisticsRow> = statistics
        .operations
        .iter()
        .map(|op| StatisticsRow {
            operation: op.operation_type.to_string(),
            count: op.count,
            first_start: op.first_start.to_string(),
            last_start: op.last_start.to_string(),
            min_gap: op.min_gap.map_or_else(dash, |d| d.to_string()),
            mean_gap: op.mean_gap.map_or_else(dash, |d| d.to_string()),
            max_gap: op.max_gap.map_or_else(dash, |d| d.to_string()),
        })
        .collect();
    format!(
        "{}\ntotal: {} operations over {}, {} dependencies, {} gated",
        Table::new(rows).with(Style::psql()),
        statistics.total_count,
        statistics.duration,
        statistics.dependency_count,
        statistics.gated_count
    )
}

pub fn render_workload_validation(result: &WorkloadValidationResult) -> String {
    if result.is_successful() {
        format!(
            "workload validation passed ({} operations checked)",
            result.operations_checked
        )
    } else {
        let mut out = format!(
            "workload validation failed ({} operations checked):",
            result.operations_checked
        );
        for problem in &result.problems {
            out.push_str("\n  - ");
            out.push_str(problem);
        }
        out
    }
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Scheduled")]
    scheduled_start: String,
    #[tabled(rename = "Expected")]
    expected: String,
    #[tabled(rename = "Actual")]
    actual: String,
}

pub fn render_db_validation(result: &DbValidationResult) -> String {
    let header = format!(
        "database validation: {} of {} passed",
        result.passed,
        result.total()
    );
    if result.failures.is_empty() {
        return header;
    }
    let rows: Vec<FailureRow> = result
        .failures
        .iter()
        .map(|f| FailureRow {
            operation: f.operation_type.to_string(),
            scheduled_start: f.scheduled_start.to_string(),
            expected: f.expected.clone(),
            actual: f.actual.clone(),
        })
        .collect();
    format!("{header}\n{}", Table::new(rows).with(Style::psql()))
}
