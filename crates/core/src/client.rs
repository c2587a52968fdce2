//! The run controller: turns a validated [`DriverConfig`] into one client
//! mode run, owning every service it starts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use benchdrive_api::{Duration, Workload};
use benchdrive_engine::{
    CompletionTimeService, DynDb, DynTimeSource, ErrorReporter, MetricsConfig, MetricsService,
    ResultsSink, RunSummary, RunnerComponents, RunnerConfig, SystemTimeSource, WorkloadLimits,
    WorkloadResultsSnapshot, WorkloadRunner, limit_stream, merge_streams, time_map,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::config::{ClientMode, DriverConfig};
use crate::error::{DriverError, Result};
use crate::export::{
    self, CONFIGURATION_SUFFIX, RESULTS_JSON_SUFFIX, RESULTS_LOG_SUFFIX, ResultsLogWriter,
    ValidationParamsWriter,
};
use crate::registry::Registry;
use crate::statistics::{WorkloadStatistics, calculate_statistics};
use crate::validation::{
    DbValidationResult, WorkloadValidationResult, create_validation_params, validate_database,
    validate_workload,
};

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub summary: RunSummary,
    pub results: WorkloadResultsSnapshot,
    /// Files written to the results directory.
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ClientOutcome {
    Executed(ExecutionReport),
    WorkloadValidated(WorkloadValidationResult),
    DatabaseValidated(DbValidationResult),
    ValidationParamsCreated { path: PathBuf, written: u64 },
    StatisticsCalculated(WorkloadStatistics),
}

impl ClientOutcome {
    /// Validation modes complete normally even when they find problems;
    /// this tells whether they did.
    pub fn is_successful(&self) -> bool {
        match self {
            ClientOutcome::WorkloadValidated(result) => result.is_successful(),
            ClientOutcome::DatabaseValidated(result) => result.is_successful(),
            _ => true,
        }
    }

    /// Human readable report for the console.
    pub fn render(&self) -> String {
        match self {
            ClientOutcome::Executed(report) => export::render_results(&report.results),
            ClientOutcome::WorkloadValidated(result) => export::render_workload_validation(result),
            ClientOutcome::DatabaseValidated(result) => export::render_db_validation(result),
            ClientOutcome::ValidationParamsCreated { path, written } => {
                format!("wrote {written} validation params to {}", path.display())
            }
            ClientOutcome::StatisticsCalculated(stats) => export::render_statistics(stats),
        }
    }
}

/// Creates the results directory, refusing a path that exists as a file.
pub fn prepare_results_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(DriverError::Config(format!(
            "results directory {} exists and is not a directory",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Everything an execution started, so it can be stopped in reverse order
/// whatever happened in between.
struct Started<P> {
    db: Option<DynDb<P>>,
    workload: Option<Box<dyn Workload<P>>>,
    completion: Option<Arc<CompletionTimeService>>,
    metrics: Option<Arc<MetricsService>>,
}

impl<P> Default for Started<P> {
    fn default() -> Self {
        Self {
            db: None,
            workload: None,
            completion: None,
            metrics: None,
        }
    }
}

impl<P> Started<P> {
    async fn shutdown(&mut self) -> Vec<DriverError> {
        let mut errors = Vec::new();
        if let Some(metrics) = self.metrics.take()
            && let Err(e) = metrics.shutdown().await
        {
            errors.push(e.into());
        }
        if let Some(completion) = self.completion.take() {
            completion.shutdown();
        }
        if let Some(db) = self.db.take()
            && let Err(e) = db.shutdown()
        {
            errors.push(e.into());
        }
        if let Some(mut workload) = self.workload.take()
            && let Err(e) = workload.cleanup()
        {
            errors.push(e.into());
        }
        errors
    }
}

pub struct Client<P> {
    config: DriverConfig,
    registry: Registry<P>,
    time_source: DynTimeSource,
}

impl<P> Client<P>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(config: DriverConfig, registry: Registry<P>) -> Self {
        Self {
            config,
            registry,
            time_source: SystemTimeSource::shared(),
        }
    }

    pub fn with_time_source(mut self, time_source: DynTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Runs the configured mode. Parameters are checked before anything is
    /// created.
    pub async fn run(&self) -> Result<ClientOutcome> {
        self.config.validate()?;
        info!("running {} mode", self.config.mode);
        match &self.config.mode {
            ClientMode::Execute => self.execute().await.map(ClientOutcome::Executed),
            ClientMode::ValidateWorkload => self
                .validate_workload()
                .map(ClientOutcome::WorkloadValidated),
            ClientMode::ValidateDatabase { params_file } => self
                .validate_database(params_file)
                .map(ClientOutcome::DatabaseValidated),
            ClientMode::CreateValidationParams {
                params_file,
                set_size,
            } => self
                .create_validation_params(params_file, *set_size)
                .map(|written| ClientOutcome::ValidationParamsCreated {
                    path: params_file.clone(),
                    written,
                }),
            ClientMode::CalculateStatistics => self
                .calculate_statistics()
                .map(ClientOutcome::StatisticsCalculated),
        }
    }

    fn workload_name(&self) -> Result<&str> {
        self.config
            .workload
            .as_deref()
            .ok_or_else(|| DriverError::Config("no workload configured".to_string()))
    }

    fn db_name(&self) -> Result<&str> {
        self.config
            .db
            .as_deref()
            .ok_or_else(|| DriverError::Config("no database configured".to_string()))
    }

    fn init_workload(&self) -> Result<Box<dyn Workload<P>>> {
        let mut workload = self.registry.create_workload(self.workload_name()?)?;
        workload.init(&self.config.workload_params)?;
        Ok(workload)
    }

    async fn execute(&self) -> Result<ExecutionReport> {
        let reporter = ErrorReporter::new();
        let mut started = Started::default();
        let outcome = self.execute_with(&mut started, &reporter).await;
        let shutdown_errors = started.shutdown().await;

        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                for secondary in shutdown_errors {
                    warn!("ignoring shutdown error after failed run: {secondary}");
                }
                return Err(e);
            }
        };
        if let Some(first) = reporter.first_error() {
            for secondary in shutdown_errors {
                warn!("ignoring shutdown error after failed run: {secondary}");
            }
            return Err(DriverError::RunFailed {
                component: first.source,
                message: first.message,
                report: Some(Box::new(report)),
            });
        }
        if let Some(e) = shutdown_errors.into_iter().next() {
            return Err(e);
        }
        Ok(report)
    }

    async fn execute_with(
        &self,
        started: &mut Started<P>,
        reporter: &ErrorReporter,
    ) -> Result<ExecutionReport> {
        let config = &self.config;
        let mut artifacts = Vec::new();

        if let Some(dir) = &config.results_dir {
            prepare_results_dir(dir)?;
            let path = config.artifact_path(dir, CONFIGURATION_SUFFIX);
            export::write_configuration(&path, config)?;
            artifacts.push(path);
        }

        let mut db = self.registry.create_db(self.db_name()?)?;
        db.init(&config.db_params)?;
        let db: DynDb<P> = Arc::from(db);
        started.db = Some(Arc::clone(&db));
        info!("database {} initialized", self.db_name()?);

        let completion = Arc::new(CompletionTimeService::new(config.peer_ids.clone())?);
        started.completion = Some(Arc::clone(&completion));

        let sink: Option<Box<dyn ResultsSink>> = match (&config.results_dir, config.results_log) {
            (Some(dir), true) => {
                let path = config.artifact_path(dir, RESULTS_LOG_SUFFIX);
                let writer = ResultsLogWriter::create(&path)?;
                artifacts.push(path);
                Some(Box::new(writer))
            }
            _ => None,
        };
        let metrics = Arc::new(MetricsService::start(
            MetricsConfig::from(config),
            reporter.clone(),
            sink,
        ));
        started.metrics = Some(Arc::clone(&metrics));

        let workload = started.workload.insert(self.init_workload()?);
        let streams = workload.streams(config.seed)?;
        info!(
            "workload {} built {} stream(s)",
            self.workload_name()?,
            streams.len()
        );

        let start = self
            .time_source
            .now()
            .checked_add(config.start_delay)
            .ok_or_else(|| DriverError::Config("start delay overflows the clock".to_string()))?;
        let mapped = time_map(streams, start, config.compression_ratio)?;
        let limits = WorkloadLimits {
            operation_count: config.operation_count,
            duration: scaled_duration(config.duration, config.compression_ratio)?,
        };
        let operations = limit_stream(merge_streams(mapped), limits);

        let runner = WorkloadRunner::new(
            RunnerConfig::from(config),
            RunnerComponents {
                db,
                metrics: Arc::clone(&metrics),
                completion,
                reporter: reporter.clone(),
                time_source: Arc::clone(&self.time_source),
            },
        );
        info!("workload starts at {start}");
        let summary = runner.execute_workload(operations, start).await?;
        info!(
            "run finished: {} dispatched, {} completed, {} failed, {} delay breaches",
            summary.dispatched, summary.completed, summary.failed, summary.delay_breaches
        );
        for abandoned in &summary.abandoned {
            warn!(
                "abandoned {} scheduled at {}",
                abandoned.operation_type, abandoned.scheduled_start
            );
        }

        metrics.shutdown().await?;
        let results = metrics.results()?;
        info!("\n{}", export::render_results(&results));

        if let Some(dir) = &config.results_dir {
            let path = config.artifact_path(dir, RESULTS_JSON_SUFFIX);
            export::write_results_json(&path, &config.name, &results, &summary)?;
            artifacts.push(path);
        }

        Ok(ExecutionReport {
            summary,
            results,
            artifacts,
        })
    }

    fn validate_workload(&self) -> Result<WorkloadValidationResult> {
        let mut workload = self.init_workload()?;
        let result = validate_workload(workload.as_mut(), self.config.seed, self.config.limits());
        let cleanup = workload.cleanup();
        let result = result?;
        cleanup?;
        Ok(result)
    }

    fn validate_database(&self, params_file: &Path) -> Result<DbValidationResult> {
        let params = export::read_validation_params::<P>(params_file)?;
        info!(
            "loaded {} validation params from {}",
            params.len(),
            params_file.display()
        );
        let mut db = self.registry.create_db(self.db_name()?)?;
        db.init(&self.config.db_params)?;
        let result = validate_database(db.as_ref(), &params);
        db.shutdown()?;
        Ok(result)
    }

    fn create_validation_params(&self, params_file: &Path, set_size: u64) -> Result<u64> {
        if let Some(parent) = params_file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = ValidationParamsWriter::<P>::create(params_file)?;
        let mut workload = self.init_workload()?;
        let mut db = self.registry.create_db(self.db_name()?)?;
        db.init(&self.config.db_params)?;

        let written = create_validation_params(
            db.as_ref(),
            workload.as_mut(),
            self.config.seed,
            set_size,
            &mut writer,
        );
        if let Err(e) = db.shutdown() {
            warn!("database shutdown failed: {e}");
        }
        if let Err(e) = workload.cleanup() {
            warn!("workload cleanup failed: {e}");
        }
        written?;
        let written = writer.finish()?;
        info!(
            "wrote {written} validation params to {}",
            params_file.display()
        );
        Ok(written)
    }

    fn calculate_statistics(&self) -> Result<WorkloadStatistics> {
        let mut workload = self.init_workload()?;
        let streams = workload.streams(self.config.seed)?;
        let stats = calculate_statistics(limit_stream(merge_streams(streams), self.config.limits()));
        workload.cleanup()?;
        stats
    }
}

/// Duration limits are given in workload time; after compression the
/// stream moves faster by the same ratio.
fn scaled_duration(duration: Option<Duration>, ratio: f64) -> Result<Option<Duration>> {
    duration
        .map(|d| {
            d.mul_f64(ratio).ok_or_else(|| {
                DriverError::Config(format!("duration {d} scaled by {ratio} overflows"))
            })
        })
        .transpose()
}
