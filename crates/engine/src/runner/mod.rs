use std::collections::HashMap;
use std::iter::Peekable;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use benchdrive_api::{Db, Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::DynTimeSource;
use crate::completion::{CompletionTimeService, LocalCompletionTracker};
use crate::error::{EngineError, EngineResult};
use crate::metrics::MetricsService;
use crate::reporter::ErrorReporter;
use crate::stream::ScheduledOperation;
use crate::types::{AbandonedOperation, MetricsRecord, RunSummary, RunnerConfig, RunnerState};

pub mod delay;
pub mod flow_control;
pub mod status;

pub use delay::{DelayCheck, DelayChecker};
pub use flow_control::{FlowControlConfig, FlowController};
pub use status::RunCounters;

pub type DynDb<P> = Arc<dyn Db<P>>;

/// Services a runner drives. The database must already be initialized.
pub struct RunnerComponents<P> {
    pub db: DynDb<P>,
    pub metrics: Arc<MetricsService>,
    pub completion: Arc<CompletionTimeService>,
    pub reporter: ErrorReporter,
    pub time_source: DynTimeSource,
}

type SharedTracker = Arc<Mutex<LocalCompletionTracker>>;
type InFlightRegistry = Arc<Mutex<HashMap<u64, AbandonedOperation>>>;

fn lock_tracker(tracker: &SharedTracker) -> EngineResult<MutexGuard<'_, LocalCompletionTracker>> {
    tracker
        .lock()
        .map_err(|_| EngineError::InvalidState("completion tracker lock poisoned".to_string()))
}

fn registry(in_flight: &InFlightRegistry) -> MutexGuard<'_, HashMap<u64, AbandonedOperation>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Replays a merged operation stream against a database in real time.
///
/// One scheduling loop dispatches operations in stream order; handlers run
/// on the blocking pool bounded by the worker count, and the number of live
/// handlers is bounded by `max_in_flight`.
pub struct WorkloadRunner<P> {
    config: RunnerConfig,
    db: DynDb<P>,
    metrics: Arc<MetricsService>,
    completion: Arc<CompletionTimeService>,
    reporter: ErrorReporter,
    time_source: DynTimeSource,
    state: Mutex<RunnerState>,
    counters: Arc<RunCounters>,
}

struct RunContext<P> {
    flow: FlowController,
    tracker: Option<SharedTracker>,
    in_flight: InFlightRegistry,
    tasks: JoinSet<EngineResult<()>>,
    next_seq: u64,
    summary: RunSummary,
    delay: DelayChecker,
    _marker: std::marker::PhantomData<P>,
}

impl<P> WorkloadRunner<P>
where
    P: Send + Sync + 'static,
{
    pub fn new(config: RunnerConfig, components: RunnerComponents<P>) -> Self {
        Self {
            config,
            db: components.db,
            metrics: components.metrics,
            completion: components.completion,
            reporter: components.reporter,
            time_source: components.time_source,
            state: Mutex::new(RunnerState::Idle),
            counters: Arc::new(RunCounters::default()),
        }
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn counters(&self) -> Arc<RunCounters> {
        Arc::clone(&self.counters)
    }

    fn transition(&self, next: RunnerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("runner {:?} -> {next:?}", *state);
        *state = next;
    }

    fn fail(&self, err: EngineError) -> EngineError {
        self.reporter.report_engine_error(&err);
        err
    }

    /// Runs `operations`, whose times are already mapped onto `start`.
    ///
    /// Scheduling errors are pushed to the error reporter and end the run
    /// early; the returned summary still covers everything dispatched.
    /// Only initialization failures are returned as errors.
    pub async fn execute_workload<I>(&self, operations: I, start: Instant) -> EngineResult<RunSummary>
    where
        I: Iterator<Item = EngineResult<ScheduledOperation<P>>>,
    {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != RunnerState::Idle {
                return Err(EngineError::InvalidState(format!(
                    "workload already executed (runner is {:?})",
                    *state
                )));
            }
            *state = RunnerState::Initializing;
        }

        let mut ctx = match self.initialize(start).await {
            Ok(ctx) => ctx,
            Err(e) => {
                self.transition(RunnerState::Terminated);
                return Err(e);
            }
        };

        self.transition(RunnerState::Running);
        info!("workload runner started, first operation due at {start}");
        let cancel = CancellationToken::new();
        let status = self.config.status_interval.map(|interval| {
            status::spawn_status_display(
                interval,
                Arc::clone(&self.counters),
                Arc::clone(&self.completion),
                cancel.clone(),
            )
        });

        self.schedule(&mut ctx, operations.peekable()).await;

        self.transition(RunnerState::Draining);
        self.drain(&mut ctx).await;

        ctx.flow.close();
        cancel.cancel();
        if let Some(handle) = status
            && let Err(e) = handle.await
        {
            warn!("status display ended abnormally: {e}");
        }
        self.transition(RunnerState::Terminated);

        let mut summary = ctx.summary;
        summary.dispatched = self.counters.dispatched();
        summary.completed = self.counters.completed();
        summary.failed = self.counters.failed();
        summary.finish = Some(self.time_source.now());
        info!(
            "workload runner finished: dispatched={} completed={} failed={} abandoned={}",
            summary.dispatched,
            summary.completed,
            summary.failed,
            summary.abandoned.len()
        );
        Ok(summary)
    }

    async fn initialize(&self, start: Instant) -> EngineResult<RunContext<P>> {
        let tracker = if self.completion.slot_count() > 0 {
            let writer = self
                .completion
                .new_local_completion_time_writer()
                .map_err(|e| self.fail(e))?;
            let mut tracker = LocalCompletionTracker::new(writer);
            let seed = |offset: i64| {
                start
                    .checked_sub(Duration::from_nanos(offset))
                    .ok_or_else(|| EngineError::InvalidState(format!("start {start} too early")))
            };
            let initial = seed(2)?;
            tracker.seed(initial).map_err(|e| self.fail(e))?;
            tracker.seed(seed(1)?).map_err(|e| self.fail(e))?;

            let timeout = self.config.initialization_timeout;
            if !self
                .completion
                .wait_for_global_completion_time(initial, timeout)
                .await
            {
                return Err(self.fail(EngineError::GctTimeout {
                    target: initial,
                    timeout,
                }));
            }
            Some(Arc::new(Mutex::new(tracker)))
        } else {
            None
        };

        Ok(RunContext {
            flow: FlowController::new(&FlowControlConfig::from(&self.config)),
            tracker,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            tasks: JoinSet::new(),
            next_seq: 0,
            summary: RunSummary {
                start: Some(start),
                ..RunSummary::default()
            },
            delay: DelayChecker::new(
                self.config.effective_delay_policy(),
                self.config.tolerated_delay,
            ),
            _marker: std::marker::PhantomData,
        })
    }

    /// Next group of operations to dispatch together: one operation, or in
    /// windowed mode every operation starting before the first one's start
    /// plus the window.
    fn next_batch<I>(&self, operations: &mut Peekable<I>) -> Option<EngineResult<Vec<ScheduledOperation<P>>>>
    where
        I: Iterator<Item = EngineResult<ScheduledOperation<P>>>,
    {
        let first = match operations.next()? {
            Ok(first) => first,
            Err(e) => return Some(Err(e)),
        };
        let Some(window) = self.config.window else {
            return Some(Ok(vec![first]));
        };
        let end = first
            .operation
            .scheduled_start
            .checked_add(window)
            .unwrap_or(Instant::MAX);
        let mut batch = vec![first];
        while let Some(Ok(next)) = operations.peek() {
            if next.operation.scheduled_start >= end {
                break;
            }
            match operations.next() {
                Some(Ok(next)) => batch.push(next),
                _ => break,
            }
        }
        Some(Ok(batch))
    }

    async fn schedule<I>(&self, ctx: &mut RunContext<P>, mut operations: Peekable<I>)
    where
        I: Iterator<Item = EngineResult<ScheduledOperation<P>>>,
    {
        while let Some(batch) = self.next_batch(&mut operations) {
            self.reap(ctx);
            if self.reporter.error_encountered() {
                break;
            }
            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            };

            if !self.config.ignore_scheduled_start_times
                && let Some(first) = batch.first()
                && !self.sleep_until(first.operation.scheduled_start).await
            {
                break;
            }

            for scheduled in batch {
                if self.reporter.error_encountered() {
                    return;
                }
                if let Err(e) = self.dispatch(ctx, scheduled).await {
                    self.fail(e);
                    return;
                }
            }
        }
    }

    /// Sleeps in `spinner_sleep` slices until `target`. Returns `false` if
    /// an error was reported in the meantime.
    async fn sleep_until(&self, target: Instant) -> bool {
        let slice = self
            .config
            .spinner_sleep
            .to_std()
            .max(std::time::Duration::from_micros(50));
        loop {
            if self.reporter.error_encountered() {
                return false;
            }
            let now = self.time_source.now();
            if now >= target {
                return true;
            }
            let remaining = (target - now).to_std();
            tokio::time::sleep(remaining.min(slice)).await;
        }
    }

    async fn dispatch(&self, ctx: &mut RunContext<P>, scheduled: ScheduledOperation<P>) -> EngineResult<()> {
        let operation = &scheduled.operation;
        if operation.is_gated() {
            let timeout = self.config.gct_wait_timeout;
            if !self
                .completion
                .wait_for_global_completion_time(operation.dependency_time, timeout)
                .await
            {
                return Err(EngineError::GctTimeout {
                    target: operation.dependency_time,
                    timeout,
                });
            }
        }

        match ctx.delay.check(&scheduled, self.time_source.now()) {
            DelayCheck::OnTime => {}
            DelayCheck::Recorded(_) => ctx.summary.delay_breaches += 1,
            DelayCheck::Breach(e) => {
                ctx.summary.delay_breaches += 1;
                return Err(e);
            }
        }

        let permit = ctx.flow.acquire_in_flight().await?;
        if scheduled.tracked
            && let Some(tracker) = &ctx.tracker
        {
            lock_tracker(tracker)?.initiate(scheduled.operation.scheduled_start)?;
        }

        let seq = ctx.next_seq;
        ctx.next_seq += 1;
        registry(&ctx.in_flight).insert(
            seq,
            AbandonedOperation {
                operation_type: scheduled.operation.operation_type.clone(),
                scheduled_start: scheduled.operation.scheduled_start,
            },
        );
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(
            "dispatching {} scheduled at {}",
            scheduled.operation.operation_type, scheduled.operation.scheduled_start
        );

        let handler = OperationHandler {
            db: Arc::clone(&self.db),
            metrics: Arc::clone(&self.metrics),
            tracker: ctx.tracker.clone(),
            time_source: Arc::clone(&self.time_source),
            counters: Arc::clone(&self.counters),
            in_flight: Arc::clone(&ctx.in_flight),
            flow: ctx.flow.clone(),
        };
        ctx.tasks.spawn(async move {
            let _permit = permit;
            handler.run(seq, scheduled).await
        });
        Ok(())
    }

    fn absorb(&self, joined: Result<EngineResult<()>, JoinError>) {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.fail(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                self.fail(EngineError::Join(format!("operation handler: {e}")));
            }
        }
    }

    fn reap(&self, ctx: &mut RunContext<P>) {
        while let Some(joined) = ctx.tasks.try_join_next() {
            self.absorb(joined);
        }
    }

    async fn drain(&self, ctx: &mut RunContext<P>) {
        let grace = self.config.drain_grace;
        let drained = tokio::time::timeout(grace.to_std(), async {
            while let Some(joined) = ctx.tasks.join_next().await {
                self.absorb(joined);
            }
        })
        .await;
        if drained.is_ok() {
            return;
        }

        ctx.tasks.abort_all();
        let mut abandoned: Vec<AbandonedOperation> =
            registry(&ctx.in_flight).drain().map(|(_, op)| op).collect();
        abandoned.sort_by(|a, b| {
            a.scheduled_start
                .cmp(&b.scheduled_start)
                .then_with(|| a.operation_type.cmp(&b.operation_type))
        });
        for op in &abandoned {
            self.fail(EngineError::DrainTimeout {
                operation_type: op.operation_type.clone(),
                scheduled_start: op.scheduled_start,
                grace,
            });
        }
        ctx.summary.abandoned = abandoned;
    }
}

/// Everything one spawned handler needs to execute and account for a
/// single operation.
struct OperationHandler<P> {
    db: DynDb<P>,
    metrics: Arc<MetricsService>,
    tracker: Option<SharedTracker>,
    time_source: DynTimeSource,
    counters: Arc<RunCounters>,
    in_flight: InFlightRegistry,
    flow: FlowController,
}

impl<P> OperationHandler<P>
where
    P: Send + Sync + 'static,
{
    async fn run(self, seq: u64, scheduled: ScheduledOperation<P>) -> EngineResult<()> {
        let ScheduledOperation { operation, tracked } = scheduled;
        let worker = self.flow.acquire_worker().await?;

        let actual_start = self.time_source.now();
        let db = Arc::clone(&self.db);
        let (operation, outcome, elapsed) = tokio::task::spawn_blocking(move || {
            let started = std::time::Instant::now();
            let outcome = db.execute(&operation);
            (operation, outcome, started.elapsed())
        })
        .await
        .map_err(|e| EngineError::Join(format!("database call: {e}")))?;
        drop(worker);

        let success = match outcome {
            Ok(_) => true,
            Err(e) => {
                let err = EngineError::OperationExecution {
                    operation_type: operation.operation_type.clone(),
                    scheduled_start: operation.scheduled_start,
                    reason: e.to_string(),
                };
                warn!("{err}");
                false
            }
        };

        self.metrics
            .submit(MetricsRecord {
                operation_type: operation.operation_type.clone(),
                scheduled_start: operation.scheduled_start,
                actual_start,
                execution_duration: Duration::from(elapsed),
                success,
            })
            .await?;
        registry(&self.in_flight).remove(&seq);

        if tracked && let Some(tracker) = &self.tracker {
            lock_tracker(tracker)?.complete(operation.scheduled_start)?;
        }

        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
