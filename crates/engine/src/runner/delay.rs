use benchdrive_api::{Duration, Instant};
use tracing::warn;

use crate::error::EngineError;
use crate::stream::ScheduledOperation;
use crate::types::ExecutionDelayPolicy;

/// Verdict for one operation's start delay.
#[derive(Debug, Clone)]
pub enum DelayCheck {
    OnTime,
    /// Late beyond tolerance; counted and the run continues.
    Recorded(Duration),
    /// Late beyond tolerance; the run must stop.
    Breach(EngineError),
}

#[derive(Debug, Clone, Copy)]
pub struct DelayChecker {
    policy: ExecutionDelayPolicy,
    tolerated: Duration,
}

impl DelayChecker {
    pub fn new(policy: ExecutionDelayPolicy, tolerated: Duration) -> Self {
        Self { policy, tolerated }
    }

    pub fn check<P>(&self, scheduled: &ScheduledOperation<P>, now: Instant) -> DelayCheck {
        let operation = &scheduled.operation;
        let delay = now
            .checked_duration_since(operation.scheduled_start)
            .unwrap_or(Duration::ZERO);
        if delay <= self.tolerated {
            return DelayCheck::OnTime;
        }
        match self.policy {
            ExecutionDelayPolicy::Record => {
                warn!(
                    "{} scheduled at {} started {delay} late",
                    operation.operation_type, operation.scheduled_start
                );
                DelayCheck::Recorded(delay)
            }
            ExecutionDelayPolicy::Terminate => DelayCheck::Breach(EngineError::ExecutionDelay {
                operation_type: operation.operation_type.clone(),
                scheduled_start: operation.scheduled_start,
                delay,
                tolerated: self.tolerated,
            }),
        }
    }
}
