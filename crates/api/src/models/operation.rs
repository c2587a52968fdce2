use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use super::temporal::Instant;

/// Type tag of an operation, used for dispatch and for grouping metrics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationType(Cow<'static, str>);

impl OperationType {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OperationType {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl From<String> for OperationType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for OperationType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Whether an operation must wait for the global completion time to pass
/// its dependency time before it may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyMode {
    #[default]
    Independent,
    Gated,
}

/// A unit of work scheduled for a specific instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation<P> {
    pub operation_type: OperationType,
    pub scheduled_start: Instant,
    /// Everything this operation depends on completed before this instant.
    /// Never later than `scheduled_start`.
    pub dependency_time: Instant,
    #[serde(default)]
    pub dependency_mode: DependencyMode,
    pub payload: P,
}

impl<P> Operation<P> {
    /// Creates an independent operation whose dependency time equals its
    /// scheduled start.
    pub fn new(operation_type: impl Into<OperationType>, scheduled_start: Instant, payload: P) -> Self {
        Self {
            operation_type: operation_type.into(),
            scheduled_start,
            dependency_time: scheduled_start,
            dependency_mode: DependencyMode::Independent,
            payload,
        }
    }

    /// Marks the operation as gated on `dependency_time`.
    pub fn gated_on(mut self, dependency_time: Instant) -> Self {
        self.dependency_time = dependency_time;
        self.dependency_mode = DependencyMode::Gated;
        self
    }

    pub fn with_dependency_time(mut self, dependency_time: Instant) -> Self {
        self.dependency_time = dependency_time;
        self
    }

    pub fn is_gated(&self) -> bool {
        self.dependency_mode == DependencyMode::Gated
    }

    /// Replaces both time fields, keeping everything else.
    pub fn with_times(mut self, scheduled_start: Instant, dependency_time: Instant) -> Self {
        self.scheduled_start = scheduled_start;
        self.dependency_time = dependency_time;
        self
    }

    pub fn dependency_time_is_valid(&self) -> bool {
        self.dependency_time <= self.scheduled_start
    }
}

/// Opaque value returned by a database adapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationResult(pub serde_json::Value);

impl OperationResult {
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for OperationResult {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
