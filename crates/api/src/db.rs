use std::collections::HashMap;

use crate::error::{DbError, DbResult};
use crate::models::{DbParams, Operation, OperationResult, OperationType};

/// A database adapter.
///
/// `init` runs once before the workload starts, `execute` is called
/// concurrently from the worker pool and must not block for longer than the
/// operation itself, `shutdown` runs once after draining.
pub trait Db<P>: Send + Sync {
    fn init(&mut self, params: &DbParams) -> DbResult<()>;

    fn execute(&self, operation: &Operation<P>) -> DbResult<OperationResult>;

    fn shutdown(&self) -> DbResult<()>;
}

pub type OperationHandler<P> =
    Box<dyn Fn(&Operation<P>) -> DbResult<OperationResult> + Send + Sync>;

/// Routes operations to the handler registered for their type.
pub struct HandlerTable<P> {
    handlers: HashMap<OperationType, OperationHandler<P>>,
}

impl<P> Default for HandlerTable<P> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<P> HandlerTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `operation_type`, replacing any previous one.
    pub fn register<F>(&mut self, operation_type: impl Into<OperationType>, handler: F)
    where
        F: Fn(&Operation<P>) -> DbResult<OperationResult> + Send + Sync + 'static,
    {
        self.handlers
            .insert(operation_type.into(), Box::new(handler));
    }

    pub fn with<F>(mut self, operation_type: impl Into<OperationType>, handler: F) -> Self
    where
        F: Fn(&Operation<P>) -> DbResult<OperationResult> + Send + Sync + 'static,
    {
        self.register(operation_type, handler);
        self
    }

    pub fn dispatch(&self, operation: &Operation<P>) -> DbResult<OperationResult> {
        let handler = self
            .handlers
            .get(&operation.operation_type)
            .ok_or_else(|| DbError::UnsupportedOperation(operation.operation_type.clone()))?;
        handler(operation)
    }
}

impl<P> std::fmt::Debug for HandlerTable<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(OperationType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("HandlerTable")
            .field("operation_types", &types)
            .finish()
    }
}
