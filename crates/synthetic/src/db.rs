use std::sync::Arc;

use benchdrive_api::{
    Db, DbError, DbParams, DbResult, HandlerTable, Operation, OperationResult, OperationType,
};
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info};

use crate::payload::{READ, SCAN, SyntheticPayload, UPDATE};

type Store = Arc<DashMap<u64, String>>;

fn mismatch(operation_type: &OperationType, payload: &SyntheticPayload) -> DbError {
    DbError::Execution {
        operation_type: operation_type.clone(),
        reason: format!("unexpected payload {payload:?}"),
    }
}

fn initial_value(key: u64) -> String {
    format!("initial-{key}")
}

/// In-process key/value store. `record_count` keys are loaded at init with
/// deterministic values, so validation params replay identically.
pub struct MemoryDb {
    store: Store,
    handlers: HandlerTable<SyntheticPayload>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        let store: Store = Arc::new(DashMap::new());
        let handlers = HandlerTable::new()
            .with(READ, {
                let store = Arc::clone(&store);
                move |op: &Operation<SyntheticPayload>| match &op.payload {
                    SyntheticPayload::Read { key } => {
                        let value = store.get(key).map(|v| v.value().clone());
                        Ok(json!({ "key": key, "value": value }).into())
                    }
                    other => Err(mismatch(&op.operation_type, other)),
                }
            })
            .with(UPDATE, {
                let store = Arc::clone(&store);
                move |op: &Operation<SyntheticPayload>| match &op.payload {
                    SyntheticPayload::Update { key, value } => {
                        let previous = store.insert(*key, value.clone());
                        Ok(json!({ "key": key, "created": previous.is_none() }).into())
                    }
                    other => Err(mismatch(&op.operation_type, other)),
                }
            })
            .with(SCAN, {
                let store = Arc::clone(&store);
                move |op: &Operation<SyntheticPayload>| match &op.payload {
                    SyntheticPayload::Scan { start_key, limit } => {
                        let end = start_key.saturating_add(u64::from(*limit));
                        let rows: Vec<_> = (*start_key..end)
                            .filter_map(|key| {
                                store
                                    .get(&key)
                                    .map(|v| json!({ "key": key, "value": v.value() }))
                            })
                            .collect();
                        Ok(json!({ "start_key": start_key, "rows": rows }).into())
                    }
                    other => Err(mismatch(&op.operation_type, other)),
                }
            });
        Self { store, handlers }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, key: u64) -> Option<String> {
        self.store.get(&key).map(|v| v.value().clone())
    }
}

impl Db<SyntheticPayload> for MemoryDb {
    fn init(&mut self, params: &DbParams) -> DbResult<()> {
        let record_count: u64 = params.parse_or("record_count", 1_000)?;
        self.store.clear();
        for key in 0..record_count {
            self.store.insert(key, initial_value(key));
        }
        info!("memory database loaded {record_count} records");
        Ok(())
    }

    fn execute(&self, operation: &Operation<SyntheticPayload>) -> DbResult<OperationResult> {
        debug!(
            "memory {} at {}",
            operation.operation_type, operation.scheduled_start
        );
        self.handlers.dispatch(operation)
    }

    fn shutdown(&self) -> DbResult<()> {
        info!("memory database holds {} records at shutdown", self.store.len());
        Ok(())
    }
}

/// Accepts every operation and does nothing, optionally after a fixed
/// pause to simulate latency.
#[derive(Debug, Default)]
pub struct NoopDb {
    latency: std::time::Duration,
}

impl NoopDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: std::time::Duration) -> Self {
        Self { latency }
    }
}

impl<P> Db<P> for NoopDb {
    fn init(&mut self, params: &DbParams) -> DbResult<()> {
        let micros: u64 = params.parse_or("latency_us", self.latency.as_micros() as u64)?;
        self.latency = std::time::Duration::from_micros(micros);
        Ok(())
    }

    fn execute(&self, _operation: &Operation<P>) -> DbResult<OperationResult> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(OperationResult::empty())
    }

    fn shutdown(&self) -> DbResult<()> {
        Ok(())
    }
}
