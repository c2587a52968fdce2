use benchdrive_api::OperationType;
use serde::{Deserialize, Serialize};

pub const READ: OperationType = OperationType::from_static("read");
pub const UPDATE: OperationType = OperationType::from_static("update");
pub const SCAN: OperationType = OperationType::from_static("scan");

/// Arguments of a synthetic key/value operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyntheticPayload {
    Read { key: u64 },
    Update { key: u64, value: String },
    Scan { start_key: u64, limit: u32 },
}

impl SyntheticPayload {
    pub fn operation_type(&self) -> OperationType {
        match self {
            SyntheticPayload::Read { .. } => READ,
            SyntheticPayload::Update { .. } => UPDATE,
            SyntheticPayload::Scan { .. } => SCAN,
        }
    }
}
