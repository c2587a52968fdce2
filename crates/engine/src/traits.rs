use crate::types::MetricsRecord;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every metrics record as it is consumed, e.g. to write a
/// results log. Runs on the metrics consumer thread.
pub trait ResultsSink: Send {
    fn write(&mut self, record: &MetricsRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;
}
