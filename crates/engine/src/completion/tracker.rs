use std::collections::BTreeMap;

use benchdrive_api::{Duration, Instant};

use super::LocalCompletionTimeWriter;
use crate::error::{EngineError, EngineResult};

/// Turns out-of-order completions of individual operations into the
/// monotonic completed watermark a writer must report.
///
/// While operations are pending the watermark is one nanosecond below the
/// earliest pending initiated time; with nothing pending it is the highest
/// initiated time.
#[derive(Debug)]
pub struct LocalCompletionTracker {
    writer: LocalCompletionTimeWriter,
    pending: BTreeMap<Instant, usize>,
    highest_initiated: Option<Instant>,
    last_submitted: Option<Instant>,
}

impl LocalCompletionTracker {
    pub fn new(writer: LocalCompletionTimeWriter) -> Self {
        Self {
            writer,
            pending: BTreeMap::new(),
            highest_initiated: None,
            last_submitted: None,
        }
    }

    /// Reports `time` as both initiated and completed.
    pub fn seed(&mut self, time: Instant) -> EngineResult<()> {
        self.writer.submit_local_initiated_time(time)?;
        self.writer.submit_local_completed_time(time)?;
        self.highest_initiated = Some(self.highest_initiated.map_or(time, |h| h.max(time)));
        self.last_submitted = Some(time);
        Ok(())
    }

    pub fn initiate(&mut self, time: Instant) -> EngineResult<()> {
        self.writer.submit_local_initiated_time(time)?;
        *self.pending.entry(time).or_default() += 1;
        self.highest_initiated = Some(self.highest_initiated.map_or(time, |h| h.max(time)));
        Ok(())
    }

    pub fn complete(&mut self, time: Instant) -> EngineResult<()> {
        match self.pending.get_mut(&time) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.pending.remove(&time);
            }
            None => {
                return Err(EngineError::InvalidState(format!(
                    "completion of {time} was never initiated"
                )));
            }
        }

        let Some(watermark) = self.watermark() else {
            return Ok(());
        };
        if self.last_submitted.is_some_and(|last| watermark <= last) {
            return Ok(());
        }
        self.writer.submit_local_completed_time(watermark)?;
        self.last_submitted = Some(watermark);
        Ok(())
    }

    fn watermark(&self) -> Option<Instant> {
        match self.pending.keys().next() {
            Some(lowest) => lowest.checked_sub(Duration::from_nanos(1)),
            None => self.highest_initiated,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().sum()
    }
}
