use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use benchdrive_api::{Duration, Instant};

/// Source of the current wall-clock time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

pub type DynTimeSource = Arc<dyn TimeSource>;

/// Wall clock anchored once at construction and advanced by a monotonic
/// clock, so readings never jump backwards.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    base: Instant,
    started: std::time::Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            base: Instant::EPOCH + Duration::from(since_epoch),
            started: std::time::Instant::now(),
        }
    }

    pub fn shared() -> DynTimeSource {
        Arc::new(Self::new())
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        self.base
            .checked_add(Duration::from(self.started.elapsed()))
            .unwrap_or(Instant::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source_is_monotonic() {
        let clock = SystemTimeSource::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
        assert!(last > Instant::from_millis(1_600_000_000_000));
    }
}
