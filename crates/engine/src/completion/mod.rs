use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use benchdrive_api::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

pub mod tracker;

pub use tracker::LocalCompletionTracker;

const SERVICE_NAME: &str = "completion time service";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct PeerSlot {
    peer_id: String,
    claimed: bool,
    last_initiated: Option<Instant>,
    last_completed: Option<Instant>,
}

impl PeerSlot {
    fn new(peer_id: String) -> Self {
        Self {
            peer_id,
            claimed: false,
            last_initiated: None,
            last_completed: None,
        }
    }
}

#[derive(Debug)]
struct ServiceState {
    slots: Vec<PeerSlot>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ServiceState>,
    gct: AtomicI64,
    established: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn global_completion_time(&self) -> Option<Instant> {
        if self.established.load(Ordering::Acquire) {
            Some(Instant::from_nanos(self.gct.load(Ordering::Acquire)))
        } else {
            None
        }
    }

    fn submit_initiated(&self, slot: usize, time: Instant) -> EngineResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(EngineError::ServiceClosed(SERVICE_NAME));
        }
        let peer = &mut state.slots[slot];
        if let Some(previous) = peer.last_initiated
            && time < previous
        {
            return Err(EngineError::CompletionTimeOrdering(format!(
                "peer {} initiated {time} after {previous}",
                peer.peer_id
            )));
        }
        peer.last_initiated = Some(time);
        Ok(())
    }

    fn submit_completed(&self, slot: usize, time: Instant) -> EngineResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(EngineError::ServiceClosed(SERVICE_NAME));
        }
        let peer = &mut state.slots[slot];
        if let Some(previous) = peer.last_completed
            && time < previous
        {
            return Err(EngineError::CompletionTimeOrdering(format!(
                "peer {} completed {time} after {previous}",
                peer.peer_id
            )));
        }
        match peer.last_initiated {
            Some(initiated) if time <= initiated => {}
            initiated => {
                return Err(EngineError::CompletionTimeOrdering(format!(
                    "peer {} completed {time} beyond last initiated {initiated:?}",
                    peer.peer_id
                )));
            }
        }
        peer.last_completed = Some(time);
        self.advance(&state);
        Ok(())
    }

    /// Recomputes the minimum over peers. Must be called with the state lock
    /// held so concurrent advances are serialized.
    fn advance(&self, state: &ServiceState) {
        let mut minimum: Option<Instant> = None;
        for slot in &state.slots {
            match (slot.claimed, slot.last_completed) {
                (true, Some(completed)) => {
                    minimum = Some(minimum.map_or(completed, |m| m.min(completed)));
                }
                _ => return,
            }
        }
        let Some(minimum) = minimum else {
            return;
        };

        if self.established.load(Ordering::Acquire) {
            let previous = self.gct.fetch_max(minimum.as_nanos(), Ordering::AcqRel);
            if minimum.as_nanos() > previous {
                debug!("global completion time advanced to {minimum}");
            }
        } else {
            self.gct.store(minimum.as_nanos(), Ordering::Release);
            self.established.store(true, Ordering::Release);
            debug!("global completion time established at {minimum}");
        }
    }
}

/// Tracks, per peer, the latest instant before which everything it
/// initiated has completed, and exposes the minimum across peers as the
/// global completion time (GCT).
#[derive(Debug)]
pub struct CompletionTimeService {
    shared: Arc<Shared>,
    peer_ids: Vec<String>,
    poll_interval: Duration,
}

impl CompletionTimeService {
    /// Creates a service with one writer slot per peer.
    ///
    /// With no peers nothing could ever advance the GCT, so an internal
    /// writer is seeded to the maximum instant and gated operations never
    /// wait.
    pub fn new(peer_ids: Vec<String>) -> EngineResult<Self> {
        let slot_names = if peer_ids.is_empty() {
            vec!["local".to_string()]
        } else {
            peer_ids.clone()
        };
        let service = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ServiceState {
                    slots: slot_names.into_iter().map(PeerSlot::new).collect(),
                    closed: false,
                }),
                gct: AtomicI64::new(i64::MIN),
                established: AtomicBool::new(false),
            }),
            peer_ids,
            poll_interval: DEFAULT_POLL_INTERVAL,
        };

        if service.peer_ids.is_empty() {
            let writer = service.claim_slot()?;
            let nearly_max = Instant::MAX - Duration::from_nanos(1);
            writer.submit_local_initiated_time(nearly_max)?;
            writer.submit_local_completed_time(nearly_max)?;
            writer.submit_local_initiated_time(Instant::MAX)?;
            writer.submit_local_completed_time(Instant::MAX)?;
            info!("no peers configured, global completion time pinned to maximum");
        }

        Ok(service)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn peer_ids(&self) -> &[String] {
        &self.peer_ids
    }

    /// Number of slots that may be bound to writers.
    pub fn slot_count(&self) -> usize {
        self.peer_ids.len()
    }

    /// Binds the next free peer slot to a new writer.
    pub fn new_local_completion_time_writer(&self) -> EngineResult<LocalCompletionTimeWriter> {
        if self.peer_ids.is_empty() {
            if self.shared.state().closed {
                return Err(EngineError::ServiceClosed(SERVICE_NAME));
            }
            return Err(EngineError::NoPeerSlots(0));
        }
        self.claim_slot()
    }

    fn claim_slot(&self) -> EngineResult<LocalCompletionTimeWriter> {
        let mut state = self.shared.state();
        if state.closed {
            return Err(EngineError::ServiceClosed(SERVICE_NAME));
        }
        let configured = self.peer_ids.len();
        let (index, slot) = state
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| !slot.claimed)
            .ok_or(EngineError::NoPeerSlots(configured))?;
        slot.claimed = true;
        debug!("writer bound to peer slot {index} ({})", slot.peer_id);
        Ok(LocalCompletionTimeWriter {
            shared: Arc::downgrade(&self.shared),
            slot: index,
            peer_id: slot.peer_id.clone(),
        })
    }

    /// Current GCT, or `None` until every peer has reported a completion.
    pub fn global_completion_time(&self) -> Option<Instant> {
        self.shared.global_completion_time()
    }

    /// Waits until the GCT reaches `target`. Returns `false` on timeout, or
    /// as soon as the service is shut down without having reached it.
    pub async fn wait_for_global_completion_time(&self, target: Instant, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout.to_std();
        let poll = self.poll_interval.to_std().max(std::time::Duration::from_micros(100));
        loop {
            if self.global_completion_time().is_some_and(|gct| gct >= target) {
                return true;
            }
            if self.is_closed() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state().closed
    }

    /// Releases every writer slot. Later submissions fail; the last GCT
    /// stays readable.
    pub fn shutdown(&self) {
        let mut state = self.shared.state();
        if state.closed {
            return;
        }
        state.closed = true;
        for slot in &mut state.slots {
            slot.claimed = false;
        }
        info!("completion time service shut down");
    }
}

/// Handle through which one peer reports progress. Holds only a weak
/// reference: once the service is gone every submission fails.
#[derive(Debug, Clone)]
pub struct LocalCompletionTimeWriter {
    shared: Weak<Shared>,
    slot: usize,
    peer_id: String,
}

impl LocalCompletionTimeWriter {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn service(&self) -> EngineResult<Arc<Shared>> {
        self.shared
            .upgrade()
            .ok_or(EngineError::ServiceClosed(SERVICE_NAME))
    }

    /// Reports that an operation with dependency time `time` has started.
    pub fn submit_local_initiated_time(&self, time: Instant) -> EngineResult<()> {
        self.service()?.submit_initiated(self.slot, time)
    }

    /// Reports that everything this peer initiated up to `time` has
    /// finished.
    pub fn submit_local_completed_time(&self, time: Instant) -> EngineResult<()> {
        self.service()?.submit_completed(self.slot, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_count_matches_peer_list() {
        let service = CompletionTimeService::new(vec!["a".into(), "b".into()])
            .expect("service should start");
        assert_eq!(service.slot_count(), 2);
        let first = service
            .new_local_completion_time_writer()
            .expect("first slot");
        assert_eq!(first.peer_id(), "a");
        let second = service
            .new_local_completion_time_writer()
            .expect("second slot");
        assert_eq!(second.peer_id(), "b");
        assert!(matches!(
            service.new_local_completion_time_writer(),
            Err(EngineError::NoPeerSlots(2))
        ));
    }
}
