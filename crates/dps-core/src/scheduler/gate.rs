//! Process-wide concurrency gate shared across sessions.
//!
//! Every task execution holds one gate slot for the duration of its
//! processor call, so total concurrent external calls stay bounded no
//! matter how many sessions are in flight. This is the system's only
//! global backpressure mechanism.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded semaphore limiting simultaneous processor invocations.
///
/// Capacity is fixed once at manager construction from the default config's
/// `max_workers`. A session created with a custom config still draws from
/// this shared gate; its config only affects task sizing and adaptive
/// allocation.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    sem: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a slot. The returned permit releases its slot on drop, on
    /// every exit path. Returns None only if the semaphore is closed, which
    /// the gate never does.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.sem).acquire_owned().await.ok()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held. May be stale by the time the caller reads it.
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
