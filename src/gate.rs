//! Concurrency gate bounding simultaneous render tasks.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Fixed-capacity permit pool shared by every task in a batch.
///
/// A permit is released when its [`GatePermit`] is dropped, so release happens
/// on every exit path of the holder, including panics and aborts.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `capacity` holders at once.
    ///
    /// Capacities above `Semaphore::MAX_PERMITS` are capped to it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for a free slot.
    ///
    /// # Errors
    ///
    /// Returns an error only if the gate was closed.
    pub async fn acquire(&self) -> Result<GatePermit, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        Ok(GatePermit { _permit: permit })
    }

    /// Take a slot without waiting, or `None` if the gate is full.
    #[must_use]
    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

/// A held slot of a [`ConcurrencyGate`].
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}
