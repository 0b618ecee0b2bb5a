//! Server-wide bound on concurrent index builds.

use chartmill_core::IndexError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore gating storage listings and index regenerations.
///
/// Permits are owned and released on drop, so every exit path of a worker,
/// including errors and panics, gives its slot back.
#[derive(Debug, Clone)]
pub struct BuildLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl BuildLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, IndexError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| IndexError::LimiterClosed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of builds currently holding a permit.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Stop handing out permits. Waiting and future acquires fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
