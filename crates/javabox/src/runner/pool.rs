//! Worker pool
//!
//! Bounds how many runs compile and execute at the same time.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// Bounded pool of run slots
///
/// Each run holds a slot from dispatch until its process is gone and its
/// working directory removed. Clones share the same slots.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    /// Semaphore to limit concurrent runs
    semaphore: Arc<Semaphore>,

    /// Number of slots in the pool
    capacity: usize,
}

impl WorkerPool {
    /// Create a new pool with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot
    ///
    /// Returns `None` only if the pool has been closed.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        debug!(available = self.available(), "acquired run slot");
        Some(permit)
    }

    /// Run a future on its own task once a slot is free
    ///
    /// The slot is released when the future completes.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let pool = self.clone();
        tokio::spawn(async move {
            let _permit = pool.acquire().await;
            task.await
        })
    }

    /// Get the number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
