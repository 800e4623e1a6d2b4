//! Admission control for encoder processes
//!
//! Each conversion holds a permit while its encoder runs. Requests beyond
//! the permit count wait in FIFO order instead of spawning more processes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Gate bounding concurrent encoder processes
#[derive(Debug)]
pub struct AdmissionGate {
    /// `None` when unbounded
    semaphore: Option<Arc<Semaphore>>,
    limit: usize,
    waiting: AtomicUsize,
}

/// Held for the lifetime of one encoder process
#[derive(Debug)]
pub struct Admission {
    _permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionGate {
    /// Create a gate allowing `limit` concurrent processes; 0 means unbounded
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
            limit,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Create a gate that never blocks
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Configured limit (0 = unbounded)
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of requests currently waiting for a permit
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Permits currently free, `None` when unbounded
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Wait until an encoder slot is free
    pub async fn admit(&self) -> Admission {
        let Some(semaphore) = &self.semaphore else {
            return Admission { _permit: None };
        };

        self.waiting.fetch_add(1, Ordering::Relaxed);
        let permit = semaphore.clone().acquire_owned().await;
        self.waiting.fetch_sub(1, Ordering::Relaxed);

        // The semaphore is never closed, so acquisition only fails if that changes.
        Admission {
            _permit: permit.ok(),
        }
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}
