//! Backpressure gate
//!
//! Caps the number of in-flight emissions, where in-flight means submitted to
//! the sink but not yet acknowledged. The driver acquires a slot before each
//! submission and registers the sink's completion handle against it; the slot
//! is released when the completion resolves, success or failure alike, so a
//! slow or failing sink can only stall the replay, never leak capacity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::sink::{Completion, CompletionError};

/// Invoked once per failed completion, off the driver's hot path
pub type ErrorCallback = Arc<dyn Fn(&CompletionError) + Send + Sync>;

/// Semaphore-backed gate over asynchronous sink completions
pub struct BackpressureGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    errors: Arc<AtomicU64>,
    on_error: Option<ErrorCallback>,
}

impl BackpressureGate {
    /// Gate allowing at most `capacity` unacknowledged emissions
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            errors: Arc::new(AtomicU64::new(0)),
            on_error: None,
        }
    }

    /// Gate that additionally reports each failed completion to `on_error`
    pub fn with_error_callback(capacity: usize, on_error: ErrorCallback) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            errors: Arc::new(AtomicU64::new(0)),
            on_error: Some(on_error),
        }
    }

    /// Wait for a free slot, then tie it to `completion`: the slot is held
    /// until the completion resolves.
    pub async fn acquire(&self, completion: Completion) {
        // the semaphore is never closed, acquire_owned cannot fail
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            return;
        };
        let errors = Arc::clone(&self.errors);
        let on_error = self.on_error.clone();
        tokio::spawn(watch_completion(completion, permit, errors, on_error));
    }

    /// Emissions currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Configured slot capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Failed completions observed so far
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Wait until every held slot has been released
    pub async fn drain(&self) {
        // acquiring the full capacity means no completion is outstanding
        let Ok(all) = self.semaphore.acquire_many(self.capacity as u32).await else {
            return;
        };
        drop(all);
        debug!("backpressure gate drained");
    }
}

async fn watch_completion(
    completion: Completion,
    permit: OwnedSemaphorePermit,
    errors: Arc<AtomicU64>,
    on_error: Option<ErrorCallback>,
) {
    if let Err(err) = completion.wait().await {
        errors.fetch_add(1, Ordering::Relaxed);
        if let Some(callback) = on_error {
            callback(&err);
        }
    }
    drop(permit);
}
