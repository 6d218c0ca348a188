//! Bounded task pools.
//!
//! Every unit of background work (trap processing, configuration actions)
//! runs on a [`WorkerPool`]: a fixed number of slots guarded by a semaphore,
//! with a [`TaskTracker`] so the process can wait for in-flight work before
//! exiting.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info_span, Instrument};

use sonic_trap_common::{TrapError, TrapResult};

/// A fixed-size pool of task slots.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    capacity: usize,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    next_task: AtomicU64,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
            next_task: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Number of tasks spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Spawns `task` if a slot is free, otherwise rejects it with
    /// [`TrapError::PoolSaturated`].
    pub fn try_spawn<F>(&self, task: F) -> TrapResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| TrapError::pool_saturated(&self.name, self.capacity))?;
        Ok(self.spawn_with_permit(permit, task))
    }

    /// Spawns `task` once a slot is free.
    pub async fn spawn<F>(&self, task: F) -> TrapResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| TrapError::internal(format!("worker pool '{}' is closed", self.name)))?;
        Ok(self.spawn_with_permit(permit, task))
    }

    fn spawn_with_permit<F>(&self, permit: OwnedSemaphorePermit, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("worker", pool = %self.name, task = task_id);
        debug!(pool = %self.name, task = task_id, "Task started");
        self.tracker.spawn(
            async move {
                let _slot = permit;
                task.await
            }
            .instrument(span),
        )
    }

    /// Stops accepting tracked work and waits for every spawned task.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        debug!(pool = %self.name, "Worker pool drained");
    }
}
