//! Bounded worker pool for node bodies.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{RunError, RunResult};

/// Semaphore-bounded dispatcher for blocking node bodies.
///
/// The pool is shared, not per-node-exclusive: the traversal driver runs one
/// body at a time, but a body may parallelize internally through
/// [`WorkerPool::run_parallel`], and nested loop sub-runs reuse the same
/// pool, so total concurrency stays bounded by the configured size.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool with the given number of concurrent slots.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Returns the configured pool size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of currently free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs a blocking job on the pool and awaits its result.
    pub async fn run<T, F>(&self, job: F) -> RunResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| RunError::Internal(format!("worker pool closed: {e}")))?;
        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| RunError::Internal(format!("node body panicked: {e}")))
    }

    /// Runs jobs from inside a node body, using free pool slots.
    ///
    /// Jobs that cannot get a slot run inline on the calling thread, so the
    /// call always makes progress even on a fully loaded pool. Results are
    /// returned in job order.
    pub fn run_parallel<T, F>(&self, jobs: Vec<F>) -> Vec<T>
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        std::thread::scope(|scope| {
            let slots: Vec<ParallelSlot<'_, T>> = jobs
                .into_iter()
                .map(|job| match Arc::clone(&self.semaphore).try_acquire_owned() {
                    Ok(permit) => ParallelSlot::Spawned(scope.spawn(move || {
                        let _permit = permit;
                        job()
                    })),
                    Err(_) => ParallelSlot::Done(job()),
                })
                .collect();
            slots
                .into_iter()
                .map(|slot| match slot {
                    ParallelSlot::Spawned(handle) => handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
                    ParallelSlot::Done(value) => value,
                })
                .collect()
        })
    }
}

enum ParallelSlot<'scope, T> {
    Spawned(std::thread::ScopedJoinHandle<'scope, T>),
    Done(T),
}
