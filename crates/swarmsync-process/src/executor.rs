use std::cell::Cell;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::error::{ProcessError, Result};

thread_local! {
    // Pool whose job the current thread is running, 0 outside any pool.
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

struct PoolMark {
    previous: usize,
}

impl PoolMark {
    fn enter(pool: usize) -> Self {
        Self {
            previous: CURRENT_POOL.replace(pool),
        }
    }
}

impl Drop for PoolMark {
    fn drop(&mut self) { CURRENT_POOL.set(self.previous); }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    workers:     usize,
    thread_name: String,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            workers:     8,
            thread_name: "swarmsync-process".to_string(),
        }
    }
}

impl ExecutorOptions {
    pub fn new() -> Self { Self::default() }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Bounded worker pool shared by every asynchronous component of a session.
///
/// Jobs are blocking closures; at most `workers` run at once and the rest
/// queue. Cloning shares the pool. Dropping the last clone abandons queued
/// jobs without waiting for running ones.
#[derive(Clone)]
pub struct ProcessExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Option<Runtime>,
    workers: usize,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl ProcessExecutor {
    pub fn new(options: ExecutorOptions) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(options.workers)
            .thread_name(options.thread_name)
            .build()
            .map_err(|e| ProcessError::Pool(e.to_string()))?;
        tracing::debug!(workers = options.workers, "process executor started");
        Ok(Self {
            inner: Arc::new(Inner {
                runtime: Some(runtime),
                workers: options.workers,
            }),
        })
    }

    pub fn workers(&self) -> usize { self.inner.workers }

    fn pool_id(&self) -> usize { Arc::as_ptr(&self.inner) as usize }

    /// Whether the calling thread is running a job of this pool.
    ///
    /// Work started from such a thread must not queue on the pool and wait
    /// for it: with every worker waiting, the queue never drains.
    pub fn on_worker_thread(&self) -> bool { CURRENT_POOL.get() == self.pool_id() }

    /// Queues `job` on the pool.
    pub fn spawn<F>(&self, job: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = self
            .inner
            .runtime
            .as_ref()
            .ok_or_else(|| ProcessError::Pool("executor shut down".to_string()))?;
        let pool = self.pool_id();
        Ok(runtime.spawn_blocking(move || {
            let _mark = PoolMark::enter(pool);
            job();
        }))
    }
}

impl std::fmt::Debug for ProcessExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessExecutor")
            .field("workers", &self.inner.workers)
            .finish_non_exhaustive()
    }
}
