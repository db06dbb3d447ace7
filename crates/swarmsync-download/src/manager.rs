use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dashmap::DashMap;
use swarmsync_data::{ChunkCipher, ChunkStore};
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

use crate::error::{DownloadError, Result};
use crate::runnable::ChunkFetch;
use crate::task::{DownloadListener, DownloadTask};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    concurrency: usize,
    temp_root:   Option<PathBuf>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            temp_root:   None,
        }
    }
}

impl DownloadOptions {
    pub fn new() -> Self { Self::default() }

    /// Maximum number of chunks fetched at once.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Parent directory for per-task staging directories.
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }
}

type OpenTasks = DashMap<Uuid, Arc<DownloadTask>>;

struct Unregister {
    open: Weak<OpenTasks>,
}

impl Unregister {
    fn remove(&self, task: &DownloadTask) {
        if let Some(open) = self.open.upgrade() {
            open.remove(&task.id());
        }
    }
}

impl DownloadListener for Unregister {
    fn download_finished(&self, task: &DownloadTask) { self.remove(task) }

    fn download_failed(&self, task: &DownloadTask, _reason: &str) { self.remove(task) }
}

/// Schedules chunk fetches of all open downloads on a bounded pool.
///
/// Tasks stay registered until they finish or abort. Stopping the manager
/// abandons queued and running fetches; starting it again reschedules every
/// chunk still missing.
pub struct DownloadManager {
    store:   Arc<dyn ChunkStore>,
    cipher:  Arc<dyn ChunkCipher>,
    options: DownloadOptions,
    pool:    Mutex<Option<Runtime>>,
    open:    Arc<OpenTasks>,
}

fn build_pool(concurrency: usize) -> Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(concurrency)
        .thread_name("swarmsync-download")
        .build()
        .map_err(|e| DownloadError::Pool(e.to_string()))
}

impl DownloadManager {
    pub fn new(store: Arc<dyn ChunkStore>, cipher: Arc<dyn ChunkCipher>, options: DownloadOptions) -> Result<Self> {
        let pool = build_pool(options.concurrency)?;
        Ok(Self {
            store,
            cipher,
            options,
            pool: Mutex::new(Some(pool)),
            open: Arc::new(DashMap::new()),
        })
    }

    pub fn concurrency(&self) -> usize { self.options.concurrency }

    pub fn temp_root(&self) -> Option<&Path> { self.options.temp_root.as_deref() }

    fn pool(&self) -> MutexGuard<'_, Option<Runtime>> { self.pool.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn is_running(&self) -> bool { self.pool().is_some() }

    /// Registered tasks that have not finished or aborted.
    pub fn open_tasks(&self) -> Vec<Arc<DownloadTask>> { self.open.iter().map(|e| e.value().clone()).collect() }

    /// Registers `task` and schedules its missing chunks.
    ///
    /// While the manager is stopped the task waits for the next
    /// [`start`](Self::start).
    pub fn submit(&self, task: Arc<DownloadTask>) -> Result<()> {
        if task.is_terminal() {
            tracing::debug!(task = %task.id(), "terminal task not scheduled");
            return Ok(());
        }
        self.open.insert(task.id(), task.clone());
        task.attach_listener(Arc::new(Unregister {
            open: Arc::downgrade(&self.open),
        }));
        tracing::info!(task = %task.id(), chunks = task.chunks().len(), "download submitted");

        // Nothing to fetch: the task completes right away.
        task.try_finish();
        // Also catches an abort that settled before the listener was attached.
        if task.is_terminal() {
            self.open.remove(&task.id());
            return Ok(());
        }
        self.schedule(&task);
        Ok(())
    }

    fn schedule(&self, task: &Arc<DownloadTask>) {
        let pool = self.pool();
        let Some(runtime) = pool.as_ref() else {
            tracing::debug!(task = %task.id(), "manager stopped, chunks queued until start");
            return;
        };
        for chunk in task.open_chunks() {
            let fetch = ChunkFetch {
                task: task.clone(),
                chunk,
                store: self.store.clone(),
                cipher: self.cipher.clone(),
            };
            runtime.spawn_blocking(move || fetch.run());
        }
    }

    /// Shuts the pool down without waiting for in-flight fetches.
    pub fn stop(&self) {
        if let Some(runtime) = self.pool().take() {
            runtime.shutdown_background();
            tracing::info!(open = self.open.len(), "download manager stopped");
        }
    }

    /// Recreates the pool after [`stop`](Self::stop) and reschedules every
    /// open chunk of every registered task. No-op while running.
    pub fn start(&self) -> Result<()> {
        {
            let mut pool = self.pool();
            if pool.is_some() {
                return Ok(());
            }
            *pool = Some(build_pool(self.options.concurrency)?);
        }
        let open = self.open_tasks();
        tracing::info!(open = open.len(), "download manager started");
        for task in open {
            self.schedule(&task);
        }
        Ok(())
    }

    /// Recovery after [`stop`](Self::stop); same as [`start`](Self::start).
    pub fn resume(&self) -> Result<()> { self.start() }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        if let Some(runtime) = self.pool().take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("options", &self.options)
            .field("open", &self.open.len())
            .finish_non_exhaustive()
    }
}
