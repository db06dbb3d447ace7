use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use swarmsync_data::{CipherKey, MetaChunk};
use swarmsync_fs::PartDir;
use uuid::Uuid;

use crate::error::{DownloadError, Result};

/// Observer of a download's outcome. Exactly one method is called, once.
pub trait DownloadListener: Send + Sync {
    fn download_finished(&self, task: &DownloadTask);

    fn download_failed(&self, task: &DownloadTask, reason: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Pending,
    Assembling,
    Finished,
    Aborted(String),
}

struct TaskState {
    slots:    Vec<Option<PathBuf>>,
    outcome:  Outcome,
    released: bool,
}

/// One file download: which chunks exist, which have arrived, and where the
/// file goes.
///
/// Chunk workers report through [`set_downloaded`](Self::set_downloaded) and
/// [`abort_download`](Self::abort_download); both serialise on the task's
/// state, so reassembly and abort each happen at most once.
pub struct DownloadTask {
    id:          Uuid,
    chunks:      Vec<MetaChunk>,
    destination: PathBuf,
    key:         CipherKey,
    parts_root:  PathBuf,
    parts:       Mutex<Option<PartDir>>,
    aborted:     AtomicBool,
    state:       Mutex<TaskState>,
    released:    Condvar,
    listeners:   RwLock<Vec<Arc<dyn DownloadListener>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

impl DownloadTask {
    /// Creates a task with a private staging directory under `temp_root`
    /// (the system temp directory if `None`).
    ///
    /// Chunk indices must be exactly `0..chunks.len()`, in any order.
    pub fn new(
        mut chunks: Vec<MetaChunk>,
        destination: impl Into<PathBuf>,
        key: CipherKey,
        temp_root: Option<&Path>,
    ) -> Result<Arc<Self>> {
        chunks.sort_by_key(|c| c.index);
        if let Some((position, chunk)) = chunks.iter().enumerate().find(|(i, c)| c.index != *i) {
            return Err(DownloadError::InvalidChunks(format!(
                "expected chunk index {position}, found {} ({})",
                chunk.index, chunk.id
            )));
        }

        let parts = match temp_root {
            Some(root) => PartDir::new_in(root)?,
            None => PartDir::new()?,
        };
        let slots = vec![None; chunks.len()];
        let task = Self {
            id: Uuid::new_v4(),
            destination: destination.into(),
            key,
            parts_root: parts.path().to_path_buf(),
            parts: Mutex::new(Some(parts)),
            aborted: AtomicBool::new(false),
            state: Mutex::new(TaskState {
                slots,
                outcome: Outcome::Pending,
                released: false,
            }),
            released: Condvar::new(),
            listeners: RwLock::new(Vec::new()),
            chunks,
        };
        tracing::debug!(task = %task.id, chunks = task.chunks.len(), destination = %task.destination.display(), "download task created");
        Ok(Arc::new(task))
    }

    pub fn id(&self) -> Uuid { self.id }

    pub fn chunks(&self) -> &[MetaChunk] { &self.chunks }

    pub fn destination(&self) -> &Path { &self.destination }

    pub fn key(&self) -> &CipherKey { &self.key }

    /// Staging directory for retrieved chunk parts.
    pub fn parts_root(&self) -> &Path { &self.parts_root }

    pub fn is_aborted(&self) -> bool { self.aborted.load(Ordering::SeqCst) }

    pub fn is_done(&self) -> bool { lock(&self.state).outcome == Outcome::Finished }

    pub fn is_terminal(&self) -> bool {
        matches!(lock(&self.state).outcome, Outcome::Finished | Outcome::Aborted(_))
    }

    pub fn abort_reason(&self) -> Option<String> {
        match &lock(&self.state).outcome {
            Outcome::Aborted(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Chunks not yet retrieved. Empty once the task is terminal.
    pub fn open_chunks(&self) -> Vec<MetaChunk> {
        let state = lock(&self.state);
        if state.outcome != Outcome::Pending {
            return Vec::new();
        }
        self.chunks
            .iter()
            .zip(&state.slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(chunk, _)| chunk.clone())
            .collect()
    }

    /// Fraction of chunks retrieved.
    pub fn progress(&self) -> f64 {
        let state = lock(&self.state);
        if state.slots.is_empty() {
            return if state.outcome == Outcome::Finished { 1.0 } else { 0.0 };
        }
        let filled = state.slots.iter().filter(|s| s.is_some()).count();
        filled as f64 / state.slots.len() as f64
    }

    pub fn attach_listener(&self, listener: Arc<dyn DownloadListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn DownloadListener>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Records that chunk `index` is staged at `part`.
    ///
    /// When the last slot fills, the parts are concatenated into the
    /// destination in index order. Calls on a terminal task are ignored.
    pub fn set_downloaded(&self, index: usize, part: PathBuf) {
        let mut state = lock(&self.state);
        if state.outcome != Outcome::Pending {
            tracing::trace!(task = %self.id, chunk = index, "late chunk ignored");
            return;
        }
        let Some(slot) = state.slots.get_mut(index) else {
            tracing::warn!(task = %self.id, chunk = index, "chunk index out of range");
            return;
        };
        *slot = Some(part);
        tracing::trace!(task = %self.id, chunk = index, "chunk staged");
        self.finish_if_complete(state);
    }

    /// Finishes a task whose slots are all filled. Used directly for tasks
    /// with no chunks.
    pub(crate) fn try_finish(&self) { self.finish_if_complete(lock(&self.state)); }

    fn finish_if_complete(&self, mut state: MutexGuard<'_, TaskState>) {
        if state.outcome != Outcome::Pending || state.slots.iter().any(Option::is_none) {
            return;
        }
        state.outcome = Outcome::Assembling;
        let parts: Vec<PathBuf> = state.slots.iter().flatten().cloned().collect();
        drop(state);

        match swarmsync_fs::assemble(&parts, &self.destination) {
            Ok(bytes) => {
                lock(&self.state).outcome = Outcome::Finished;
                tracing::info!(task = %self.id, bytes, destination = %self.destination.display(), "download finished");
                for listener in self.listener_snapshot() {
                    listener.download_finished(self);
                }
                self.cleanup();
                self.release();
            }
            Err(err) => {
                self.settle_abort(format!("reassembly failed: {err}"), true);
            }
        }
    }

    /// Aborts the download. Returns `false` if it was already finishing,
    /// finished or aborted.
    ///
    /// Outstanding chunk workers see the abort and drop their work.
    pub fn abort_download(&self, reason: impl Into<String>) -> bool { self.settle_abort(reason.into(), false) }

    fn settle_abort(&self, reason: String, assembling: bool) -> bool {
        {
            let mut state = lock(&self.state);
            let expected = if assembling { Outcome::Assembling } else { Outcome::Pending };
            if state.outcome != expected {
                return false;
            }
            state.outcome = Outcome::Aborted(reason.clone());
            self.aborted.store(true, Ordering::SeqCst);
        }
        tracing::warn!(task = %self.id, %reason, "download aborted");
        for listener in self.listener_snapshot() {
            listener.download_failed(self, &reason);
        }
        self.cleanup();
        self.release();
        true
    }

    fn cleanup(&self) {
        if let Some(mut parts) = lock(&self.parts).take()
            && let Err(err) = parts.close()
        {
            tracing::warn!(task = %self.id, error = %err, "failed to remove staging directory");
        }
    }

    fn release(&self) {
        lock(&self.state).released = true;
        self.released.notify_all();
    }

    /// Blocks until the task finished or aborted.
    ///
    /// A timeout only stops the wait; the download carries on.
    pub fn join(&self, timeout: Option<Duration>) -> Result<()> {
        let state = lock(&self.state);
        let state = match timeout {
            None => self
                .released
                .wait_while(state, |s| !s.released)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (state, result) = self
                    .released
                    .wait_timeout_while(state, timeout, |s| !s.released)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() {
                    return Err(DownloadError::Timeout);
                }
                state
            }
        };
        match &state.outcome {
            Outcome::Finished => Ok(()),
            Outcome::Aborted(reason) => Err(DownloadError::Aborted(reason.clone())),
            Outcome::Pending | Outcome::Assembling => Err(DownloadError::Interrupted),
        }
    }
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("chunks", &self.chunks.len())
            .field("destination", &self.destination)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}
