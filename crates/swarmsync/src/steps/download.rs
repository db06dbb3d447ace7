use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use swarmsync_data::{ChunkCipher, CipherKey, DataError, DataManager};
use swarmsync_download::{DownloadError, DownloadManager, DownloadTask};
use swarmsync_process::{ProcessExecutionError, ProcessStep, RollbackReason, Step, StepContext};

use crate::meta::FileMeta;

/// Looks up a file's meta record and schedules its download right after
/// itself.
pub struct ResolveDownloadStep {
    data:        Arc<dyn DataManager>,
    cipher:      Arc<dyn ChunkCipher>,
    owner_key:   CipherKey,
    downloads:   Arc<DownloadManager>,
    name:        String,
    destination: PathBuf,
    timeout:     Option<Duration>,
}

impl ResolveDownloadStep {
    pub fn new(
        data: Arc<dyn DataManager>,
        cipher: Arc<dyn ChunkCipher>,
        owner_key: CipherKey,
        downloads: Arc<DownloadManager>,
        name: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data,
            cipher,
            owner_key,
            downloads,
            name: name.into(),
            destination: destination.into(),
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Reads and opens the meta record of `name`.
pub(crate) fn resolve_meta(
    data: &dyn DataManager,
    cipher: &dyn ChunkCipher,
    owner_key: &CipherKey,
    name: &str,
) -> Result<FileMeta, ProcessExecutionError> {
    let (location, content) = FileMeta::keys(name);
    let sealed = data
        .get(&location, &content)
        .map_err(|e| ProcessExecutionError::with_source(format!("could not look up {name}"), e))?
        .ok_or_else(|| ProcessExecutionError::with_source(format!("no such file: {name}"), DataError::NotFound(name.to_string())))?;
    FileMeta::open(&sealed, cipher, owner_key)
        .map_err(|e| ProcessExecutionError::with_source(format!("could not open meta of {name}"), e))
}

impl ProcessStep for ResolveDownloadStep {
    fn execute(&self, ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
        let meta = resolve_meta(self.data.as_ref(), self.cipher.as_ref(), &self.owner_key, &self.name)?;
        tracing::debug!(file = %self.name, chunks = meta.chunks.len(), "meta resolved");
        let download = DownloadFileStep::new(self.downloads.clone(), meta, self.destination.clone()).timeout(self.timeout);
        ctx.insert_after_self(Step::new(download))?;
        Ok(())
    }
}

/// Downloads a file's chunks and reassembles them at the destination.
///
/// Rollback aborts the download if it is still running. The destination is
/// deleted only when this download completed and wrote it.
pub struct DownloadFileStep {
    downloads:   Arc<DownloadManager>,
    meta:        FileMeta,
    destination: PathBuf,
    timeout:     Option<Duration>,
    task:        Mutex<Option<Arc<DownloadTask>>>,
}

impl DownloadFileStep {
    pub fn new(downloads: Arc<DownloadManager>, meta: FileMeta, destination: impl Into<PathBuf>) -> Self {
        Self {
            downloads,
            meta,
            destination: destination.into(),
            timeout: None,
            task: Mutex::new(None),
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The running or finished download, once started.
    pub fn task(&self) -> Option<Arc<DownloadTask>> { self.task.lock().unwrap_or_else(PoisonError::into_inner).clone() }
}

impl ProcessStep for DownloadFileStep {
    fn execute(&self, _ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
        let name = &self.meta.name;
        let task = DownloadTask::new(
            self.meta.chunks.clone(),
            &self.destination,
            self.meta.key.clone(),
            self.downloads.temp_root(),
        )
        .map_err(|e| ProcessExecutionError::with_source(format!("could not prepare download of {name}"), e))?;
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task.clone());

        self.downloads
            .submit(task.clone())
            .map_err(|e| ProcessExecutionError::with_source(format!("could not start download of {name}"), e))?;

        match task.join(self.timeout) {
            Ok(()) => Ok(()),
            Err(DownloadError::Timeout) => {
                task.abort_download("download timed out");
                Err(ProcessExecutionError::with_source(
                    format!("download of {name} timed out"),
                    DownloadError::Timeout,
                ))
            }
            Err(e) => Err(ProcessExecutionError::with_source(format!("download of {name} failed"), e)),
        }
    }

    fn rollback(&self, _ctx: &StepContext<'_>, _reason: &RollbackReason) -> Result<(), ProcessExecutionError> {
        let Some(task) = self.task() else {
            return Ok(());
        };
        if !task.abort_download("download rolled back") {
            // Already settled or assembling; let reassembly finish first.
            let _ = task.join(None);
        }
        // Anything at the destination before this download belongs to the user.
        if !task.is_done() {
            return Ok(());
        }
        match std::fs::remove_file(&self.destination) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessExecutionError::with_source(
                format!("could not delete {}", self.destination.display()),
                e,
            )),
        }
    }
}
