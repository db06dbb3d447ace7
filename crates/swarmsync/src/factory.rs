use std::path::{Path, PathBuf};
use std::sync::Arc;

use swarmsync_data::{ContentKey, LocationKey, Message, PeerId};
use swarmsync_process::{AsyncComponent, Process, ProcessComponent, ResultStep, SequentialProcess, Step};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::steps::{GetStep, NotifyPeersStep, PutChunksStep, ResolveDeleteStep, ResolveDownloadStep};

/// Assembles the process trees behind user actions.
///
/// Trees are returned unstarted; hand them to [`Session::execute`] or
/// [`Session::run`].
pub struct ProcessFactory<'a> {
    session: &'a Session,
}

impl<'a> ProcessFactory<'a> {
    pub(crate) fn new(session: &'a Session) -> Self { Self { session } }

    /// Stores `content` as file `name`: encrypted chunks first, then the
    /// sealed meta record.
    pub fn upload_file(&self, name: &str, content: Vec<u8>) -> Result<Arc<SequentialProcess>> {
        let session = self.session;
        let credentials = session.credentials();
        let root = SequentialProcess::new(format!("upload {name}"));
        root.add(Step::new(PutChunksStep::new(
            session.data().clone(),
            session.cipher().clone(),
            credentials.protection().clone(),
            credentials.key().clone(),
            name,
            content,
            session.config().upload.chunk_size,
        )))?;
        Ok(root)
    }

    /// Uploads the file at `path` under its file name.
    pub fn upload_path(&self, path: impl AsRef<Path>) -> Result<Arc<SequentialProcess>> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::NotAFile(path.to_path_buf()))?;
        self.upload_file(&name, content)
    }

    /// Uploads several files side by side. Any failure rolls back all of
    /// them.
    pub fn upload_files(&self, files: impl IntoIterator<Item = (String, Vec<u8>)>) -> Result<Arc<SequentialProcess>> {
        let root = SequentialProcess::new("upload batch");
        for (name, content) in files {
            let upload = self.upload_file(&name, content)?;
            root.add(AsyncComponent::new(upload, self.session.executor().clone()))?;
        }
        Ok(root)
    }

    /// Fetches file `name` into `destination`.
    pub fn download_file(&self, name: &str, destination: impl Into<PathBuf>) -> Result<Arc<SequentialProcess>> {
        let session = self.session;
        let root = SequentialProcess::new(format!("download {name}"));
        let resolve = ResolveDownloadStep::new(
            session.data().clone(),
            session.cipher().clone(),
            session.credentials().key().clone(),
            session.downloads().clone(),
            name,
            destination,
        )
        .timeout(session.config().download.join_timeout());
        root.add(Step::new(resolve))?;
        Ok(root)
    }

    /// Removes file `name`: its meta record, then each chunk.
    pub fn delete_file(&self, name: &str) -> Result<Arc<SequentialProcess>> {
        let session = self.session;
        let credentials = session.credentials();
        let root = SequentialProcess::new(format!("delete {name}"));
        root.add(Step::new(ResolveDeleteStep::new(
            session.data().clone(),
            session.cipher().clone(),
            credentials.key().clone(),
            credentials.protection().clone(),
            name,
        )))?;
        Ok(root)
    }

    /// Notifies `peers` in the background.
    pub fn notify_peers(&self, peers: Vec<PeerId>, message: Message) -> Arc<AsyncComponent> {
        let session = self.session;
        let notify = Step::new(NotifyPeersStep::new(
            session.messages().clone(),
            peers,
            message,
            session.config().upload.notify_resend_limit,
        ));
        AsyncComponent::new(notify, session.executor().clone())
    }

    /// Reads one raw DHT entry.
    pub fn get(&self, location: LocationKey, content: ContentKey) -> Arc<ResultStep<GetStep>> {
        ResultStep::new(GetStep::new(self.session.data().clone(), location, content))
    }
}

impl std::fmt::Debug for ProcessFactory<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessFactory").finish_non_exhaustive()
    }
}
