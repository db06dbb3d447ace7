use std::sync::{Arc, Mutex, PoisonError};

use swarmsync_data::{
    ChunkCipher, ChunkStore, CipherKey, DataManager, DhtChunkStore, KeystreamCipher, MemoryMessenger, MemoryStore,
    MessageManager, PeerId, ProtectionKeys,
};
use swarmsync_download::DownloadManager;
use swarmsync_process::{
    ProcessComponent, ProcessExecutor, ProcessListener, ProcessRegistry, ProcessState, RollbackReason,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::factory::ProcessFactory;

/// Identity of the logged-in user.
#[derive(Debug, Clone)]
pub struct Credentials {
    user:       PeerId,
    protection: ProtectionKeys,
    key:        CipherKey,
}

impl Credentials {
    pub fn new(user: PeerId, protection: ProtectionKeys, key: CipherKey) -> Self {
        Self { user, protection, key }
    }

    /// Fresh keys for `user`.
    pub fn generate(user: impl Into<String>) -> Self {
        Self::new(PeerId::new(user), ProtectionKeys::generate(), CipherKey::generate())
    }

    pub fn user(&self) -> &PeerId { &self.user }

    /// Guards every entry the user stores.
    pub fn protection(&self) -> &ProtectionKeys { &self.protection }

    /// Seals the user's meta records.
    pub fn key(&self) -> &CipherKey { &self.key }
}

pub struct SessionBuilder {
    config:      Config,
    credentials: Credentials,
    data:        Option<Arc<dyn DataManager>>,
    chunks:      Option<Arc<dyn ChunkStore>>,
    cipher:      Option<Arc<dyn ChunkCipher>>,
    messages:    Option<Arc<dyn MessageManager>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn data(mut self, data: Arc<dyn DataManager>) -> Self {
        self.data = Some(data);
        self
    }

    /// Chunk source for downloads. Defaults to reading chunks through the
    /// data manager.
    pub fn chunk_store(mut self, chunks: Arc<dyn ChunkStore>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    pub fn cipher(mut self, cipher: Arc<dyn ChunkCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn messages(mut self, messages: Arc<dyn MessageManager>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Builds the session. Collaborators left unset run in memory.
    pub fn build(self) -> Result<Session> {
        let data = self
            .data
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn DataManager>);
        let chunks = self
            .chunks
            .unwrap_or_else(|| Arc::new(DhtChunkStore::new(data.clone())) as Arc<dyn ChunkStore>);
        let cipher = self
            .cipher
            .unwrap_or_else(|| Arc::new(KeystreamCipher) as Arc<dyn ChunkCipher>);
        let messages = self
            .messages
            .unwrap_or_else(|| Arc::new(MemoryMessenger::new()) as Arc<dyn MessageManager>);

        let executor = ProcessExecutor::new(self.config.process.executor_options())?;
        let downloads = DownloadManager::new(chunks, cipher.clone(), self.config.download.download_options())?;

        tracing::info!(
            user = %self.credentials.user,
            async_workers = executor.workers(),
            download_concurrency = downloads.concurrency(),
            "session opened"
        );
        Ok(Session {
            config: self.config,
            credentials: self.credentials,
            data,
            cipher,
            messages,
            executor,
            downloads: Arc::new(downloads),
            registry: ProcessRegistry::new(),
        })
    }
}

/// Everything process trees of one logged-in user share.
///
/// Owns the worker pools and the registry of running processes; dropping the
/// session abandons work still queued on them.
pub struct Session {
    config:      Config,
    credentials: Credentials,
    data:        Arc<dyn DataManager>,
    cipher:      Arc<dyn ChunkCipher>,
    messages:    Arc<dyn MessageManager>,
    executor:    ProcessExecutor,
    downloads:   Arc<DownloadManager>,
    registry:    ProcessRegistry,
}

#[derive(Default)]
struct FailureCapture {
    reason: Mutex<Option<RollbackReason>>,
}

impl ProcessListener for FailureCapture {
    fn on_succeeded(&self) {}

    fn on_failed(&self, reason: &RollbackReason) {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.clone());
    }
}

impl Session {
    pub fn builder(credentials: Credentials) -> SessionBuilder {
        SessionBuilder {
            config: Config::default(),
            credentials,
            data: None,
            chunks: None,
            cipher: None,
            messages: None,
        }
    }

    pub fn config(&self) -> &Config { &self.config }

    pub fn credentials(&self) -> &Credentials { &self.credentials }

    pub fn data(&self) -> &Arc<dyn DataManager> { &self.data }

    pub fn cipher(&self) -> &Arc<dyn ChunkCipher> { &self.cipher }

    pub fn messages(&self) -> &Arc<dyn MessageManager> { &self.messages }

    pub fn executor(&self) -> &ProcessExecutor { &self.executor }

    pub fn downloads(&self) -> &Arc<DownloadManager> { &self.downloads }

    pub fn registry(&self) -> &ProcessRegistry { &self.registry }

    /// Builders for the user-visible processes.
    pub fn processes(&self) -> ProcessFactory<'_> { ProcessFactory::new(self) }

    /// Registers `root` and starts it on the calling thread.
    ///
    /// Returns once the synchronous part of the tree has run; the outcome
    /// reaches the root's listeners.
    pub fn execute(&self, root: Arc<dyn ProcessComponent>) -> Result<()> {
        self.registry.track(root.clone());
        root.start()?;
        Ok(())
    }

    /// Starts `root` and waits for its outcome, bounded by the configured
    /// await timeout.
    pub fn run(&self, root: Arc<dyn ProcessComponent>) -> Result<()> {
        let capture = Arc::new(FailureCapture::default());
        root.attach_listener(capture.clone());
        self.execute(root.clone())?;
        root.await_completion(self.config.process.await_timeout())?;

        match root.state() {
            ProcessState::Succeeded => Ok(()),
            state => {
                let reason = capture
                    .reason
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .unwrap_or_else(|| RollbackReason::new(root.id(), root.name(), format!("ended in state {state}")));
                Err(Error::Failed(reason))
            }
        }
    }

    /// Pauses every running process and stops chunk downloads.
    pub fn suspend(&self) -> usize {
        let paused = self.registry.pause_all();
        self.downloads.stop();
        tracing::info!(paused, "session suspended");
        paused
    }

    /// Undoes [`suspend`](Self::suspend).
    pub fn restore(&self) -> Result<usize> {
        self.downloads.resume()?;
        let resumed = self.registry.resume_all();
        tracing::info!(resumed, "session restored");
        Ok(resumed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.credentials.user)
            .field("running", &self.registry.len())
            .finish_non_exhaustive()
    }
}
