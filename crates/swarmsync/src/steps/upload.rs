use std::sync::{Arc, Mutex, PoisonError};

use swarmsync_data::{
    ChunkCipher, CipherKey, DataError, DataManager, MetaChunk, ProtectionKeys, chunk_id, chunk_keys, split_chunks,
};
use swarmsync_process::{ProcessExecutionError, ProcessStep, RollbackReason, Step, StepContext};

use crate::meta::FileMeta;
use crate::steps::PutStep;

/// Encrypts and stores every chunk of a file, then schedules the put of the
/// file's meta record right after itself.
///
/// Chunks are addressed by the digest of their sealed bytes, so files that
/// share plaintext never share a DHT entry. Rollback removes the chunks it
/// stored.
pub struct PutChunksStep {
    data:       Arc<dyn DataManager>,
    cipher:     Arc<dyn ChunkCipher>,
    protection: ProtectionKeys,
    owner_key:  CipherKey,
    name:       String,
    payload:    Vec<u8>,
    chunk_size: usize,
    stored:     Mutex<Vec<MetaChunk>>,
}

impl PutChunksStep {
    pub fn new(
        data: Arc<dyn DataManager>,
        cipher: Arc<dyn ChunkCipher>,
        protection: ProtectionKeys,
        owner_key: CipherKey,
        name: impl Into<String>,
        payload: Vec<u8>,
        chunk_size: usize,
    ) -> Self {
        Self {
            data,
            cipher,
            protection,
            owner_key,
            name: name.into(),
            payload,
            chunk_size,
            stored: Mutex::new(Vec::new()),
        }
    }

    fn stored(&self) -> std::sync::MutexGuard<'_, Vec<MetaChunk>> {
        self.stored.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProcessStep for PutChunksStep {
    fn execute(&self, ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
        let file_key = CipherKey::generate();
        let chunks = split_chunks(&self.payload, self.chunk_size);
        let total = chunks.len();

        for chunk in &chunks {
            ctx.checkpoint();
            let index = chunk.meta.index;
            let sealed = self.cipher.encrypt(&file_key, &chunk.data).map_err(|e| {
                ProcessExecutionError::with_source(format!("could not encrypt chunk {index} of {}", self.name), e)
            })?;
            let stored = MetaChunk::new(chunk_id(&sealed), chunk.meta.size, index);
            let (location, content) = chunk_keys(&stored.id);
            self.data
                .put(&location, &content, &sealed, &self.protection)
                .map_err(|e| ProcessExecutionError::with_source(format!("could not store chunk {index} of {}", self.name), e))?;
            self.stored().push(stored);
            ctx.set_progress((index + 1) as f64 / total as f64);
        }
        tracing::debug!(file = %self.name, chunks = total, "chunks stored");

        let meta = FileMeta {
            name:   self.name.clone(),
            size:   self.payload.len() as u64,
            chunks: self.stored().clone(),
            key:    file_key,
        };
        let sealed = meta
            .seal(self.cipher.as_ref(), &self.owner_key)
            .map_err(|e| ProcessExecutionError::with_source(format!("could not seal meta of {}", self.name), e))?;
        let (location, content) = FileMeta::keys(&self.name);
        ctx.insert_after_self(Step::new(PutStep::new(
            self.data.clone(),
            location,
            content,
            sealed,
            self.protection.clone(),
        )))?;
        Ok(())
    }

    fn rollback(&self, _ctx: &StepContext<'_>, _reason: &RollbackReason) -> Result<(), ProcessExecutionError> {
        let stored = std::mem::take(&mut *self.stored());
        for chunk in stored.iter().rev() {
            let (location, content) = chunk_keys(&chunk.id);
            match self.data.remove(&location, &content, &self.protection) {
                Ok(()) | Err(DataError::NotFound(_)) => {}
                Err(err) => {
                    tracing::warn!(file = %self.name, chunk = chunk.index, error = %err, "could not remove chunk");
                }
            }
        }
        Ok(())
    }
}
