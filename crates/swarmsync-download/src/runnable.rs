use std::path::PathBuf;
use std::sync::Arc;

use swarmsync_data::{ChunkCipher, ChunkStore, MetaChunk};

use crate::error::ChunkError;
use crate::task::DownloadTask;

/// Retrieves one chunk of one task.
pub(crate) struct ChunkFetch {
    pub(crate) task:   Arc<DownloadTask>,
    pub(crate) chunk:  MetaChunk,
    pub(crate) store:  Arc<dyn ChunkStore>,
    pub(crate) cipher: Arc<dyn ChunkCipher>,
}

impl ChunkFetch {
    pub(crate) fn run(self) {
        if self.task.is_aborted() {
            tracing::trace!(task = %self.task.id(), chunk = self.chunk.index, "task aborted, skipping chunk");
            return;
        }
        match self.fetch() {
            Ok(part) => self.task.set_downloaded(self.chunk.index, part),
            Err(err) => {
                self.task.abort_download(err.to_string());
            }
        }
    }

    fn fetch(&self) -> Result<PathBuf, ChunkError> {
        let index = self.chunk.index;
        let sealed = self.store.fetch(&self.chunk.id).map_err(|source| ChunkError::Fetch {
            index,
            id: self.chunk.id.clone(),
            source,
        })?;
        let plain = self
            .cipher
            .decrypt(self.task.key(), &sealed)
            .map_err(|source| ChunkError::Decrypt {
                index,
                id: self.chunk.id.clone(),
                source,
            })?;
        if plain.len() as u64 != self.chunk.size {
            return Err(ChunkError::Size {
                index,
                id: self.chunk.id.clone(),
                expected: self.chunk.size,
                actual: plain.len() as u64,
            });
        }
        if self.task.is_aborted() {
            tracing::trace!(task = %self.task.id(), chunk = index, "task aborted, discarding chunk");
            return Err(ChunkError::Discarded { index });
        }
        let part = swarmsync_fs::write_part(self.task.parts_root(), index, &plain)
            .map_err(|source| ChunkError::Write { index, source })?;
        tracing::debug!(task = %self.task.id(), chunk = index, bytes = plain.len(), "chunk retrieved");
        Ok(part)
    }
}
