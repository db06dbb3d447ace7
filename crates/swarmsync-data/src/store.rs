use std::sync::Arc;

use crate::error::{DataError, Result};
use crate::keys::{ContentKey, LocationKey, ProtectionKeys};

/// Content key under which chunk payloads are stored.
pub const CHUNK_CONTENT_KEY: &str = "chunk";

/// The DHT key/value store as seen by process steps.
///
/// Implementations may block; steps treat any `Err` as a reason to cancel.
pub trait DataManager: Send + Sync {
    fn get(&self, location: &LocationKey, content: &ContentKey) -> Result<Option<Vec<u8>>>;

    /// Stores `data`, guarded by the public half of `protection`.
    fn put(&self, location: &LocationKey, content: &ContentKey, data: &[u8], protection: &ProtectionKeys) -> Result<()>;

    fn remove(&self, location: &LocationKey, content: &ContentKey, protection: &ProtectionKeys) -> Result<()>;

    /// Re-guards an entry with `new`, proving ownership with `old`.
    fn change_protection_key(
        &self,
        location: &LocationKey,
        content: &ContentKey,
        old: &ProtectionKeys,
        new: &ProtectionKeys,
    ) -> Result<()>;
}

/// Content-addressed chunk retrieval.
pub trait ChunkStore: Send + Sync {
    /// Encrypted payload of chunk `id`, or [`DataError::NotFound`].
    fn fetch(&self, id: &str) -> Result<Vec<u8>>;
}

/// Where chunk `id` lives in the DHT.
pub fn chunk_keys(id: &str) -> (LocationKey, ContentKey) {
    (LocationKey::new(id), ContentKey::new(CHUNK_CONTENT_KEY))
}

/// [`ChunkStore`] reading chunks through a [`DataManager`].
#[derive(Clone)]
pub struct DhtChunkStore {
    data: Arc<dyn DataManager>,
}

impl DhtChunkStore {
    pub fn new(data: Arc<dyn DataManager>) -> Self { Self { data } }
}

impl ChunkStore for DhtChunkStore {
    fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let (location, content) = chunk_keys(id);
        self.data
            .get(&location, &content)?
            .ok_or_else(|| DataError::NotFound(format!("chunk {id}")))
    }
}
