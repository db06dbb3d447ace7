use serde::{Deserialize, Serialize};
use swarmsync_data::{ChunkCipher, CipherKey, ContentKey, DataError, LocationKey, MetaChunk};

/// Content key of the per-file meta record.
pub const META_CONTENT_KEY: &str = "meta";

/// What a peer needs to rebuild a file: its chunk addresses and the key the
/// chunks are encrypted with.
///
/// Stored sealed under the owner's key at `(file name, "meta")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name:   String,
    pub size:   u64,
    pub chunks: Vec<MetaChunk>,
    pub key:    CipherKey,
}

impl FileMeta {
    pub fn keys(name: &str) -> (LocationKey, ContentKey) {
        (LocationKey::new(name), ContentKey::new(META_CONTENT_KEY))
    }

    pub fn seal(&self, cipher: &dyn ChunkCipher, key: &CipherKey) -> Result<Vec<u8>, DataError> {
        let json = serde_json::to_vec(self).map_err(|e| DataError::Backend(format!("meta encoding: {e}")))?;
        cipher.encrypt(key, &json)
    }

    pub fn open(sealed: &[u8], cipher: &dyn ChunkCipher, key: &CipherKey) -> Result<Self, DataError> {
        let json = cipher.decrypt(key, sealed)?;
        serde_json::from_slice(&json).map_err(|e| DataError::Backend(format!("meta decoding: {e}")))
    }
}
