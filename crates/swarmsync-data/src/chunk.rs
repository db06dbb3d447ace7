use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Descriptor of one chunk of a file, without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaChunk {
    /// DHT address: hex SHA-256 of the bytes stored under it.
    pub id:    String,
    pub size:  u64,
    /// Ordinal position within the file.
    pub index: usize,
}

impl MetaChunk {
    pub fn new(id: impl Into<String>, size: u64, index: usize) -> Self {
        Self {
            id: id.into(),
            size,
            index,
        }
    }
}

/// A chunk together with its plaintext bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub meta: MetaChunk,
    pub data: Vec<u8>,
}

pub fn chunk_id(data: &[u8]) -> String { hex::encode(Sha256::digest(data)) }

/// Splits `data` into ordinal chunks of at most `chunk_size` bytes.
///
/// Ids are digests of the plaintext slices; a caller that stores sealed
/// chunks readdresses them by the sealed bytes. Empty input yields no
/// chunks. A `chunk_size` of zero is treated as one.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<Chunk> {
    data.chunks(chunk_size.max(1))
        .enumerate()
        .map(|(index, slice)| Chunk {
            meta: MetaChunk::new(chunk_id(slice), slice.len() as u64, index),
            data: slice.to_vec(),
        })
        .collect()
}
