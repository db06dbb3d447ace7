//! Contracts of the collaborators process steps talk to.
//!
//! The DHT ([`DataManager`]), content-addressed chunk retrieval
//! ([`ChunkStore`]), payload encryption ([`ChunkCipher`]) and direct peer
//! messaging ([`MessageManager`]) are external to the process core. This
//! crate defines their shape, the keys they are addressed by, file chunking,
//! and in-memory implementations for local mode and tests.

mod chunk;
mod cipher;
mod error;
mod keys;
mod memory;
mod message;
mod store;

pub use chunk::{Chunk, MetaChunk, chunk_id, split_chunks};
pub use cipher::{ChunkCipher, KeystreamCipher};
pub use error::{DataError, Result};
pub use keys::{CipherKey, ContentKey, LocationKey, ProtectionKeys};
pub use memory::{MemoryMessenger, MemoryStore};
pub use message::{Message, MessageManager, PeerId, SendCompleter, SendHandle, SendOutcome};
pub use store::{CHUNK_CONTENT_KEY, ChunkStore, DataManager, DhtChunkStore, chunk_keys};
