use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

const KEY_LEN: usize = 32;

/// `len` bytes from the operating system's CSPRNG.
pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Where an entry lives in the DHT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey(String);

impl LocationKey {
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Which entry under a location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Keypair whose public half guards overwrite and removal of an entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionKeys {
    public:  Vec<u8>,
    private: Vec<u8>,
}

impl ProtectionKeys {
    pub fn new(public: impl Into<Vec<u8>>, private: impl Into<Vec<u8>>) -> Self {
        Self {
            public:  public.into(),
            private: private.into(),
        }
    }

    /// Fresh random keypair.
    pub fn generate() -> Self { Self::new(random_bytes(KEY_LEN), random_bytes(KEY_LEN)) }

    pub fn public(&self) -> &[u8] { &self.public }

    pub fn private(&self) -> &[u8] { &self.private }
}

impl fmt::Debug for ProtectionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionKeys")
            .field("public", &hex::encode(&self.public))
            .field("private", &"<redacted>")
            .finish()
    }
}

/// Symmetric key used to encrypt chunk payloads.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherKey(Vec<u8>);

impl CipherKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self { Self(bytes.into()) }

    pub fn generate() -> Self { Self(random_bytes(KEY_LEN)) }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("CipherKey(<redacted>)") }
}
