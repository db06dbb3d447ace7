use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{DataError, Result};
use crate::keys::{CipherKey, random_bytes};

type HmacSha256 = Hmac<Sha256>;

/// Symmetric encryption of chunk payloads.
pub trait ChunkCipher: Send + Sync {
    fn encrypt(&self, key: &CipherKey, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, key: &CipherKey, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 32;

/// SHA-256 keystream cipher with an HMAC-SHA256 tag.
///
/// Layout: `nonce (16) || body || tag (32)`. Detects a wrong key or a
/// tampered payload. Meant for local mode and tests; production nodes plug
/// in their own [`ChunkCipher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeystreamCipher;

impl KeystreamCipher {
    fn apply(key: &CipherKey, nonce: &[u8], data: &mut [u8]) {
        for (block, chunk) in data.chunks_mut(32).enumerate() {
            let pad = Sha256::new()
                .chain_update(key.as_bytes())
                .chain_update(nonce)
                .chain_update((block as u64).to_le_bytes())
                .finalize();
            for (byte, mask) in chunk.iter_mut().zip(pad.iter()) {
                *byte ^= mask;
            }
        }
    }

    fn mac(key: &CipherKey, nonce: &[u8], body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| DataError::Crypto(e.to_string()))?;
        mac.update(nonce);
        mac.update(body);
        Ok(mac)
    }
}

impl ChunkCipher for KeystreamCipher {
    fn encrypt(&self, key: &CipherKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        if key.as_bytes().is_empty() {
            return Err(DataError::Crypto("empty key".into()));
        }
        let nonce = random_bytes(NONCE_LEN);

        let mut out = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(plaintext);
        Self::apply(key, &nonce, &mut out[NONCE_LEN..]);
        let tag = Self::mac(key, &nonce, &out[NONCE_LEN..])?.finalize().into_bytes();
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn decrypt(&self, key: &CipherKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(DataError::Crypto(format!("payload of {} bytes is truncated", ciphertext.len())));
        }
        let (nonce, rest) = ciphertext.split_at(NONCE_LEN);
        let (body, tag) = rest.split_at(rest.len() - TAG_LEN);
        Self::mac(key, nonce, body)?
            .verify_slice(tag)
            .map_err(|_| DataError::Crypto("authentication tag mismatch".into()))?;
        let mut plain = body.to_vec();
        Self::apply(key, nonce, &mut plain);
        Ok(plain)
    }
}
