//! services/api/src/crypto.rs
//!
//! Symmetric cipher for credential fields at rest. AES-256-GCM with a fresh
//! random 96-bit nonce per encryption; the wire form is base64 of
//! `nonce || ciphertext`. The key is process-wide configuration, loaded once
//! at startup, and must remain stable across restarts or previously stored
//! tokens become permanently undecryptable.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("ENCRYPT_KEY must be the base64 encoding of exactly 32 bytes")]
    InvalidKey,
    #[error("Failed to encrypt token field")]
    Encrypt,
    #[error("Token field is malformed or was encrypted under a different key")]
    Decrypt,
}

/// Encrypts and decrypts individual token fields.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Builds the cipher from the base64-encoded 32-byte key in config.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CipherError> {
        let bytes = BASE64.decode(encoded).map_err(|_| CipherError::InvalidKey)?;
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| CipherError::InvalidKey)?;
        let key = Key::<Aes256Gcm>::from(key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(raw))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let raw = BASE64.decode(encoded).map_err(|_| CipherError::Decrypt)?;
        if raw.len() < NONCE_LEN {
            return Err(CipherError::Decrypt);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }
}
