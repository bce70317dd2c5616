//! Encryption of stored session payloads (AES-256-GCM)

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use sha2::{Digest, Sha256};

use crate::error::{SessionError, SessionResult};

const NONCE_LENGTH: usize = 12;
const DEFAULT_PASSPHRASE: &str = "hard-coded key:)";

/// Seals and opens session payloads. The stored form is `nonce || ciphertext`.
#[derive(Clone)]
pub struct PayloadCipher {
    key: [u8; 32],
}

impl PayloadCipher {
    /// Derive the 256-bit key from a passphrase (or the built-in one if `None`)
    pub fn new(passphrase: Option<&str>) -> Self {
        let digest = Sha256::digest(passphrase.unwrap_or(DEFAULT_PASSPHRASE).as_bytes());
        Self { key: digest.into() }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> SessionResult<Vec<u8>> {
        let cipher = Aes256Gcm::new((&self.key).into());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SessionError::Crypto(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> SessionResult<Vec<u8>> {
        if sealed.len() < NONCE_LENGTH {
            return Err(SessionError::Crypto(format!(
                "payload too short: {} bytes",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
        let cipher = Aes256Gcm::new((&self.key).into());
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| SessionError::Crypto(e.to_string()))
    }
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PayloadCipher(..)")
    }
}
