//! AES-256-GCM sealing for SMTP passwords at rest.
//!
//! Wire format: `base64(nonce[12] ‖ ciphertext ‖ tag[16])`. A fresh nonce is
//! drawn from the OS RNG for every encryption.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::{info, warn};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Used when the configured key is not exactly 32 bytes. Development only.
const FALLBACK_KEY: &[u8; KEY_LEN] = b"outreach-dev-fallback-key-32byte";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,

    #[error("ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("ciphertext too short ({0} bytes)")]
    Truncated(usize),

    #[error("authentication tag mismatch")]
    TagMismatch,

    #[error("plaintext is not valid UTF-8")]
    Utf8,
}

/// Process-wide encryption service. The key is read-only after construction.
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Builds the service from the configured key string. A key that is not
    /// exactly 32 bytes is replaced by a fixed fallback with a warning.
    pub fn new(configured_key: &str) -> Self {
        let key_bytes: &[u8] = if configured_key.len() == KEY_LEN {
            configured_key.as_bytes()
        } else {
            warn!(
                "Encryption key must be exactly {KEY_LEN} bytes (got {}). \
                 Using the built-in fallback key: NOT SAFE FOR PRODUCTION",
                configured_key.len()
            );
            FALLBACK_KEY
        };

        // Both branches above yield exactly KEY_LEN bytes.
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
        info!("Encryption service initialized");
        Self { cipher }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let raw = STANDARD.decode(encoded.trim())?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Truncated(raw.len()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::TagMismatch)?;
        String::from_utf8(plain).map_err(|_| CryptoError::Utf8)
    }
}
