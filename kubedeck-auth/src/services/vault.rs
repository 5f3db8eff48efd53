//! Secret vault - authenticated encryption for recoverable secrets.
//!
//! Encrypts tenant kubeconfigs before they reach the database. AES-256-GCM
//! under one process-wide key; every token is base64(nonce || ciphertext)
//! with a fresh random nonce, so identical plaintexts never share
//! ciphertext.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use kubedeck_core::error::AppError;
use rand::RngCore;

use crate::config::EncryptionConfig;
use crate::services::error::ServiceError;

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
const NONCE_SIZE: usize = 12;

/// AES-256-GCM vault for secrets that must later be recovered.
#[derive(Clone)]
pub struct SecretVault {
    key: [u8; 32],
}

impl SecretVault {
    /// Create a vault from the configured base64-encoded 256-bit key.
    pub fn new(config: &EncryptionConfig) -> Result<Self, AppError> {
        let key_bytes = BASE64
            .decode(&config.key)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid ENCRYPTION_KEY: {}", e)))?;
        if key_bytes.len() != 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ENCRYPTION_KEY must decode to exactly 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(Self { key })
    }

    /// Encrypt plaintext, returning a base64 token.
    ///
    /// The empty string maps to the empty string: absent optional secrets
    /// stay absent rather than becoming ciphertext of nothing.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, ServiceError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| anyhow::anyhow!("Cipher init failed: {}", e))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    /// Decrypt a base64 token back to plaintext.
    ///
    /// Fails with `ServiceError::Decryption` on malformed input, truncation,
    /// a wrong key, or any tampering; ciphertext is never passed through as
    /// plaintext. The empty string maps back to the empty string.
    pub fn decrypt(&self, token: &str) -> Result<String, ServiceError> {
        if token.is_empty() {
            return Ok(String::new());
        }

        let combined = BASE64
            .decode(token)
            .map_err(|_| ServiceError::Decryption)?;

        if combined.len() < NONCE_SIZE {
            return Err(ServiceError::Decryption);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| ServiceError::Decryption)?;

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| ServiceError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| ServiceError::Decryption)
    }
}
