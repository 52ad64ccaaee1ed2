//! Errors raised by key agreement, derivation, and authenticated encryption.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid peer public key")]
    InvalidPublicKey,

    #[error("AES-GCM encryption failed")]
    Encrypt,

    #[error("AES-GCM decryption or authentication failed")]
    Decrypt,

    #[error("tag mismatch")]
    TagMismatch,

    #[error("nonce must be exactly 12 bytes, got {0}")]
    InvalidNonceLength(usize),
}
