//! Errors raised while building or parsing protocol wire types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("VIN must be exactly 17 ASCII characters, got {0:?}")]
    InvalidVin(String),

    #[error("challenge must be at most 16 bytes, got {0}")]
    ChallengeTooLong(usize),

    #[error("metadata entry for tag {tag} exceeds 255 bytes ({len})")]
    ValueTooLong { tag: u8, len: usize },

    #[error("truncated metadata block: expected at least {expected} more bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("unknown metadata tag {0}")]
    UnknownTag(u8),

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode envelope: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
