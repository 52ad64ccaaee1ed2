//! Key agreement, key derivation, and authenticated encryption for the
//! vehicle command protocol.

pub mod aesgcm;
pub mod compare;
pub mod ecdh;
pub mod error;
pub mod kdf;

pub use compare::tags_equal;
pub use ecdh::{KeyPair, SharedKey};
pub use error::CryptoError;
pub use kdf::{command_subkey, hmac_tag, session_info_subkey, SubKey};
