//! AES-128-GCM authenticated encryption for `AES_GCM`-mode commands (spec §4.B).

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes128Gcm, Nonce,
};
use rand_core::{OsRng, RngCore};

use crate::ecdh::SharedKey;
use crate::error::CryptoError;

/// 12-byte GCM nonce, generated fresh for every encryption.
pub fn generate_nonce() -> [u8; 12] {
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` in place under `key`, authenticating `aad` (the
/// metadata TLV block). Returns the 16-byte tag; `plaintext` is overwritten
/// with ciphertext.
pub fn seal(
    key: &SharedKey,
    nonce: &[u8; 12],
    aad: &[u8],
    plaintext: &mut Vec<u8>,
) -> Result<[u8; 16], CryptoError> {
    let cipher = Aes128Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Encrypt)?;
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), aad, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// Decrypt `ciphertext` in place under `key`, verifying `aad` and `tag`.
/// On authentication failure `ciphertext` is left unspecified; callers must
/// not use it.
pub fn open(
    key: &SharedKey,
    nonce: &[u8; 12],
    aad: &[u8],
    ciphertext: &mut Vec<u8>,
    tag: &[u8; 16],
) -> Result<(), CryptoError> {
    let cipher = Aes128Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Decrypt)?;
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(nonce), aad, ciphertext, tag.into())
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdh::KeyPair;

    fn shared_key() -> SharedKey {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        a.shared_key(&b.public_key_bytes()).unwrap()
    }

    #[test]
    fn seal_then_open_roundtrips() {
        let key = shared_key();
        let nonce = generate_nonce();
        let aad = b"metadata-block";
        let mut data = b"unlock-command-payload".to_vec();
        let original = data.clone();

        let tag = seal(&key, &nonce, aad, &mut data).unwrap();
        assert_ne!(data, original);

        open(&key, &nonce, aad, &mut data, &tag).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn tampered_aad_fails_authentication() {
        let key = shared_key();
        let nonce = generate_nonce();
        let mut data = b"payload".to_vec();
        let tag = seal(&key, &nonce, b"metadata-a", &mut data).unwrap();

        assert!(open(&key, &nonce, b"metadata-b", &mut data, &tag).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = shared_key();
        let nonce = generate_nonce();
        let aad = b"metadata";
        let mut data = b"payload".to_vec();
        let tag = seal(&key, &nonce, aad, &mut data).unwrap();

        data[0] ^= 0xFF;
        assert!(open(&key, &nonce, aad, &mut data, &tag).is_err());
    }
}
