//! P-256 key agreement and shared-key derivation (spec §4.B).
//!
//! The shared AES-GCM key is `SHA-1(ECDH(priv, pub))[0..16]` — a 128-bit key
//! derived from the truncated hash of the raw X9.62 shared secret, matching
//! the scheme the protocol uses for its legacy (non-HKDF) key agreement.

use elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;
use sha1::{Digest, Sha1};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// A locally-generated P-256 key pair used to establish a session.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Build a key pair from a known 32-byte big-endian private scalar,
    /// rather than a freshly generated one. Used to exercise a published
    /// test vector against a fixed key instead of `generate`'s random one.
    pub fn from_secret_scalar(scalar: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_bytes(scalar.into()).map_err(|_| CryptoError::InvalidPublicKey)?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    /// Uncompressed SEC1 encoding, the form exchanged on the wire.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Derive the 128-bit shared key against a peer's uncompressed SEC1
    /// public key.
    pub fn shared_key(&self, peer_public_key: &[u8]) -> Result<SharedKey, CryptoError> {
        let peer = PublicKey::from_sec1_bytes(peer_public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());

        let digest = Sha1::digest(shared.raw_secret_bytes().as_slice());
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[..16]);
        Ok(SharedKey(key))
    }
}

/// The 128-bit key shared between the client and a vehicle domain after a
/// successful handshake. Zeroized on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SharedKey(pub(crate) [u8; 16]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Reconstruct a previously-derived shared key, e.g. from the session
    /// cache. Callers are responsible for the bytes' provenance; this
    /// performs no key agreement of its own.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}
