//! Sub-key derivation from a session's shared key (spec §4.B).
//!
//! Each purpose a shared key is used for gets its own sub-key, computed as
//! `HMAC-SHA256(shared_key, label)`. This keeps the session-info
//! authentication tag and the command authentication tag cryptographically
//! independent even though both descend from the same ECDH output.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::ecdh::SharedKey;

type HmacSha256 = Hmac<Sha256>;

/// Label for the sub-key that authenticates `SessionInfo` handshake replies.
pub const LABEL_SESSION_INFO: &[u8] = b"session info";
/// Label for the sub-key that authenticates ordinary commands.
pub const LABEL_COMMAND: &[u8] = b"authenticated command";

/// A 32-byte sub-key derived from a [`SharedKey`] for one specific purpose.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SubKey(pub [u8; 32]);

impl SubKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Derive a sub-key for `label` from `shared`. Never fails: HMAC-SHA256
/// accepts any key length.
pub fn derive_subkey(shared: &SharedKey, label: &[u8]) -> SubKey {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(shared.as_bytes()).expect("HMAC accepts any key length");
    mac.update(label);
    let out = mac.finalize().into_bytes();
    let mut key = [0u8; 32];
    key.copy_from_slice(&out);
    SubKey(key)
}

pub fn session_info_subkey(shared: &SharedKey) -> SubKey {
    derive_subkey(shared, LABEL_SESSION_INFO)
}

pub fn command_subkey(shared: &SharedKey) -> SubKey {
    derive_subkey(shared, LABEL_COMMAND)
}

/// Compute the HMAC-SHA256 tag for `SIGNATURE_TYPE_HMAC{,_PERSONALIZED}`
/// commands: `HMAC-SHA256(subkey, metadata || payload)`.
pub fn hmac_tag(subkey: &SubKey, metadata: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(subkey.as_bytes()).expect("HMAC accepts any key length");
    mac.update(metadata);
    mac.update(payload);
    let out = mac.finalize().into_bytes();
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&out);
    tag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdh::KeyPair;

    #[test]
    fn subkeys_for_distinct_labels_differ() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let shared = alice.shared_key(&bob.public_key_bytes()).unwrap();

        let info = session_info_subkey(&shared);
        let cmd = command_subkey(&shared);

        assert_ne!(info.as_bytes(), cmd.as_bytes());
    }

    #[test]
    fn hmac_tag_changes_with_payload() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let shared = alice.shared_key(&bob.public_key_bytes()).unwrap();
        let subkey = command_subkey(&shared);

        let tag_a = hmac_tag(&subkey, b"meta", b"payload-a");
        let tag_b = hmac_tag(&subkey, b"meta", b"payload-b");
        assert_ne!(tag_a, tag_b);
        assert_eq!(tag_a, hmac_tag(&subkey, b"meta", b"payload-a"));
    }

    #[test]
    fn subkey_derivation_is_deterministic() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let shared = alice.shared_key(&bob.public_key_bytes()).unwrap();

        assert_eq!(
            session_info_subkey(&shared).as_bytes(),
            session_info_subkey(&shared).as_bytes()
        );
    }
}
