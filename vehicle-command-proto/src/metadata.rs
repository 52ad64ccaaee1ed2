//! Authenticated metadata TLV codec (spec §4.A).
//!
//! A metadata block is an ordered, tag-indexed sequence of `(tag, length,
//! value)` entries followed by a single `0xFF` terminator. Entries are always
//! emitted in ascending tag order; fields that are not set are omitted.
//! `FLAGS` is only emitted when a nonzero bitmask is supplied (§9).

use crate::domain::{Domain, SignatureType};

const TAG_SIGNATURE_TYPE: u8 = 0;
const TAG_DOMAIN: u8 = 1;
const TAG_PERSONALIZATION: u8 = 2;
const TAG_EPOCH: u8 = 3;
const TAG_EXPIRES_AT: u8 = 4;
const TAG_COUNTER: u8 = 5;
const TAG_CHALLENGE: u8 = 6;
const TAG_FLAGS: u8 = 7;
const TERMINATOR: u8 = 0xFF;

/// Builds an authenticated metadata block by filling in the fields that are
/// relevant to the message being authenticated, then calling [`encode`].
///
/// Field order on the wire is fixed by tag value, not by call order, so the
/// builder can be populated in any order.
#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    signature_type: Option<SignatureType>,
    domain: Option<Domain>,
    personalization: Option<[u8; 17]>,
    epoch: Option<[u8; 16]>,
    expires_at: Option<u32>,
    counter: Option<u32>,
    challenge: Option<Vec<u8>>,
    flags: Option<u32>,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signature_type(mut self, v: SignatureType) -> Self {
        self.signature_type = Some(v);
        self
    }

    pub fn domain(mut self, v: Domain) -> Self {
        self.domain = Some(v);
        self
    }

    /// `vin` must be exactly 17 ASCII bytes; see [`crate::error::ProtoError::InvalidVin`].
    pub fn personalization(mut self, vin: &str) -> Result<Self, crate::error::ProtoError> {
        let bytes = vin.as_bytes();
        if bytes.len() != 17 {
            return Err(crate::error::ProtoError::InvalidVin(vin.to_owned()));
        }
        let mut arr = [0u8; 17];
        arr.copy_from_slice(bytes);
        self.personalization = Some(arr);
        Ok(self)
    }

    pub fn epoch(mut self, v: [u8; 16]) -> Self {
        self.epoch = Some(v);
        self
    }

    pub fn expires_at(mut self, v: u32) -> Self {
        self.expires_at = Some(v);
        self
    }

    pub fn counter(mut self, v: u32) -> Self {
        self.counter = Some(v);
        self
    }

    /// Up to 16 bytes; used only on the session-info handshake challenge.
    pub fn challenge(mut self, v: &[u8]) -> Self {
        self.challenge = Some(v.to_vec());
        self
    }

    /// Omitted from the wire entirely unless `v != 0`, per §9.
    pub fn flags(mut self, v: u32) -> Self {
        self.flags = if v == 0 { None } else { Some(v) };
        self
    }

    /// Serialize to the canonical TLV byte sequence. Deterministic: identical
    /// input always yields identical bytes (§8 round-trip property).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        if let Some(v) = self.signature_type {
            push_entry(&mut out, TAG_SIGNATURE_TYPE, &[v.as_u8()]);
        }
        if let Some(v) = self.domain {
            push_entry(&mut out, TAG_DOMAIN, &[v.as_u8()]);
        }
        if let Some(v) = &self.personalization {
            push_entry(&mut out, TAG_PERSONALIZATION, v);
        }
        if let Some(v) = &self.epoch {
            push_entry(&mut out, TAG_EPOCH, v);
        }
        if let Some(v) = self.expires_at {
            push_entry(&mut out, TAG_EXPIRES_AT, &v.to_be_bytes());
        }
        if let Some(v) = self.counter {
            push_entry(&mut out, TAG_COUNTER, &v.to_be_bytes());
        }
        if let Some(v) = &self.challenge {
            push_entry(&mut out, TAG_CHALLENGE, v);
        }
        if let Some(v) = self.flags {
            push_entry(&mut out, TAG_FLAGS, &v.to_be_bytes());
        }

        out.push(TERMINATOR);
        out
    }
}

fn push_entry(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    debug_assert!(value.len() <= u8::MAX as usize, "metadata value too long for 1-byte length");
    out.push(tag);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}
