//! Envelope types exchanged with a vehicle (spec §3, §4.F).
//!
//! The real protocol's envelope encoding is defined by schema files outside
//! this crate's scope (§1, §6.1). These types capture the same fields and are
//! serialized with `serde` + `bincode` rather than a reproduced binary schema
//! — see `SPEC_FULL.md`'s Open Questions section for the reasoning.

use serde::{Deserialize, Serialize};

use crate::domain::{Domain, FaultCode, OperationStatus};

/// Where a [`RoutableMessage`] is headed, or where it came from.
///
/// VCSEC does not echo the request UUID, so replies from it are matched on
/// `RoutingAddress` alone (§4.F); other domains are addressed by `Domain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    Domain(Domain),
    RoutingAddress(Vec<u8>),
}

/// The authenticated command or session-info body carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque command bytes; the catalog of individual commands is out of
    /// scope (§1) and this crate never inspects the contents.
    Command(Vec<u8>),
    /// A client's request to (re-)establish a session, carrying its
    /// ephemeral public key.
    SessionInfoRequest { public_key: Vec<u8> },
    /// A session handshake response, see [`SessionInfo`].
    SessionInfo(SessionInfo),
}

/// The two signature schemes a command can be authenticated with (§4.A, §4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureData {
    Hmac { metadata: Vec<u8>, tag: [u8; 32] },
    AesGcm { metadata: Vec<u8>, nonce: [u8; 12], tag: [u8; 16] },
}

/// A message sent to, or received from, a vehicle domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutableMessage {
    pub to_destination: Destination,
    pub from_destination: Option<Destination>,
    pub payload: Payload,
    pub signature_data: Option<SignatureData>,
    /// Echoed back by every domain except VCSEC (§4.F).
    pub request_uuid: Option<[u8; 16]>,
    pub fault_code: Option<FaultCode>,
    /// App-layer outcome of a command the vehicle otherwise accepted and
    /// processed end to end (§7 "Nominal error", e.g. "not in park"). `None`
    /// when the reply carries no opinion of its own (requests, and most
    /// protocol-level faults, which use `fault_code` instead).
    pub result: Option<bool>,
    /// Human-readable reason accompanying `result == Some(false)`.
    pub reason: Option<String>,
}

impl RoutableMessage {
    pub fn new(to: Destination, payload: Payload) -> Self {
        Self {
            to_destination: to,
            from_destination: None,
            payload,
            signature_data: None,
            request_uuid: None,
            fault_code: None,
            result: None,
            reason: None,
        }
    }

    /// Stamp an app-layer outcome on a reply (§7 "Nominal error").
    pub fn with_result(mut self, result: bool, reason: Option<String>) -> Self {
        self.result = Some(result);
        self.reason = reason;
        self
    }

    pub fn with_request_uuid(mut self, uuid: [u8; 16]) -> Self {
        self.request_uuid = Some(uuid);
        self
    }

    /// Stamp this message's source address (§4.F), the dispatcher's
    /// persistent return address that the vehicle echoes back.
    pub fn with_source_address(mut self, address: Vec<u8>) -> Self {
        self.from_destination = Some(Destination::RoutingAddress(address));
        self
    }

    pub fn with_signature(mut self, sig: SignatureData) -> Self {
        self.signature_data = Some(sig);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, crate::error::ProtoError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::ProtoError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(msg)
    }
}

/// The vehicle's handshake reply establishing (or refreshing) a session (§4.C).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// The vehicle's ephemeral P-256 public key, uncompressed SEC1 form.
    pub public_key: Vec<u8>,
    pub epoch: [u8; 16],
    pub counter: u32,
    /// Vehicle's clock at handshake time, seconds since its own epoch.
    pub clock_time: u32,
    pub status: OperationStatus,
    /// Opaque session identifier the vehicle assigns at handshake time,
    /// persisted across restarts alongside the shared key (§6.4).
    pub handle: u64,
}

impl SessionInfo {
    pub fn encode(&self) -> Result<Vec<u8>, crate::error::ProtoError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::ProtoError> {
        let (info, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(info)
    }
}
