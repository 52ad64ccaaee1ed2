//! Domain, signature-type and status/fault enums (spec §3, §4.A, §7).

use serde::{Deserialize, Serialize};

/// A vehicle subsystem with its own public key and session.
///
/// Discriminants match the wire values used by the authenticated metadata
/// block's `DOMAIN` tag — they are not arbitrary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Domain {
    Broadcast = 0,
    Vcsec = 2,
    Infotainment = 3,
}

impl Domain {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Domain::Broadcast),
            2 => Some(Domain::Vcsec),
            3 => Some(Domain::Infotainment),
            _ => None,
        }
    }

    /// VCSEC does not echo request UUIDs back to the caller, so routing for
    /// it is keyed on `(domain, routing_address)` alone (§4.F).
    pub const fn echoes_uuid(self) -> bool {
        !matches!(self, Domain::Vcsec)
    }
}

/// Authenticated-metadata `SIGNATURE_TYPE` values (§4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignatureType {
    AesGcm = 0,
    AesGcmPersonalized = 5,
    Hmac = 6,
    HmacPersonalized = 8,
}

impl SignatureType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// High-level outcome of a round-trip with the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Ok,
    Wait,
    Error,
}

/// Protocol-layer fault codes the vehicle can report in a `RoutableMessage`.
///
/// The retriable set is exactly the one enumerated in spec §7: each can be
/// resolved by a proactive session-info update followed by a re-send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    Busy,
    Timeout,
    InvalidSignature,
    InvalidTokenOrCounter,
    Internal,
    IncorrectEpoch,
    TimeExpired,
    TimeToLiveTooLong,
    KeyNotPaired,
    /// Any fault code the protocol defines that this implementation does not
    /// give a dedicated variant to. Always terminal (never retried).
    Other(u16),
}

impl FaultCode {
    pub const fn is_retriable(self) -> bool {
        matches!(
            self,
            FaultCode::Busy
                | FaultCode::Timeout
                | FaultCode::InvalidSignature
                | FaultCode::InvalidTokenOrCounter
                | FaultCode::Internal
                | FaultCode::IncorrectEpoch
                | FaultCode::TimeExpired
                | FaultCode::TimeToLiveTooLong
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_roundtrips_wire_value() {
        assert_eq!(Domain::Infotainment.as_u8(), 3);
        assert_eq!(Domain::from_u8(3), Some(Domain::Infotainment));
        assert_eq!(Domain::Vcsec.as_u8(), 2);
        assert_eq!(Domain::from_u8(1), None);
    }

    #[test]
    fn only_vcsec_skips_uuid_routing() {
        assert!(!Domain::Vcsec.echoes_uuid());
        assert!(Domain::Infotainment.echoes_uuid());
        assert!(Domain::Broadcast.echoes_uuid());
    }

    #[test]
    fn fault_code_retriable_set_matches_spec() {
        assert!(FaultCode::Busy.is_retriable());
        assert!(FaultCode::IncorrectEpoch.is_retriable());
        assert!(!FaultCode::KeyNotPaired.is_retriable());
        assert!(!FaultCode::Other(9999).is_retriable());
    }
}
