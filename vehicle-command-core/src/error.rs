//! Error taxonomy (spec §7).
//!
//! Every error carries two independent axes: `may_succeed` (would an
//! unmodified resend of this exact request ever succeed) and `temporary`
//! (is the condition expected to clear on its own). `should_retry` combines
//! them per the formula in §7: `!may_succeed && temporary`.

use thiserror::Error;
use vehicle_command_proto::{FaultCode, RoutableMessage};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no session established for this domain")]
    SessionNotEstablished,

    #[error("vehicle reported busy")]
    Busy,

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("command authentication tag was rejected")]
    InvalidSignature,

    #[error("anti-replay token or counter rejected")]
    InvalidTokenOrCounter,

    #[error("vehicle reported an internal error")]
    VehicleInternal,

    #[error("session epoch mismatch, a proactive session-info update is required")]
    IncorrectEpoch,

    #[error("command's expiration time has already passed")]
    TimeExpired,

    #[error("command's time-to-live exceeds the protocol maximum")]
    TimeToLiveTooLong,

    #[error("vehicle has no record of this client's public key")]
    KeyNotPaired,

    #[error("vehicle-reported fault code {0:?} without a dedicated variant")]
    OtherFault(FaultCode),

    #[error("transport closed before a reply arrived")]
    TransportClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("dispatcher is not connected")]
    NotConnected,

    #[error("vehicle reply did not match the expected shape")]
    BadResponse,

    #[error("relay reports this vehicle does not support this protocol")]
    ProtocolNotSupported,

    #[error("vehicle rejected the command at the application layer: {0}")]
    Nominal(String),

    #[error("keychain command rejected with fault code {0:?}")]
    Keychain(FaultCode),

    #[error(transparent)]
    Crypto(#[from] vehicle_command_crypto::CryptoError),

    #[error(transparent)]
    Proto(#[from] vehicle_command_proto::ProtoError),

    #[error("session cache error: {0}")]
    Cache(#[from] sled::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// From a vehicle-reported [`FaultCode`].
    pub fn from_fault_code(code: FaultCode) -> Self {
        match code {
            FaultCode::Busy => Error::Busy,
            FaultCode::Timeout => Error::Timeout,
            FaultCode::InvalidSignature => Error::InvalidSignature,
            FaultCode::InvalidTokenOrCounter => Error::InvalidTokenOrCounter,
            FaultCode::Internal => Error::VehicleInternal,
            FaultCode::IncorrectEpoch => Error::IncorrectEpoch,
            FaultCode::TimeExpired => Error::TimeExpired,
            FaultCode::TimeToLiveTooLong => Error::TimeToLiveTooLong,
            FaultCode::KeyNotPaired => Error::KeyNotPaired,
            other @ FaultCode::Other(_) => Error::OtherFault(other),
        }
    }

    /// Could an unmodified resend of the same request ever succeed?
    pub fn may_succeed(&self) -> bool {
        match self {
            Error::Busy
            | Error::Timeout
            | Error::InvalidSignature
            | Error::InvalidTokenOrCounter
            | Error::VehicleInternal
            | Error::IncorrectEpoch
            | Error::TransportClosed
            | Error::Transport(_) => true,
            Error::TimeExpired
            | Error::TimeToLiveTooLong
            | Error::KeyNotPaired
            | Error::OtherFault(_)
            | Error::SessionNotEstablished
            | Error::Cancelled
            | Error::Crypto(_)
            | Error::Proto(_)
            | Error::Cache(_)
            | Error::Config(_)
            | Error::NotConnected
            | Error::BadResponse
            | Error::ProtocolNotSupported
            | Error::Nominal(_)
            | Error::Keychain(_) => false,
        }
    }

    /// Is this condition expected to clear on its own, without caller action?
    pub fn is_temporary(&self) -> bool {
        match self {
            Error::Busy
            | Error::Timeout
            | Error::IncorrectEpoch
            | Error::TransportClosed
            | Error::Transport(_)
            | Error::SessionNotEstablished => true,
            Error::InvalidSignature
            | Error::InvalidTokenOrCounter
            | Error::VehicleInternal
            | Error::TimeExpired
            | Error::TimeToLiveTooLong
            | Error::KeyNotPaired
            | Error::OtherFault(_)
            | Error::Cancelled
            | Error::Crypto(_)
            | Error::Proto(_)
            | Error::Cache(_)
            | Error::Config(_)
            | Error::NotConnected
            | Error::BadResponse
            | Error::ProtocolNotSupported
            | Error::Nominal(_)
            | Error::Keychain(_) => false,
        }
    }

    /// `ShouldRetry(e) = !e.may_succeed && e.temporary`, per §7.
    pub fn should_retry(&self) -> bool {
        !self.may_succeed() && self.is_temporary()
    }

    /// Interpret a reply's `fault_code`/`result` fields (§7): a protocol-level
    /// fault takes precedence, then an explicit app-layer rejection
    /// ("Nominal error"), otherwise the reply is a plain success.
    pub fn from_reply(reply: &RoutableMessage) -> Result<(), Self> {
        if let Some(code) = reply.fault_code {
            return Err(Self::from_fault_code(code));
        }
        if reply.result == Some(false) {
            return Err(Error::Nominal(reply.reason.clone().unwrap_or_default()));
        }
        Ok(())
    }

    /// Retriable per the vehicle-reported fault-code set of §7 (used by the
    /// session layer to decide whether to request a proactive session-info
    /// update before giving up).
    pub fn is_retriable_fault(&self) -> bool {
        match self {
            Error::Busy
            | Error::Timeout
            | Error::InvalidSignature
            | Error::InvalidTokenOrCounter
            | Error::VehicleInternal
            | Error::IncorrectEpoch
            | Error::TimeExpired
            | Error::TimeToLiveTooLong => true,
            Error::OtherFault(code) => code.is_retriable(),
            _ => false,
        }
    }
}
