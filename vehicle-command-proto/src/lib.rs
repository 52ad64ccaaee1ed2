//! Wire types and the authenticated-metadata TLV codec for the vehicle
//! command protocol.

pub mod domain;
pub mod envelope;
pub mod error;
pub mod metadata;

pub use domain::{Domain, FaultCode, OperationStatus, SignatureType};
pub use envelope::{Destination, Payload, RoutableMessage, SessionInfo, SignatureData};
pub use error::ProtoError;
pub use metadata::MetadataBuilder;
