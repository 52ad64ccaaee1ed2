//! Transport abstraction over BLE and the HTTPS Fleet API relay (spec §6.1, §6.2).
//!
//! A [`Transport`] only moves opaque envelope bytes; it knows nothing about
//! sessions, domains as addressable keys beyond framing, or commands.
//! Inbound bytes (replies and unsolicited pushes alike) are published on a
//! broadcast channel so the dispatcher can route them independently of
//! whichever `send` call triggered them — this is what lets S5 (a reordered
//! reply) and unsolicited VCSEC broadcasts both flow through the same path.

pub mod ble;
pub mod https;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use vehicle_command_proto::{domain::SignatureType, Domain};

use crate::error::Error;

/// Capacity of the inbound broadcast channel. Generous enough that a slow
/// dispatcher loop iteration does not immediately lag out receivers.
pub const INBOUND_CHANNEL_CAPACITY: usize = 64;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a raw envelope to `domain`. Does not wait for a reply; the
    /// caller observes replies via [`subscribe`](Transport::subscribe).
    async fn send(&self, domain: Domain, bytes: Vec<u8>) -> Result<(), Error>;

    /// Subscribe to inbound envelope bytes. Each call returns an independent
    /// receiver; messages delivered before a given `subscribe` call are not
    /// replayed to it.
    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>>;

    /// Maximum time a round trip through this transport is allowed to take
    /// before the caller should give up and report [`Error::Timeout`].
    /// Runtime-tunable per the owning config, not a compile-time constant.
    fn allowed_latency(&self) -> Duration;

    /// Authentication scheme this transport expects the dispatcher to sign
    /// outbound commands with (§6.2): HMAC over the relay, AES-GCM over BLE.
    fn preferred_auth_method(&self) -> SignatureType;

    /// Fixed back-off interval this transport recommends between retries of
    /// an unanswered request (§6.2, §7).
    fn retry_interval(&self) -> Duration;
}
