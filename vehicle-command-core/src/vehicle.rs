//! Vehicle façade: the public entry point a caller uses to talk to one
//! vehicle (spec §4.H).

use std::sync::Arc;
use std::time::Duration;

use vehicle_command_proto::{Domain, Payload, RoutableMessage};

use crate::cache::SessionCache;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::transport::Transport;

/// Domains this facade maintains sessions for by default.
const DEFAULT_DOMAINS: [Domain; 2] = [Domain::Vcsec, Domain::Infotainment];

/// Time-to-live applied to commands sent through [`Vehicle::execute`]. A
/// caller that needs a different TTL should use [`Vehicle::send_command`]
/// directly.
const DEFAULT_COMMAND_TTL: Duration = Duration::from_secs(5);

/// Which domain an opaque command payload belongs to. The payload catalog
/// itself is out of scope for this crate, so callers that know a command's
/// name (e.g. the HTTP proxy) classify it themselves rather than having
/// `execute` try to infer it from the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// VCSEC commands: locks, trunk, alarm, key management.
    Keychain,
    /// Infotainment commands: climate, media, everything else.
    Vehicle,
}

impl CommandKind {
    fn domain(self) -> Domain {
        match self {
            CommandKind::Keychain => Domain::Vcsec,
            CommandKind::Vehicle => Domain::Infotainment,
        }
    }
}

/// High-level handle to a single vehicle, bundling its dispatcher and
/// (optional) session cache.
pub struct Vehicle {
    vin: String,
    dispatcher: Arc<Dispatcher>,
    cache: Option<Arc<SessionCache>>,
}

impl Vehicle {
    /// Build a facade with sessions for VCSEC and Infotainment, the two
    /// domains every command-capable vehicle exposes.
    pub fn new(vin: String, transport: Arc<dyn Transport>) -> Self {
        let mut dispatcher = Dispatcher::new(vin.clone(), transport);
        for domain in DEFAULT_DOMAINS {
            dispatcher.add_domain(domain);
        }
        Self { vin, dispatcher: Arc::new(dispatcher), cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Start the dispatcher's inbound loop. Must be called before any
    /// command or session can be sent.
    pub async fn start(&self) {
        self.dispatcher.start().await;
    }

    pub async fn stop(&self) {
        self.dispatcher.stop().await;
    }

    /// Load any cached session state for every known domain, skipping a
    /// fresh handshake where the cache has something usable.
    pub async fn load_cache(&self) -> Result<(), Error> {
        let Some(cache) = &self.cache else { return Ok(()) };
        for domain in DEFAULT_DOMAINS {
            if let Some(blob) = cache.get(&self.vin, domain)? {
                if let Some(session) = self.dispatcher.session(domain) {
                    if let Err(e) = session.import(&blob).await {
                        tracing::warn!(?domain, error = %e, "failed to import cached session, will re-handshake");
                    }
                }
            }
        }
        Ok(())
    }

    /// Persist every ready domain's session state to the cache.
    pub async fn save_cache(&self) -> Result<(), Error> {
        let Some(cache) = &self.cache else { return Ok(()) };
        for domain in DEFAULT_DOMAINS {
            if let Some(session) = self.dispatcher.session(domain) {
                if let Some(blob) = session.export().await {
                    cache.put(&self.vin, domain, &blob)?;
                }
            }
        }
        cache.flush().await
    }

    /// Establish (or refresh) sessions for every domain, tolerating
    /// individual domain failures (e.g. a vehicle asleep on BLE but
    /// reachable over the relay for Infotainment only).
    pub async fn connect(&self) -> Vec<(Domain, Result<(), Error>)> {
        self.dispatcher.start_sessions().await
    }

    /// Send an opaque command payload to `domain` and await its reply,
    /// retrying once on a retriable vehicle fault after requesting a fresh
    /// session-info update, per §7.
    pub async fn send_command(&self, domain: Domain, payload: &[u8], ttl: Duration) -> Result<RoutableMessage, Error> {
        let session = self.dispatcher.session(domain).ok_or(Error::SessionNotEstablished)?;
        if !session.is_ready().await {
            self.dispatcher.start_session(domain).await?;
        }

        let message = session.sign_command(payload, ttl).await?;
        match self.dispatcher.send(domain, message).await {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_retriable_fault() => {
                tracing::warn!(?domain, error = %e, "retriable fault, refreshing session and retrying once");
                session.invalidate().await;
                self.dispatcher.start_session(domain).await?;
                let retried = session.sign_command(payload, ttl).await?;
                self.dispatcher.send(domain, retried).await
            }
            Err(e) => Err(e),
        }
    }

    /// Low-level escape hatch: send a pre-built, already-signed message for
    /// `domain`.
    pub async fn send_raw(&self, domain: Domain, message: RoutableMessage) -> Result<RoutableMessage, Error> {
        self.dispatcher.send(domain, message).await
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    /// Send a command, classified by `kind`, and return its raw reply
    /// payload (§4.H). A vehicle-reported fault or app-layer rejection
    /// (§7 "Nominal error") on a [`CommandKind::Keychain`] command is
    /// reported as [`Error::Keychain`], distinguishing a VCSEC rejection
    /// from an Infotainment one for callers that handle the two
    /// differently (e.g. the HTTP proxy's status mapping).
    pub async fn execute(&self, kind: CommandKind, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let domain = kind.domain();
        let reply = match self.send_command(domain, payload, DEFAULT_COMMAND_TTL).await {
            Err(Error::OtherFault(code)) if kind == CommandKind::Keychain => return Err(Error::Keychain(code)),
            other => other?,
        };
        match reply.payload {
            Payload::Command(bytes) => Ok(bytes),
            _ => Err(Error::BadResponse),
        }
    }

    /// Force a fresh session-info handshake for `domain`, e.g. to probe
    /// whether a vehicle is reachable without sending a command (§4.H).
    pub async fn session_info(&self, domain: Domain) -> Result<(), Error> {
        let session = self.dispatcher.session(domain).ok_or(Error::SessionNotEstablished)?;
        session.invalidate().await;
        self.dispatcher.start_session(domain).await
    }
}
