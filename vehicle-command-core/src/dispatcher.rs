//! Dispatcher: owns the transport and the session map, routes inbound
//! envelopes to waiting receivers (spec §4.F).
//!
//! Structurally grounded in the teacher's `Dispatcher`
//! (`w3b2-connector/src/dispatcher.rs`): a `tokio::select!` loop reading
//! from one inbound channel, with routing state (here, the registry) kept
//! alongside it rather than duplicated per session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use rand_core::{OsRng, RngCore};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use vehicle_command_proto::{Destination, Domain, Payload, RoutableMessage};

use crate::error::Error;
use crate::registry::{ReceiverKey, ReceiverRegistry};
use crate::session::SessionContext;
use crate::transport::Transport;

/// Owns one [`SessionContext`] per domain, the shared [`ReceiverRegistry`],
/// and the transport's inbound loop.
pub struct Dispatcher {
    vin: String,
    transport: Arc<dyn Transport>,
    sessions: HashMap<Domain, Arc<SessionContext>>,
    registry: ReceiverRegistry,
    inbound_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: CancellationToken,
    /// This dispatcher's persistent 16-byte source address (§4.F "Routing
    /// state"), generated once and shared by every domain's session.
    source_address: Vec<u8>,
    /// When this dispatcher last sent a session-info request for a domain,
    /// used to discard a reply that arrives after `allowed_latency` has
    /// elapsed (§4.E) rather than apply it as if it were fresh.
    session_info_sent_at: Mutex<HashMap<Domain, Instant>>,
}

/// Upper bound on how long the transport-level retry loop (§4.F send loop
/// step 3) keeps retrying transient errors before giving up, expressed as a
/// multiple of `retry_interval`. The vehicle or relay is assumed gone if it
/// hasn't recovered within this many retry intervals.
const MAX_RETRY_ELAPSED_INTERVALS: u32 = 8;

impl Dispatcher {
    pub fn new(vin: String, transport: Arc<dyn Transport>) -> Self {
        let mut source_address = vec![0u8; 16];
        OsRng.fill_bytes(&mut source_address);

        Self {
            vin,
            transport,
            sessions: HashMap::new(),
            registry: ReceiverRegistry::new(),
            inbound_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
            source_address,
            session_info_sent_at: Mutex::new(HashMap::new()),
        }
    }

    /// Hand `bytes` to the transport, retrying on transient transport errors
    /// with a fixed delay (§4.F send loop step 3) until one succeeds, a
    /// terminal error surfaces, or the retry budget is exhausted.
    async fn send_to_transport(&self, domain: Domain, bytes: Vec<u8>) -> Result<(), Error> {
        let retry_interval = self.transport.retry_interval();
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(retry_interval)
            .with_multiplier(1.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(Some(retry_interval * MAX_RETRY_ELAPSED_INTERVALS))
            .build();

        loop {
            match self.transport.send(domain, bytes.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_temporary() => match backoff.next_backoff() {
                    Some(delay) => {
                        tracing::warn!(?domain, error = %e, ?delay, "transient transport error, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::warn!(?domain, error = %e, "retry budget exhausted, propagating");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Register a domain this dispatcher will maintain a session for, signed
    /// with whichever [`SignatureType`] the transport prefers (§6.2).
    pub fn add_domain(&mut self, domain: Domain) {
        let signature_type = self.transport.preferred_auth_method();
        let session = SessionContext::new(domain, self.vin.clone(), signature_type, self.source_address.clone());
        self.sessions.insert(domain, Arc::new(session));
    }

    pub fn session(&self, domain: Domain) -> Option<Arc<SessionContext>> {
        self.sessions.get(&domain).cloned()
    }

    pub fn registry(&self) -> &ReceiverRegistry {
        &self.registry
    }

    /// Start the background task that reads the transport's inbound
    /// broadcast channel and routes each message to its registered
    /// receiver, or logs and drops it if nothing is waiting.
    pub async fn start(self: &Arc<Self>) {
        let mut rx = self.transport.subscribe();
        let this = Arc::clone(self);
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            tracing::info!("dispatcher inbound loop started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("dispatcher inbound loop shutting down");
                        break;
                    }
                    received = rx.recv() => {
                        match received {
                            Ok(bytes) => this.handle_inbound(bytes).await,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "dispatcher inbound loop lagged, messages were dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                tracing::error!("transport inbound channel closed, dispatcher shutting down");
                                break;
                            }
                        }
                    }
                }
            }
        });

        *self.inbound_task.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.inbound_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn handle_inbound(&self, bytes: Vec<u8>) {
        let message = match RoutableMessage::decode(&bytes) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode inbound envelope, dropping");
                return;
            }
        };

        if let Payload::SessionInfo(_) = &message.payload {
            if let Some(domain) = message_domain(&message) {
                if self.is_session_info_stale(domain).await {
                    tracing::warn!(?domain, "discarding session-info reply older than the transport's allowed latency");
                } else if let Some(session) = self.sessions.get(&domain) {
                    if let Err(e) = session.handle_session_info_reply(&message).await {
                        tracing::warn!(?domain, error = %e, "rejected session-info reply");
                    }
                }
            }
        }

        let Some(domain) = message_domain(&message) else {
            tracing::warn!("inbound message has no resolvable domain, dropping");
            return;
        };

        let key = if domain.echoes_uuid() {
            match message.request_uuid {
                Some(uuid) => ReceiverKey::Uuid { domain, request_uuid: uuid },
                None => {
                    tracing::warn!(?domain, "expected a request uuid on this domain's reply, dropping");
                    return;
                }
            }
        } else {
            match routing_address(&message) {
                Some(addr) => ReceiverKey::RoutingAddress { domain, routing_address: addr },
                None => {
                    tracing::warn!(?domain, "VCSEC reply missing a routing address, dropping");
                    return;
                }
            }
        };

        if !self.registry.route(&key, message) {
            tracing::debug!(?key, "no receiver registered for inbound message, dropping");
        }
    }

    /// Send a pre-signed command and await its reply, subject to the
    /// transport's allowed latency. Transient transport errors are retried
    /// internally (§4.F); a terminal one propagates immediately.
    ///
    /// `domain` is required rather than inferred from `message`: a VCSEC
    /// request is addressed by a freshly generated routing address with no
    /// domain of its own (§4.F), so the caller who built the message is the
    /// only one who still knows which domain it belongs to.
    pub async fn send(&self, domain: Domain, message: RoutableMessage) -> Result<RoutableMessage, Error> {
        if self.inbound_task.lock().await.is_none() {
            return Err(Error::NotConnected);
        }

        let key = if domain.echoes_uuid() {
            let uuid = message.request_uuid.ok_or(Error::SessionNotEstablished)?;
            ReceiverKey::Uuid { domain, request_uuid: uuid }
        } else {
            match &message.to_destination {
                Destination::RoutingAddress(addr) => ReceiverKey::RoutingAddress { domain, routing_address: addr.clone() },
                Destination::Domain(_) => return Err(Error::SessionNotEstablished),
            }
        };

        let mut receiver = self.registry.register(key);
        let bytes = message.encode()?;
        self.send_to_transport(domain, bytes).await?;

        let reply = tokio::time::timeout(self.transport.allowed_latency(), receiver.recv())
            .await
            .map_err(|_| Error::Timeout)?
            .ok_or(Error::TransportClosed)?;

        Error::from_reply(&reply)?;
        Ok(reply)
    }

    /// Request and await a fresh session handshake for `domain`.
    pub async fn start_session(&self, domain: Domain) -> Result<(), Error> {
        self.start_session_with_timeout(domain, Duration::from_secs(5)).await
    }

    async fn start_session_with_timeout(&self, domain: Domain, timeout: Duration) -> Result<(), Error> {
        let session = self.sessions.get(&domain).ok_or(Error::SessionNotEstablished)?;
        let request = session.request_session_info().await;
        let bytes = request.encode()?;
        self.send_to_transport(domain, bytes).await?;
        self.session_info_sent_at.lock().await.insert(domain, Instant::now());

        // `handle_inbound` applies the reply to the session directly once
        // it arrives on the transport's broadcast channel; we just wait for
        // that to happen.
        session.wait_ready(timeout).await
    }

    /// Whether an inbound session-info reply for `domain` arrived too late
    /// to trust (§4.E): no outstanding request at all counts as fresh, since
    /// this is then a proactive update rather than a delayed handshake reply.
    async fn is_session_info_stale(&self, domain: Domain) -> bool {
        match self.session_info_sent_at.lock().await.get(&domain) {
            Some(sent_at) => sent_at.elapsed() > self.transport.allowed_latency(),
            None => false,
        }
    }

    /// Start sessions for every registered domain, continuing past
    /// individual failures so one unreachable domain does not block the
    /// others.
    pub async fn start_sessions(&self) -> Vec<(Domain, Result<(), Error>)> {
        let mut results = Vec::new();
        for &domain in self.sessions.keys() {
            results.push((domain, self.start_session(domain).await));
        }
        results
    }
}

fn message_domain(message: &RoutableMessage) -> Option<Domain> {
    if let Some(Destination::Domain(d)) = &message.from_destination {
        return Some(*d);
    }
    match &message.to_destination {
        Destination::Domain(d) => Some(*d),
        Destination::RoutingAddress(_) => None,
    }
}

fn routing_address(message: &RoutableMessage) -> Option<Vec<u8>> {
    match &message.from_destination {
        Some(Destination::RoutingAddress(addr)) => Some(addr.clone()),
        _ => match &message.to_destination {
            Destination::RoutingAddress(addr) => Some(addr.clone()),
            _ => None,
        },
    }
}
