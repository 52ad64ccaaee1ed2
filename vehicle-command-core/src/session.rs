//! Per-domain session state: handshake, epoch/counter tracking, and command
//! signing (spec §4.C).
//!
//! A session is scoped to one vehicle domain (VCSEC, Infotainment, ...). Its
//! state lives behind a single [`tokio::sync::Mutex`] so handshake and
//! signing never race against each other for the same domain; independent
//! domains get independent [`SessionContext`]s and never share this lock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use vehicle_command_crypto::{self as crypto, KeyPair, SharedKey};
use vehicle_command_proto::{
    domain::SignatureType, Destination, Domain, MetadataBuilder, Payload, RoutableMessage, SessionInfo,
    SignatureData,
};

use crate::error::Error;

/// The subset of [`Inner`] worth persisting to the session cache (§6.4):
/// enough to skip a fresh handshake on the next process start, without
/// carrying the now-useless ephemeral private key.
#[derive(Serialize, Deserialize)]
struct PersistedSession {
    shared_key: [u8; 16],
    epoch: [u8; 16],
    counter: u32,
    clock_offset: i64,
    vehicle_pub: Vec<u8>,
    handle: u64,
    last_clock_time: u32,
}

/// Longest time-to-live this client will ever request for a command. The
/// vehicle enforces its own, generally shorter, maximum and reports
/// [`vehicle_command_proto::FaultCode::TimeToLiveTooLong`] if exceeded.
pub const MAX_COMMAND_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No handshake has completed yet, or the last one was invalidated.
    Unestablished,
    Ready,
}

struct Inner {
    state: State,
    keypair: Option<KeyPair>,
    shared_key: Option<SharedKey>,
    epoch: [u8; 16],
    /// Next counter value this client will use; advances on every signed
    /// command (§4.C anti-replay).
    counter: u32,
    /// `vehicle_clock_time - our_unix_time` captured at the last successful
    /// handshake, used to translate our wall clock into the vehicle's.
    clock_offset: i64,
    /// 16-byte challenge bound into the outstanding handshake request, if
    /// any. Set by [`SessionContext::request_session_info`], cleared once
    /// its matching reply is applied; distinguishes a handshake reply from
    /// an unsolicited, proactive session-info update (§4.C).
    pending_challenge: Option<[u8; 16]>,
    /// The vehicle's ephemeral public key from the last completed
    /// handshake. A later session-info update presenting a different key
    /// poisons the session rather than being adopted (§3, §4.C failure
    /// semantics).
    vehicle_pub: Option<Vec<u8>>,
    /// Opaque session identifier the vehicle assigned at handshake time,
    /// carried through the session cache (§6.4).
    handle: u64,
    /// Vehicle clock time from the last accepted session-info, used to
    /// detect the clock going backward within the same epoch (§3).
    last_clock_time: u32,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: State::Unestablished,
            keypair: None,
            shared_key: None,
            epoch: [0u8; 16],
            counter: 0,
            clock_offset: 0,
            pending_challenge: None,
            vehicle_pub: None,
            handle: 0,
            last_clock_time: 0,
        }
    }
}

/// Session state for one vehicle domain.
pub struct SessionContext {
    domain: Domain,
    vin: String,
    signature_type: SignatureType,
    /// The dispatcher's persistent 16-byte source address (§4.F "Routing
    /// state"), shared by every domain's session, stamped as `from_destination`
    /// on every outbound message so the vehicle has a return address.
    source_address: Vec<u8>,
    inner: Mutex<Inner>,
    ready_notify: Notify,
}

impl SessionContext {
    pub fn new(domain: Domain, vin: String, signature_type: SignatureType, source_address: Vec<u8>) -> Self {
        Self {
            domain,
            vin,
            signature_type,
            source_address,
            inner: Mutex::new(Inner::default()),
            ready_notify: Notify::new(),
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.lock().await.state == State::Ready
    }

    /// Block until this session becomes ready, or `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), Error> {
        tokio::time::timeout(timeout, async {
            loop {
                if self.is_ready().await {
                    return;
                }
                self.ready_notify.notified().await;
            }
        })
        .await
        .map_err(|_| Error::Timeout)
    }

    /// Build the (unauthenticated) request that starts or refreshes this
    /// session's handshake, generating a fresh ephemeral key pair and a
    /// fresh 16-byte challenge that the reply's verification tag must bind
    /// (§4.C steps 1 and 3).
    pub async fn request_session_info(&self) -> RoutableMessage {
        let keypair = KeyPair::generate();
        let public_key = keypair.public_key_bytes();

        let mut challenge = [0u8; 16];
        OsRng.fill_bytes(&mut challenge);

        let mut inner = self.inner.lock().await;
        inner.keypair = Some(keypair);
        inner.state = State::Unestablished;
        inner.pending_challenge = Some(challenge);
        drop(inner);

        RoutableMessage::new(Destination::Domain(self.domain), Payload::SessionInfoRequest { public_key })
            .with_request_uuid(challenge)
            .with_source_address(self.source_address.clone())
    }

    /// Process an inbound `SessionInfo`, whether it answers our own
    /// handshake request or arrives unprompted (§4.C "inbound session-info
    /// handling"). The two are told apart by whether the reply's request
    /// UUID matches the challenge we're still waiting on.
    pub async fn handle_session_info_reply(&self, msg: &RoutableMessage) -> Result<(), Error> {
        let (info, signature) = match (&msg.payload, &msg.signature_data) {
            (Payload::SessionInfo(info), Some(sig)) => (info, sig),
            (Payload::SessionInfo(_), None) => return Err(Error::InvalidSignature),
            _ => return Err(Error::Proto(vehicle_command_proto::ProtoError::UnknownTag(0))),
        };
        let challenge = msg.request_uuid.ok_or(Error::InvalidSignature)?;

        let mut inner = self.inner.lock().await;
        let is_handshake = inner.pending_challenge == Some(challenge);

        let result = if is_handshake {
            self.apply_handshake(&mut inner, info, signature, challenge)
        } else {
            self.apply_proactive_update(&mut inner, info, signature, challenge)
        };
        drop(inner);

        if result.is_ok() {
            self.ready_notify.notify_waiters();
            tracing::info!(domain = ?self.domain, is_handshake, "session info applied");
        }
        result
    }

    /// Complete a handshake this session itself started: verify the tag,
    /// derive the shared key, and adopt the vehicle's epoch/counter/clock
    /// and public key unconditionally.
    fn apply_handshake(
        &self,
        inner: &mut Inner,
        info: &SessionInfo,
        signature: &SignatureData,
        challenge: [u8; 16],
    ) -> Result<(), Error> {
        let keypair = inner.keypair.take().ok_or(Error::SessionNotEstablished)?;
        let shared_key = keypair.shared_key(&info.public_key)?;

        let info_bytes = info.encode()?;
        verify_session_info_tag(&shared_key, signature, &self.vin, &challenge, &info_bytes)?;

        let our_now = unix_now();
        inner.shared_key = Some(shared_key);
        inner.epoch = info.epoch;
        inner.counter = info.counter;
        inner.clock_offset = info.clock_time as i64 - our_now as i64;
        inner.last_clock_time = info.clock_time;
        inner.vehicle_pub = Some(info.public_key.clone());
        inner.handle = info.handle;
        inner.state = State::Ready;
        inner.keypair = Some(keypair);
        inner.pending_challenge = None;
        Ok(())
    }

    /// Inbound session-info the vehicle sends without a matching request,
    /// e.g. after it rotates its epoch on its own (§4.C, §4.E). Adopts the
    /// new counter only if the epoch changed or it does not fall below the
    /// current floor, and poisons the session (forces a fresh handshake) if
    /// the vehicle's public key changed or its clock moved backward within
    /// the same epoch (§3, Invariant #3).
    fn apply_proactive_update(
        &self,
        inner: &mut Inner,
        info: &SessionInfo,
        signature: &SignatureData,
        challenge: [u8; 16],
    ) -> Result<(), Error> {
        if inner.state != State::Ready {
            return Err(Error::SessionNotEstablished);
        }
        let shared_key = inner.shared_key.as_ref().ok_or(Error::SessionNotEstablished)?;
        let info_bytes = info.encode()?;
        verify_session_info_tag(shared_key, signature, &self.vin, &challenge, &info_bytes)?;

        if inner.vehicle_pub.as_deref() != Some(info.public_key.as_slice()) {
            inner.state = State::Unestablished;
            tracing::warn!(domain = ?self.domain, "vehicle public key changed on a proactive session-info update, session poisoned");
            return Err(Error::InvalidSignature);
        }

        let epoch_changed = info.epoch != inner.epoch;
        if !epoch_changed && info.clock_time < inner.last_clock_time {
            inner.state = State::Unestablished;
            tracing::warn!(domain = ?self.domain, "vehicle clock moved backward within the current epoch, session invalidated");
            return Err(Error::IncorrectEpoch);
        }

        if epoch_changed || info.counter >= inner.counter {
            inner.counter = info.counter;
        } else {
            tracing::debug!(domain = ?self.domain, "proactive session-info update counter below floor, keeping current counter");
        }

        inner.epoch = info.epoch;
        inner.last_clock_time = info.clock_time;
        let our_now = unix_now();
        inner.clock_offset = info.clock_time as i64 - our_now as i64;
        Ok(())
    }

    /// Serialize this session's state for the session cache (§6.4). Returns
    /// `None` if no handshake has completed yet.
    pub async fn export(&self) -> Option<Vec<u8>> {
        let inner = self.inner.lock().await;
        if inner.state != State::Ready {
            return None;
        }
        let persisted = PersistedSession {
            shared_key: *inner.shared_key.as_ref()?.as_bytes(),
            epoch: inner.epoch,
            counter: inner.counter,
            clock_offset: inner.clock_offset,
            vehicle_pub: inner.vehicle_pub.clone()?,
            handle: inner.handle,
            last_clock_time: inner.last_clock_time,
        };
        bincode::serde::encode_to_vec(&persisted, bincode::config::standard()).ok()
    }

    /// Restore state previously produced by [`export`](Self::export),
    /// skipping a fresh handshake.
    pub async fn import(&self, bytes: &[u8]) -> Result<(), Error> {
        let (persisted, _): (PersistedSession, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(vehicle_command_proto::ProtoError::from)?;

        let mut inner = self.inner.lock().await;
        inner.shared_key = Some(SharedKey::from_bytes(persisted.shared_key));
        inner.epoch = persisted.epoch;
        inner.counter = persisted.counter;
        inner.clock_offset = persisted.clock_offset;
        inner.vehicle_pub = Some(persisted.vehicle_pub);
        inner.handle = persisted.handle;
        inner.last_clock_time = persisted.last_clock_time;
        inner.state = State::Ready;
        Ok(())
    }

    /// Forces a re-handshake on the next [`request_session_info`] call,
    /// e.g. after receiving [`vehicle_command_proto::FaultCode::IncorrectEpoch`].
    pub async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = State::Unestablished;
        tracing::warn!(domain = ?self.domain, "session invalidated");
    }

    /// Sign and wrap `payload` for transmission. Advances the local replay
    /// counter on every call, including failed ones that still consumed a
    /// counter value — the protocol requires strictly increasing counters,
    /// not gap-free ones.
    pub async fn sign_command(&self, payload: &[u8], ttl: Duration) -> Result<RoutableMessage, Error> {
        let ttl = ttl.min(MAX_COMMAND_TTL);
        let mut inner = self.inner.lock().await;
        if inner.state != State::Ready {
            return Err(Error::SessionNotEstablished);
        }
        let shared_key = inner.shared_key.as_ref().ok_or(Error::SessionNotEstablished)?;
        let counter = inner.counter;
        inner.counter = inner.counter.wrapping_add(1);

        let expires_at = (unix_now() as i64 + inner.clock_offset + ttl.as_secs() as i64) as u32;
        let epoch = inner.epoch;

        let metadata = MetadataBuilder::new()
            .signature_type(self.signature_type)
            .domain(self.domain)
            .personalization(&self.vin)?
            .epoch(epoch)
            .expires_at(expires_at)
            .counter(counter)
            .encode();

        let signature_data = match self.signature_type {
            SignatureType::Hmac | SignatureType::HmacPersonalized => {
                let subkey = crypto::command_subkey(shared_key);
                let tag = crypto::hmac_tag(&subkey, &metadata, payload);
                SignatureData::Hmac { metadata, tag }
            }
            SignatureType::AesGcm | SignatureType::AesGcmPersonalized => {
                let nonce = crypto::aesgcm::generate_nonce();
                let mut ciphertext = payload.to_vec();
                let tag = crypto::aesgcm::seal(shared_key, &nonce, &metadata, &mut ciphertext)?;
                return Ok(self
                    .outbound_envelope(Payload::Command(ciphertext))
                    .with_signature(SignatureData::AesGcm { metadata, nonce, tag }));
            }
        };

        Ok(self.outbound_envelope(Payload::Command(payload.to_vec())).with_signature(signature_data))
    }

    /// Addresses a fresh outbound message the way this domain expects
    /// replies to be matched (§4.F): VCSEC gets a freshly generated routing
    /// address per message since it never echoes the request UUID, every
    /// other domain gets a fresh UUID addressed by domain. Every message
    /// also carries the dispatcher's persistent source address so the
    /// vehicle has a return address for proactive session-info updates.
    fn outbound_envelope(&self, payload: Payload) -> RoutableMessage {
        let message = if self.domain.echoes_uuid() {
            let mut uuid = [0u8; 16];
            OsRng.fill_bytes(&mut uuid);
            RoutableMessage::new(Destination::Domain(self.domain), payload).with_request_uuid(uuid)
        } else {
            let mut routing_address = vec![0u8; 16];
            OsRng.fill_bytes(&mut routing_address);
            RoutableMessage::new(Destination::RoutingAddress(routing_address), payload)
        };
        message.with_source_address(self.source_address.clone())
    }
}

/// Build the metadata block a session-info tag is computed over (§4.C step
/// 3): `SIGNATURE_TYPE=HMAC`, `PERSONALIZATION=VIN`, `CHALLENGE=request
/// UUID`. Built locally by the verifier rather than trusted off the wire —
/// see [`verify_session_info_tag`].
fn build_session_info_metadata(vin: &str, challenge: &[u8; 16]) -> Result<Vec<u8>, Error> {
    Ok(MetadataBuilder::new().signature_type(SignatureType::Hmac).personalization(vin)?.challenge(challenge).encode())
}

/// Verify a `SessionInfo` reply's HMAC tag. The metadata block is built
/// locally from `vin` and `challenge` rather than trusted from the wire: a
/// party that could forge the metadata could otherwise bind the tag to a
/// VIN or challenge of its own choosing.
fn verify_session_info_tag(
    shared_key: &SharedKey,
    signature: &SignatureData,
    vin: &str,
    challenge: &[u8; 16],
    info_bytes: &[u8],
) -> Result<(), Error> {
    match signature {
        SignatureData::Hmac { tag, .. } => {
            let metadata = build_session_info_metadata(vin, challenge)?;
            let subkey = crypto::session_info_subkey(shared_key);
            let expected = crypto::hmac_tag(&subkey, &metadata, info_bytes);
            if crypto::tags_equal(&expected, tag) {
                Ok(())
            } else {
                Err(Error::InvalidSignature)
            }
        }
        SignatureData::AesGcm { .. } => {
            // Session-info handshakes are always HMAC-signed; an AES-GCM
            // tag here means the vehicle and client disagree about mode.
            Err(Error::InvalidSignature)
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
