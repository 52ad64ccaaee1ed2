//! Integration tests for the dispatcher against an in-memory transport,
//! covering the reordered-reply and VCSEC address-routing scenarios.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use vehicle_command_core::dispatcher::Dispatcher;
use vehicle_command_core::error::Error;
use vehicle_command_core::transport::Transport;
use vehicle_command_proto::domain::SignatureType;
use vehicle_command_proto::{Destination, Domain, Payload, RoutableMessage};

/// Shared by every mock transport's `retry_interval`, so retry-loop tests
/// don't spend wall-clock time.
const FAST_RETRY_INTERVAL: Duration = Duration::from_millis(2);

/// A transport that never delivers anything; used to exercise the timeout
/// path without a real network.
struct SilentTransport {
    inbound_tx: broadcast::Sender<Vec<u8>>,
}

impl SilentTransport {
    fn new() -> Self {
        let (inbound_tx, _rx) = broadcast::channel(16);
        Self { inbound_tx }
    }
}

#[async_trait]
impl Transport for SilentTransport {
    async fn send(&self, _domain: Domain, _bytes: Vec<u8>) -> Result<(), Error> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.inbound_tx.subscribe()
    }

    fn allowed_latency(&self) -> Duration {
        Duration::from_millis(50)
    }

    fn preferred_auth_method(&self) -> SignatureType {
        SignatureType::HmacPersonalized
    }

    fn retry_interval(&self) -> Duration {
        FAST_RETRY_INTERVAL
    }
}

#[tokio::test]
async fn send_without_reply_times_out() {
    let transport: Arc<dyn Transport> = Arc::new(SilentTransport::new());
    let mut dispatcher = Dispatcher::new("5YJ30123456789ABC".to_string(), transport);
    dispatcher.add_domain(Domain::Infotainment);
    let dispatcher = Arc::new(dispatcher);
    dispatcher.start().await;

    let message = RoutableMessage::new(Destination::Domain(Domain::Infotainment), Payload::Command(vec![1]))
        .with_request_uuid([5u8; 16]);

    let result = dispatcher.send(Domain::Infotainment, message).await;
    assert!(matches!(result, Err(Error::Timeout)));

    dispatcher.stop().await;
}

/// A transport whose `send` publishes a caller-supplied reply onto the
/// inbound channel out of order relative to when it was queued, modeling a
/// BLE link that can reorder notifications.
struct ReorderingTransport {
    inbound_tx: broadcast::Sender<Vec<u8>>,
    replies: std::sync::Mutex<Vec<RoutableMessage>>,
}

impl ReorderingTransport {
    fn new(replies: Vec<RoutableMessage>) -> Self {
        let (inbound_tx, _rx) = broadcast::channel(16);
        Self { inbound_tx, replies: std::sync::Mutex::new(replies) }
    }
}

#[async_trait]
impl Transport for ReorderingTransport {
    async fn send(&self, _domain: Domain, _bytes: Vec<u8>) -> Result<(), Error> {
        // Every call to `send` pops the *last* queued reply first, so
        // replies arrive in the reverse order their requests were sent.
        let next = self.replies.lock().unwrap().pop();
        if let Some(reply) = next {
            let bytes = reply.encode()?;
            let _ = self.inbound_tx.send(bytes);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.inbound_tx.subscribe()
    }

    fn allowed_latency(&self) -> Duration {
        Duration::from_millis(500)
    }

    fn preferred_auth_method(&self) -> SignatureType {
        SignatureType::HmacPersonalized
    }

    fn retry_interval(&self) -> Duration {
        FAST_RETRY_INTERVAL
    }
}

#[tokio::test]
async fn reordered_replies_still_route_to_the_right_waiter() {
    let uuid_a = [1u8; 16];
    let uuid_b = [2u8; 16];

    let reply_a = RoutableMessage::new(Destination::Domain(Domain::Infotainment), Payload::Command(vec![0xA]))
        .with_request_uuid(uuid_a);
    let reply_b = RoutableMessage::new(Destination::Domain(Domain::Infotainment), Payload::Command(vec![0xB]))
        .with_request_uuid(uuid_b);

    // Queued so that sending request A triggers reply B's delivery first.
    let transport: Arc<dyn Transport> = Arc::new(ReorderingTransport::new(vec![reply_a.clone(), reply_b.clone()]));
    let mut dispatcher = Dispatcher::new("5YJ30123456789ABC".to_string(), transport);
    dispatcher.add_domain(Domain::Infotainment);
    let dispatcher = Arc::new(dispatcher);
    dispatcher.start().await;

    let msg_b = RoutableMessage::new(Destination::Domain(Domain::Infotainment), Payload::Command(vec![1])).with_request_uuid(uuid_b);
    let msg_a = RoutableMessage::new(Destination::Domain(Domain::Infotainment), Payload::Command(vec![2])).with_request_uuid(uuid_a);

    let (got_b, got_a) = tokio::join!(
        dispatcher.send(Domain::Infotainment, msg_b),
        dispatcher.send(Domain::Infotainment, msg_a)
    );

    assert_eq!(got_b.unwrap().request_uuid, Some(uuid_b));
    assert_eq!(got_a.unwrap().request_uuid, Some(uuid_a));

    dispatcher.stop().await;
}

/// VCSEC replies are matched by routing address alone; this transport
/// echoes back a reply addressed only by address, never by UUID.
struct VcsecAddressTransport {
    inbound_tx: broadcast::Sender<Vec<u8>>,
    routing_address: Vec<u8>,
}

impl VcsecAddressTransport {
    fn new(routing_address: Vec<u8>) -> Self {
        let (inbound_tx, _rx) = broadcast::channel(16);
        Self { inbound_tx, routing_address }
    }
}

#[async_trait]
impl Transport for VcsecAddressTransport {
    async fn send(&self, _domain: Domain, _bytes: Vec<u8>) -> Result<(), Error> {
        let reply = RoutableMessage {
            to_destination: Destination::RoutingAddress(self.routing_address.clone()),
            from_destination: Some(Destination::Domain(Domain::Vcsec)),
            payload: Payload::Command(vec![0xC]),
            signature_data: None,
            request_uuid: None,
            fault_code: None,
            result: None,
            reason: None,
        };
        let _ = self.inbound_tx.send(reply.encode()?);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.inbound_tx.subscribe()
    }

    fn allowed_latency(&self) -> Duration {
        Duration::from_millis(500)
    }

    fn preferred_auth_method(&self) -> SignatureType {
        SignatureType::HmacPersonalized
    }

    fn retry_interval(&self) -> Duration {
        FAST_RETRY_INTERVAL
    }
}

#[tokio::test]
async fn vcsec_reply_routes_by_address_without_a_uuid() {
    let address = vec![9u8, 9, 9, 9];
    let transport: Arc<dyn Transport> = Arc::new(VcsecAddressTransport::new(address.clone()));
    let mut dispatcher = Dispatcher::new("5YJ30123456789ABC".to_string(), transport);
    dispatcher.add_domain(Domain::Vcsec);
    let dispatcher = Arc::new(dispatcher);
    dispatcher.start().await;

    let request = RoutableMessage::new(Destination::RoutingAddress(address), Payload::Command(vec![1]));
    let reply = dispatcher.send(Domain::Vcsec, request).await.unwrap();

    assert!(reply.request_uuid.is_none());
    assert_eq!(reply.from_destination, Some(Destination::Domain(Domain::Vcsec)));

    dispatcher.stop().await;
}

/// A transport whose `send` fails transiently a fixed number of times
/// before returning a terminal error, modeling a flaky link.
struct FlakyTransport {
    inbound_tx: broadcast::Sender<Vec<u8>>,
    attempts: AtomicU32,
    transient_failures: u32,
}

impl FlakyTransport {
    fn new(transient_failures: u32) -> Self {
        let (inbound_tx, _rx) = broadcast::channel(16);
        Self { inbound_tx, attempts: AtomicU32::new(0), transient_failures }
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn send(&self, _domain: Domain, _bytes: Vec<u8>) -> Result<(), Error> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.transient_failures {
            Err(Error::TransportClosed)
        } else {
            Err(Error::KeyNotPaired)
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.inbound_tx.subscribe()
    }

    fn allowed_latency(&self) -> Duration {
        Duration::from_millis(50)
    }

    fn preferred_auth_method(&self) -> SignatureType {
        SignatureType::HmacPersonalized
    }

    fn retry_interval(&self) -> Duration {
        FAST_RETRY_INTERVAL
    }
}

/// With a transport that fails (transient, transient, transient, fatal),
/// `send` retries the transient failures and returns the fatal error on the
/// fourth attempt without trying a fifth time.
#[tokio::test]
async fn retry_loop_stops_at_the_first_terminal_transport_error() {
    let flaky = Arc::new(FlakyTransport::new(3));
    let transport: Arc<dyn Transport> = flaky.clone();
    let mut dispatcher = Dispatcher::new("5YJ30123456789ABC".to_string(), transport);
    dispatcher.add_domain(Domain::Infotainment);
    let dispatcher = Arc::new(dispatcher);
    dispatcher.start().await;

    let message = RoutableMessage::new(Destination::Domain(Domain::Infotainment), Payload::Command(vec![1]))
        .with_request_uuid([6u8; 16]);

    let result = dispatcher.send(Domain::Infotainment, message).await;
    assert!(matches!(result, Err(Error::KeyNotPaired)));
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 4);

    dispatcher.stop().await;
}
