//! Pending-reply registry (spec §4.E, §4.F).
//!
//! Every outstanding request registers a bounded channel keyed by how its
//! reply will be matched: most domains echo the request UUID, VCSEC matches
//! on routing address alone (§4.F). The dispatcher looks replies up here
//! instead of holding its own bespoke map, mirroring the teacher
//! dispatcher's `HashMap<Pubkey, mpsc::Sender<BridgeEvent>>` plus
//! registration channel shape.

use dashmap::DashMap;
use tokio::sync::mpsc;
use vehicle_command_proto::{Domain, RoutableMessage};

/// Bounded so a receiver that stops polling applies backpressure instead of
/// letting the registry grow without limit.
pub const RECEIVER_CHANNEL_CAPACITY: usize = 5;

/// How a pending reply is matched against an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReceiverKey {
    /// Matched on `(domain, request_uuid)`; used by every domain that
    /// echoes the UUID back.
    Uuid { domain: Domain, request_uuid: [u8; 16] },
    /// Matched on `(domain, routing_address)` alone; used for VCSEC, which
    /// never echoes a UUID (§4.F).
    RoutingAddress { domain: Domain, routing_address: Vec<u8> },
}

/// A handle a caller holds while awaiting a reply. Deregisters itself from
/// the registry on drop so an abandoned request does not leak a slot.
pub struct Receiver {
    key: ReceiverKey,
    registry: ReceiverRegistry,
    rx: mpsc::Receiver<RoutableMessage>,
}

impl Receiver {
    pub async fn recv(&mut self) -> Option<RoutableMessage> {
        self.rx.recv().await
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.registry.senders.remove(&self.key);
    }
}

/// Registry of pending replies, shared between the dispatcher's inbound
/// loop and every in-flight request.
#[derive(Clone, Default)]
pub struct ReceiverRegistry {
    senders: std::sync::Arc<DashMap<ReceiverKey, mpsc::Sender<RoutableMessage>>>,
}

impl ReceiverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in replies matching `key`. Returns a [`Receiver`]
    /// that automatically deregisters on drop.
    pub fn register(&self, key: ReceiverKey) -> Receiver {
        let (tx, rx) = mpsc::channel(RECEIVER_CHANNEL_CAPACITY);
        self.senders.insert(key.clone(), tx);
        Receiver { key, registry: self.clone(), rx }
    }

    /// Route an inbound message to its registered receiver, if any. Returns
    /// `true` if a receiver was found (whether or not the send succeeded).
    pub fn route(&self, key: &ReceiverKey, message: RoutableMessage) -> bool {
        if let Some(sender) = self.senders.get(key) {
            if sender.try_send(message).is_err() {
                tracing::warn!("receiver for {key:?} is full or closed, dropping reply");
            }
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vehicle_command_proto::{Destination, Payload};

    fn sample_message() -> RoutableMessage {
        RoutableMessage::new(Destination::Domain(Domain::Infotainment), Payload::Command(vec![1]))
    }

    #[tokio::test]
    async fn route_delivers_to_registered_receiver() {
        let registry = ReceiverRegistry::new();
        let key = ReceiverKey::Uuid { domain: Domain::Infotainment, request_uuid: [1u8; 16] };
        let mut receiver = registry.register(key.clone());

        assert!(registry.route(&key, sample_message()));
        assert!(receiver.recv().await.is_some());
    }

    #[tokio::test]
    async fn route_with_no_registered_receiver_returns_false() {
        let registry = ReceiverRegistry::new();
        let key = ReceiverKey::Uuid { domain: Domain::Vcsec, request_uuid: [9u8; 16] };
        assert!(!registry.route(&key, sample_message()));
    }

    #[tokio::test]
    async fn dropping_receiver_deregisters_it() {
        let registry = ReceiverRegistry::new();
        let key = ReceiverKey::RoutingAddress { domain: Domain::Vcsec, routing_address: vec![1, 2, 3] };
        let receiver = registry.register(key.clone());
        assert_eq!(registry.len(), 1);

        drop(receiver);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn vcsec_routes_by_address_without_uuid() {
        let registry = ReceiverRegistry::new();
        let key = ReceiverKey::RoutingAddress { domain: Domain::Vcsec, routing_address: vec![4, 5, 6] };
        let mut receiver = registry.register(key.clone());

        assert!(registry.route(&key, sample_message()));
        assert!(receiver.recv().await.is_some());
    }
}
