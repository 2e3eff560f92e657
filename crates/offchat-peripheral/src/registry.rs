//! Peer registry: connected peers and per-channel subscriptions
//!
//! Invariant: a peer appears in a subscription set only while it is also in the
//! connected set. `remove_peer` and `clear` drop connection and subscriptions in one
//! `&mut self` call, so no reader can observe a subscribed-but-disconnected peer.
//! Concurrent access is serialized by the event loop that owns the registry.

use std::collections::{BTreeSet, HashMap};

use smallvec::SmallVec;
use tracing::debug;

use offchat_core::{DeviceId, GattChannel, Timestamp};

/// Point-in-time copy of a channel's subscribers, in address order
pub type SubscriberSnapshot = SmallVec<[DeviceId; 8]>;

// ----------------------------------------------------------------------------
// Registry Entries
// ----------------------------------------------------------------------------

/// What the registry remembers about a connected peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    /// Display name observed at connect time, if any
    pub display_name: Option<String>,
    pub connected_at: Timestamp,
}

/// Outcome of a subscribe or unsubscribe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// Peer was not subscribed and now is
    Subscribed,
    /// Peer was already subscribed
    AlreadySubscribed,
    /// Peer was subscribed and no longer is
    Unsubscribed,
    /// Peer was not subscribed to begin with
    NotSubscribed,
    /// Peer is not connected; the request was dropped
    PeerNotConnected,
}

/// Counters for registry activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub peers_added: u64,
    pub peers_removed: u64,
    pub subscriptions_added: u64,
    pub subscriptions_removed: u64,
    pub stray_requests_dropped: u64,
}

// ----------------------------------------------------------------------------
// Peer Registry
// ----------------------------------------------------------------------------

/// Connected peers and their channel subscriptions
#[derive(Debug, Default)]
pub struct PeerRegistry {
    connected: HashMap<DeviceId, PeerEntry>,
    subscriptions: HashMap<GattChannel, BTreeSet<DeviceId>>,
    stats: RegistryStats,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connected peer; returns `false` if it was already present
    pub fn add_peer(
        &mut self,
        peer: DeviceId,
        display_name: Option<String>,
        connected_at: Timestamp,
    ) -> bool {
        if self.connected.contains_key(&peer) {
            return false;
        }
        self.connected.insert(
            peer,
            PeerEntry {
                display_name,
                connected_at,
            },
        );
        self.stats.peers_added += 1;
        true
    }

    /// Remove a peer and all of its subscriptions
    pub fn remove_peer(&mut self, peer: &DeviceId) -> Option<PeerEntry> {
        let entry = self.connected.remove(peer)?;
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(peer);
        }
        self.stats.peers_removed += 1;
        Some(entry)
    }

    /// Subscribe a connected peer to a channel
    ///
    /// Requests from peers that are not connected are dropped, never escalated.
    pub fn subscribe(&mut self, peer: &DeviceId, channel: GattChannel) -> SubscriptionChange {
        if !self.connected.contains_key(peer) {
            debug!("Dropping {} subscribe from unknown peer {}", channel, peer);
            self.stats.stray_requests_dropped += 1;
            return SubscriptionChange::PeerNotConnected;
        }

        if self
            .subscriptions
            .entry(channel)
            .or_default()
            .insert(peer.clone())
        {
            self.stats.subscriptions_added += 1;
            SubscriptionChange::Subscribed
        } else {
            SubscriptionChange::AlreadySubscribed
        }
    }

    /// Unsubscribe a peer from a channel
    pub fn unsubscribe(&mut self, peer: &DeviceId, channel: GattChannel) -> SubscriptionChange {
        let removed = self
            .subscriptions
            .get_mut(&channel)
            .map(|subscribers| subscribers.remove(peer))
            .unwrap_or(false);

        if removed {
            self.stats.subscriptions_removed += 1;
            SubscriptionChange::Unsubscribed
        } else {
            SubscriptionChange::NotSubscribed
        }
    }

    /// Snapshot the channel's subscribers minus one peer
    pub fn subscribers_excluding(
        &self,
        channel: GattChannel,
        excluded: &DeviceId,
    ) -> SubscriberSnapshot {
        self.subscriptions
            .get(&channel)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter(|peer| *peer != excluded)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot all of a channel's subscribers
    pub fn subscribers(&self, channel: GattChannel) -> SubscriberSnapshot {
        self.subscriptions
            .get(&channel)
            .map(|subscribers| subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every peer and subscription, returning the peers that were connected
    pub fn clear(&mut self) -> Vec<DeviceId> {
        let mut peers: Vec<DeviceId> = self.connected.drain().map(|(peer, _)| peer).collect();
        peers.sort();
        self.stats.peers_removed += peers.len() as u64;
        self.subscriptions.clear();
        peers
    }

    pub fn is_connected(&self, peer: &DeviceId) -> bool {
        self.connected.contains_key(peer)
    }

    pub fn is_subscribed(&self, peer: &DeviceId, channel: GattChannel) -> bool {
        self.subscriptions
            .get(&channel)
            .map(|subscribers| subscribers.contains(peer))
            .unwrap_or(false)
    }

    /// Entry for a connected peer
    pub fn peer(&self, peer: &DeviceId) -> Option<&PeerEntry> {
        self.connected.get(peer)
    }

    /// Connected peers in address order
    pub fn connected_peers(&self) -> Vec<DeviceId> {
        let mut peers: Vec<DeviceId> = self.connected.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    pub fn subscriber_count(&self, channel: GattChannel) -> usize {
        self.subscriptions.get(&channel).map_or(0, BTreeSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.connected.is_empty()
    }

    /// Check that every subscriber is connected
    pub fn subscriptions_are_connected(&self) -> bool {
        self.subscriptions
            .values()
            .flatten()
            .all(|peer| self.connected.contains_key(peer))
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(address: &str) -> DeviceId {
        DeviceId::new(address)
    }

    fn connected(addresses: &[&str]) -> PeerRegistry {
        let mut registry = PeerRegistry::new();
        for address in addresses {
            registry.add_peer(peer(address), None, Timestamp::new(0));
        }
        registry
    }

    #[test]
    fn test_add_peer_is_idempotent() {
        let mut registry = PeerRegistry::new();
        assert!(registry.add_peer(peer("A"), Some("phone".into()), Timestamp::new(1)));
        assert!(!registry.add_peer(peer("A"), None, Timestamp::new(2)));

        assert_eq!(registry.connected_count(), 1);
        let entry = registry.peer(&peer("A")).unwrap();
        assert_eq!(entry.display_name.as_deref(), Some("phone"));
        assert_eq!(entry.connected_at, Timestamp::new(1));
    }

    #[test]
    fn test_remove_peer_cascades_subscriptions() {
        let mut registry = connected(&["A", "B"]);
        registry.subscribe(&peer("A"), GattChannel::Message);
        registry.subscribe(&peer("A"), GattChannel::Discovery);
        registry.subscribe(&peer("B"), GattChannel::Message);

        assert!(registry.remove_peer(&peer("A")).is_some());
        assert!(!registry.is_connected(&peer("A")));
        assert!(!registry.is_subscribed(&peer("A"), GattChannel::Message));
        assert!(!registry.is_subscribed(&peer("A"), GattChannel::Discovery));
        assert_eq!(registry.subscriber_count(GattChannel::Message), 1);
        assert!(registry.subscriptions_are_connected());

        assert!(registry.remove_peer(&peer("A")).is_none());
    }

    #[test]
    fn test_subscribe_requires_connection() {
        let mut registry = PeerRegistry::new();
        assert_eq!(
            registry.subscribe(&peer("ghost"), GattChannel::Message),
            SubscriptionChange::PeerNotConnected
        );
        assert_eq!(registry.subscriber_count(GattChannel::Message), 0);
        assert_eq!(registry.stats().stray_requests_dropped, 1);
    }

    #[test]
    fn test_subscription_transitions() {
        let mut registry = connected(&["A"]);
        let a = peer("A");

        assert_eq!(
            registry.subscribe(&a, GattChannel::Discovery),
            SubscriptionChange::Subscribed
        );
        assert_eq!(
            registry.subscribe(&a, GattChannel::Discovery),
            SubscriptionChange::AlreadySubscribed
        );
        assert_eq!(
            registry.unsubscribe(&a, GattChannel::Discovery),
            SubscriptionChange::Unsubscribed
        );
        assert_eq!(
            registry.unsubscribe(&a, GattChannel::Discovery),
            SubscriptionChange::NotSubscribed
        );
        assert_eq!(
            registry.unsubscribe(&a, GattChannel::Message),
            SubscriptionChange::NotSubscribed
        );
    }

    #[test]
    fn test_subscribers_excluding_skips_sender() {
        let mut registry = connected(&["A", "B", "C"]);
        for address in ["A", "B", "C"] {
            registry.subscribe(&peer(address), GattChannel::Message);
        }

        let snapshot = registry.subscribers_excluding(GattChannel::Message, &peer("B"));
        assert_eq!(snapshot.as_slice(), &[peer("A"), peer("C")]);

        // Channels are independent
        assert!(registry
            .subscribers_excluding(GattChannel::Discovery, &peer("B"))
            .is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_from_later_mutation() {
        let mut registry = connected(&["A", "B"]);
        registry.subscribe(&peer("A"), GattChannel::Message);
        registry.subscribe(&peer("B"), GattChannel::Message);

        let snapshot = registry.subscribers(GattChannel::Message);
        registry.remove_peer(&peer("A"));
        registry.add_peer(peer("C"), None, Timestamp::new(0));
        registry.subscribe(&peer("C"), GattChannel::Message);

        assert_eq!(snapshot.as_slice(), &[peer("A"), peer("B")]);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut registry = connected(&["B", "A", "C"]);
        registry.subscribe(&peer("A"), GattChannel::Message);
        registry.subscribe(&peer("B"), GattChannel::Discovery);

        let dropped = registry.clear();
        assert_eq!(dropped, vec![peer("A"), peer("B"), peer("C")]);
        assert!(registry.is_empty());
        assert_eq!(registry.subscriber_count(GattChannel::Message), 0);
        assert_eq!(registry.subscriber_count(GattChannel::Discovery), 0);
    }
}
