//! Message relay: observation and fanout of inbound writes
//!
//! Every inbound write is surfaced to the listener. Writes on the message channel are
//! also queued, byte for byte, for every other peer subscribed to that channel. The
//! relay only takes the subscriber snapshot and queues; the pushes themselves run on
//! the per-peer workers, so a slow or failing recipient never holds up the caller.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use offchat_core::{DeviceId, DiscoveryAnnouncement, GattChannel, ListenerEvent};

use crate::listener::ListenerSink;
use crate::outbound::{NotificationQueues, QueueOutcome};
use crate::registry::PeerRegistry;
use crate::transport::GattTransport;

/// Result of one fanout pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Recipients whose queue accepted the notification
    pub queued: SmallVec<[DeviceId; 8]>,
    /// Recipients whose queue was full
    pub dropped: SmallVec<[DeviceId; 8]>,
}

impl FanoutReport {
    pub fn recipients(&self) -> usize {
        self.queued.len() + self.dropped.len()
    }
}

/// Stateless relay over the session registry
pub struct MessageRelay;

impl MessageRelay {
    /// Observe an inbound write and fan it out if it arrived on the message channel
    pub fn handle_incoming_write<T: GattTransport>(
        registry: &PeerRegistry,
        queues: &mut NotificationQueues<T>,
        listener: &ListenerSink,
        sender: &DeviceId,
        channel: GattChannel,
        payload: &[u8],
    ) -> FanoutReport {
        listener.emit(ListenerEvent::received(channel, sender.clone(), payload));

        match channel {
            GattChannel::Message => Self::fanout(registry, queues, sender, payload),
            GattChannel::Discovery => {
                Self::log_peer_announcement(sender, payload);
                FanoutReport::default()
            }
        }
    }

    fn fanout<T: GattTransport>(
        registry: &PeerRegistry,
        queues: &mut NotificationQueues<T>,
        sender: &DeviceId,
        payload: &[u8],
    ) -> FanoutReport {
        let recipients = registry.subscribers_excluding(GattChannel::Message, sender);
        if recipients.is_empty() {
            debug!("No other subscribers for message from {}", sender);
            return FanoutReport::default();
        }

        let shared: Arc<[u8]> = Arc::from(payload);
        let mut report = FanoutReport::default();
        for peer in recipients {
            match queues.enqueue(&peer, GattChannel::Message, Arc::clone(&shared)) {
                QueueOutcome::Queued => report.queued.push(peer),
                QueueOutcome::Dropped => report.dropped.push(peer),
            }
        }

        debug!(
            "Queued {} bytes from {} for {}/{} subscribers",
            payload.len(),
            sender,
            report.queued.len(),
            report.recipients()
        );
        report
    }

    /// Inbound discovery writes are only observed; parse them for diagnostics
    fn log_peer_announcement(sender: &DeviceId, payload: &[u8]) {
        match DiscoveryAnnouncement::from_bytes(payload) {
            Ok(announcement) => debug!(
                "Discovery write from {}: user {} ({})",
                sender, announcement.username, announcement.user_id
            ),
            Err(_) => debug!(
                "Discovery write from {} is not an announcement ({} bytes)",
                sender,
                payload.len()
            ),
        }
    }
}
