//! Per-peer notification queues
//!
//! Pushes never run on the event loop. Each recipient gets its own bounded queue
//! drained by a dedicated worker task, so a recipient whose radio link stalls only
//! delays its own notifications. Notifications to one peer keep the order in which
//! they were queued; across peers there is no ordering.
//!
//! Queues are opened lazily on the first push to a peer and closed when the peer
//! disconnects or the session is torn down. Closing aborts the worker and discards
//! whatever was still waiting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use offchat_core::{DeviceId, GattChannel};

use crate::transport::GattTransport;

// ----------------------------------------------------------------------------
// Delivery Tracking
// ----------------------------------------------------------------------------

/// Shared counters for queued notifications
///
/// A notification is pending from the moment it is queued until its push finishes,
/// fails, or is discarded with its queue.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    pending: AtomicUsize,
    delivered: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications queued or in flight
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Pushes the transport accepted
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Pushes the transport rejected
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    /// Wait until nothing is queued or in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn begin(self: &Arc<Self>) -> PendingDelivery {
        self.pending.fetch_add(1, Ordering::AcqRel);
        PendingDelivery {
            tracker: Arc::clone(self),
        }
    }
}

/// Releases one pending slot when dropped
#[derive(Debug)]
struct PendingDelivery {
    tracker: Arc<DeliveryTracker>,
}

impl Drop for PendingDelivery {
    fn drop(&mut self) {
        if self.tracker.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

// ----------------------------------------------------------------------------
// Outbound Queues
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct Notification {
    channel: GattChannel,
    payload: Arc<[u8]>,
    _pending: PendingDelivery,
}

#[derive(Debug)]
struct PeerQueue {
    sender: mpsc::Sender<Notification>,
    worker: JoinHandle<()>,
}

/// Outcome of queueing one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    Queued,
    /// The peer's queue was full; the notification was discarded
    Dropped,
}

/// Owns one outbound queue and worker per recipient
pub struct NotificationQueues<T: GattTransport> {
    transport: Arc<T>,
    capacity: usize,
    queues: HashMap<DeviceId, PeerQueue>,
    tracker: Arc<DeliveryTracker>,
}

impl<T: GattTransport> NotificationQueues<T> {
    /// Create queues holding at most `capacity` notifications per peer
    pub fn new(transport: Arc<T>, capacity: usize) -> Self {
        Self {
            transport,
            capacity,
            queues: HashMap::new(),
            tracker: Arc::new(DeliveryTracker::new()),
        }
    }

    /// Counters shared with the workers
    pub fn tracker(&self) -> Arc<DeliveryTracker> {
        Arc::clone(&self.tracker)
    }

    /// Peers with an open queue
    pub fn open_queues(&self) -> usize {
        self.queues.len()
    }

    /// Queue a notification for `peer` without waiting for the push
    ///
    /// Must be called from within a tokio runtime; the first push to a peer spawns
    /// its worker.
    pub fn enqueue(
        &mut self,
        peer: &DeviceId,
        channel: GattChannel,
        payload: Arc<[u8]>,
    ) -> QueueOutcome {
        let notification = Notification {
            channel,
            payload,
            _pending: self.tracker.begin(),
        };

        let sender = &self.open(peer).sender;
        match sender.try_send(notification) {
            Ok(()) => {
                trace!("Queued {} notification for {}", channel, peer);
                QueueOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                warn!("Notification queue for {} is full, dropping {} push", peer, channel);
                QueueOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Notification worker for {} has exited, dropping {} push", peer, channel);
                self.queues.remove(peer);
                QueueOutcome::Dropped
            }
        }
    }

    fn open(&mut self, peer: &DeviceId) -> &PeerQueue {
        self.queues.entry(peer.clone()).or_insert_with(|| {
            debug!("Opening notification queue for {}", peer);
            let (sender, receiver) = mpsc::channel(self.capacity);
            let worker = tokio::spawn(drain_queue(
                Arc::clone(&self.transport),
                peer.clone(),
                receiver,
                Arc::clone(&self.tracker),
            ));
            PeerQueue { sender, worker }
        })
    }

    /// Abort the peer's worker and discard its pending notifications
    pub fn close(&mut self, peer: &DeviceId) {
        if let Some(queue) = self.queues.remove(peer) {
            debug!("Closing notification queue for {}", peer);
            queue.worker.abort();
        }
    }

    /// Close every queue
    pub fn close_all(&mut self) {
        for (_, queue) in self.queues.drain() {
            queue.worker.abort();
        }
    }
}

impl<T: GattTransport> Drop for NotificationQueues<T> {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl<T: GattTransport> std::fmt::Debug for NotificationQueues<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueues")
            .field("capacity", &self.capacity)
            .field("open_queues", &self.queues.len())
            .field("pending", &self.tracker.pending())
            .finish()
    }
}

async fn drain_queue<T: GattTransport>(
    transport: Arc<T>,
    peer: DeviceId,
    mut receiver: mpsc::Receiver<Notification>,
    tracker: Arc<DeliveryTracker>,
) {
    while let Some(notification) = receiver.recv().await {
        let outcome = transport
            .push_notification(&peer, notification.channel, &notification.payload)
            .await;
        match outcome {
            Ok(()) => {
                tracker.delivered.fetch_add(1, Ordering::AcqRel);
                trace!("Pushed {} notification to {}", notification.channel, peer);
            }
            Err(e) => {
                tracker.failed.fetch_add(1, Ordering::AcqRel);
                warn!("{} push to {} failed: {}", notification.channel, peer, e);
            }
        }
    }
    trace!("Notification worker for {} finished", peer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGattTransport;
    use tokio::time::Duration;

    fn payload(bytes: &[u8]) -> Arc<[u8]> {
        Arc::from(bytes)
    }

    #[tokio::test]
    async fn test_pushes_keep_per_peer_order() {
        let transport = Arc::new(MockGattTransport::new());
        let mut queues = NotificationQueues::new(transport.clone(), 8);
        let peer = DeviceId::new("A");

        for text in [&b"one"[..], b"two", b"three"] {
            assert_eq!(
                queues.enqueue(&peer, GattChannel::Message, payload(text)),
                QueueOutcome::Queued
            );
        }
        queues.tracker().wait_idle().await;

        assert_eq!(
            transport.pushes_to(&peer, GattChannel::Message).await,
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
        assert_eq!(queues.tracker().delivered(), 3);
        assert_eq!(queues.open_queues(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_counted_per_push() {
        let transport = Arc::new(MockGattTransport::new());
        transport.fail_pushes_to("B").await;
        let mut queues = NotificationQueues::new(transport.clone(), 8);

        queues.enqueue(&DeviceId::new("A"), GattChannel::Message, payload(b"x"));
        queues.enqueue(&DeviceId::new("B"), GattChannel::Message, payload(b"x"));
        let tracker = queues.tracker();
        tracker.wait_idle().await;

        assert_eq!(tracker.delivered(), 1);
        assert_eq!(tracker.failed(), 1);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_stalled_peer_overflows_and_close_releases() {
        let transport = Arc::new(MockGattTransport::new());
        let stalled = DeviceId::new("C");
        transport.stall_pushes_to(stalled.clone()).await;
        let mut queues = NotificationQueues::new(transport.clone(), 2);
        let tracker = queues.tracker();

        // One push in flight plus a full queue; the rest are dropped
        let outcomes: Vec<QueueOutcome> = (0..6)
            .map(|_| queues.enqueue(&stalled, GattChannel::Message, payload(b"m")))
            .collect();
        assert!(outcomes.contains(&QueueOutcome::Dropped));
        assert!(tracker.pending() > 0);

        // Other peers are unaffected
        let other = DeviceId::new("D");
        queues.enqueue(&other, GattChannel::Message, payload(b"m"));
        tokio::time::timeout(Duration::from_secs(1), async {
            while transport.pushes_to(&other, GattChannel::Message).await.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        queues.close(&stalled);
        tokio::time::timeout(Duration::from_secs(1), tracker.wait_idle())
            .await
            .unwrap();
        assert_eq!(queues.open_queues(), 1);
    }
}
