//! Discovery responder
//!
//! Builds a fresh announcement for every emission. Nothing is cached: a direct read
//! and a subscribe-triggered push each get their own `id` and `timestamp`, and so does
//! every chunk of a multi-part read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use offchat_core::{
    DeviceId, DiscoveryAnnouncement, GattChannel, Result as OffchatResult, SystemTimeSource,
    TimeSource, Timestamp,
};

use crate::outbound::{NotificationQueues, QueueOutcome};
use crate::session::LocalIdentity;
use crate::transport::GattTransport;

/// Builds and emits discovery announcements
pub struct DiscoveryResponder {
    time_source: Arc<dyn TimeSource>,
    /// Latest timestamp handed out; keeps timestamps non-decreasing if the clock steps back
    last_timestamp: AtomicU64,
}

impl DiscoveryResponder {
    /// Create a responder reading the system clock
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    /// Create a responder with an injected clock
    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            time_source,
            last_timestamp: AtomicU64::new(0),
        }
    }

    fn next_timestamp(&self) -> Timestamp {
        let now = self.time_source.now().as_millis();
        let previous = self.last_timestamp.fetch_max(now, Ordering::AcqRel);
        Timestamp::new(previous.max(now))
    }

    /// Construct a new announcement with a fresh id and the current time
    pub fn build_announcement(&self, user_id: &str, username: &str) -> DiscoveryAnnouncement {
        DiscoveryAnnouncement::new(user_id, username, self.next_timestamp())
    }

    /// Answer a characteristic read
    ///
    /// Discovery reads return a freshly serialized announcement starting at `offset`;
    /// an offset at or past the end yields an empty slice. Message reads carry no
    /// content and always return an empty value.
    pub fn respond_to_read(
        &self,
        peer: &DeviceId,
        identity: &LocalIdentity,
        channel: GattChannel,
        offset: usize,
    ) -> OffchatResult<Vec<u8>> {
        if channel == GattChannel::Message {
            return Ok(Vec::new());
        }

        let mut bytes = self
            .build_announcement(&identity.user_id, &identity.username)
            .to_bytes()?;

        if offset >= bytes.len() {
            debug!(
                "Discovery read from {} at offset {} past end ({} bytes)",
                peer,
                offset,
                bytes.len()
            );
            return Ok(Vec::new());
        }

        debug!("Discovery read from {} at offset {}", peer, offset);
        Ok(bytes.split_off(offset))
    }

    /// Queue one announcement for a subscriber
    ///
    /// Delivery is best-effort and happens on the peer's notification worker; this
    /// returns whether the announcement was queued.
    pub fn push_to_subscriber<T: GattTransport>(
        &self,
        queues: &mut NotificationQueues<T>,
        identity: &LocalIdentity,
        peer: &DeviceId,
    ) -> bool {
        let payload = match self
            .build_announcement(&identity.user_id, &identity.username)
            .to_bytes()
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize announcement for {}: {}", peer, e);
                return false;
            }
        };

        match queues.enqueue(peer, GattChannel::Discovery, Arc::from(payload)) {
            QueueOutcome::Queued => {
                debug!("Queued discovery announcement for {}", peer);
                true
            }
            QueueOutcome::Dropped => false,
        }
    }
}

impl Default for DiscoveryResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiscoveryResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryResponder")
            .field("last_timestamp", &self.last_timestamp.load(Ordering::Acquire))
            .finish()
    }
}
