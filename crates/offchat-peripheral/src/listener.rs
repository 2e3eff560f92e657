//! Fire-and-forget delivery of listener events to the host application
//!
//! The queue is bounded. When the host falls behind and the buffer is full, new events
//! are dropped and counted rather than stalling the event loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use offchat_core::ListenerEvent;

/// Receiving end held by the host bridge
pub type ListenerReceiver = mpsc::Receiver<ListenerEvent>;

/// Create a connected sink/receiver pair holding at most `capacity` undelivered events
pub fn listener_channel(capacity: usize) -> (ListenerSink, ListenerReceiver) {
    let (sender, receiver) = mpsc::channel(capacity);
    let sink = ListenerSink {
        sender,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sink, receiver)
}

/// Sending end used by the peripheral core
///
/// Emitting never blocks and never fails the caller; events sent after the host
/// dropped its receiver are discarded.
#[derive(Debug, Clone)]
pub struct ListenerSink {
    sender: mpsc::Sender<ListenerEvent>,
    dropped: Arc<AtomicU64>,
}

impl ListenerSink {
    pub fn emit(&self, event: ListenerEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Listener buffer full, dropping {} event", event.name());
            }
            Err(TrySendError::Closed(event)) => {
                trace!("Listener gone, dropping {} event", event.name());
            }
        }
    }

    /// Whether the host is still listening
    pub fn is_attached(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Events discarded because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
