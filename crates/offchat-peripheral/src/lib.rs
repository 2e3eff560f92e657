//! Offchat BLE Peripheral
//!
//! Connection lifecycle, subscription tracking and notification fanout for a device
//! that advertises the Offchat service and relays short payloads between the peers
//! connected to it.
//!
//! ## Architecture
//!
//! - **Peer registry** ([`PeerRegistry`]): connected peers and per-channel subscriptions
//! - **Discovery responder** ([`DiscoveryResponder`]): fresh identity announcements on
//!   read or on subscribe
//! - **Message relay** ([`MessageRelay`]): observes every write and fans message writes
//!   out to the other subscribers
//! - **Lifecycle controller** ([`PeripheralController`]): the advertising state machine
//!   that owns the current session
//!
//! The radio stack sits behind the [`GattTransport`] trait. Its callbacks and the
//! application's commands are funneled through one bounded channel into a single
//! [`PeripheralTask`], which gives every registry operation a total order. Outbound
//! notifications leave the loop through per-peer [`NotificationQueues`], so the loop
//! never waits on a recipient.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod builder;
pub mod controller;
pub mod discovery;
pub mod listener;
pub mod mock;
pub mod outbound;
pub mod registry;
pub mod relay;
pub mod session;
pub mod task;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use builder::{PeripheralBuilder, PeripheralHandle};
pub use controller::{ControllerStats, PeripheralController, PeripheralStatus};
pub use discovery::DiscoveryResponder;
pub use listener::{listener_channel, ListenerReceiver, ListenerSink};
pub use mock::{MockGattTransport, MockTransportConfig, PushedNotification};
pub use outbound::{DeliveryTracker, NotificationQueues, QueueOutcome};
pub use registry::{
    PeerEntry, PeerRegistry, RegistryStats, SubscriberSnapshot, SubscriptionChange,
};
pub use relay::{FanoutReport, MessageRelay};
pub use session::{LocalIdentity, Session};
pub use task::{
    PeripheralCommand, PeripheralInput, PeripheralTask, TransportEvent, TransportEventSender,
};
pub use transport::{AdvertiseRequest, GattTransport, RadioStatus};
