//! Connection lifecycle controller
//!
//! Owns the advertising state machine and the current [`Session`]:
//!
//! ```text
//! Stopped --start--> Starting --start_success--> Advertising
//!                       |                             |
//!                 start_failure                      stop
//!                       v                             v
//!                    Stopped <---------------------Stopping
//! ```
//!
//! Peer events are routed to the registry, the discovery responder and the message
//! relay while `Advertising`; in every other state they are logged and ignored.
//! The controller is driven by one serialized event loop (see `task`), so every method
//! takes `&mut self` and registry operations are totally ordered.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use offchat_core::{
    AdvertiseErrorCode, AdvertisingState, DeviceId, GattChannel, LifecycleState, ListenerEvent,
    OffchatError, PeripheralConfig, Result as OffchatResult, ServiceDefinition,
    SystemTimeSource, TimeSource, Timestamp, OFFCHAT_SERVICE_UUID,
};

use crate::discovery::DiscoveryResponder;
use crate::listener::ListenerSink;
use crate::outbound::{DeliveryTracker, NotificationQueues};
use crate::registry::{PeerRegistry, SubscriptionChange};
use crate::relay::{FanoutReport, MessageRelay};
use crate::session::{LocalIdentity, Session};
use crate::transport::{AdvertiseRequest, GattTransport};

// ----------------------------------------------------------------------------
// Status and Statistics
// ----------------------------------------------------------------------------

/// Controller counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub starts: u64,
    pub start_failures: u64,
    pub stops: u64,
    pub peers_connected: u64,
    pub peers_disconnected: u64,
    pub stray_events_ignored: u64,
    pub writes_observed: u64,
    pub notifications_queued: u64,
    /// Discarded because the recipient's queue was full
    pub notifications_dropped: u64,
    pub notifications_delivered: u64,
    pub notifications_failed: u64,
    pub announcements_queued: u64,
    pub announcements_read: u64,
}

impl ControllerStats {
    fn record_fanout(&mut self, report: &FanoutReport) {
        self.writes_observed += 1;
        self.notifications_queued += report.queued.len() as u64;
        self.notifications_dropped += report.dropped.len() as u64;
    }
}

/// Snapshot of the peripheral for the controlling application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralStatus {
    pub state: LifecycleState,
    pub advertising: AdvertisingState,
    pub identity: Option<LocalIdentity>,
    /// When the current session was started
    pub started_at: Option<Timestamp>,
    pub connected_peers: Vec<DeviceId>,
    pub message_subscribers: Vec<DeviceId>,
    pub discovery_subscribers: Vec<DeviceId>,
    pub last_error_code: Option<AdvertiseErrorCode>,
    pub stats: ControllerStats,
}

// ----------------------------------------------------------------------------
// Peripheral Controller
// ----------------------------------------------------------------------------

/// Advertising state machine and per-session peer coordination
pub struct PeripheralController<T: GattTransport> {
    transport: Arc<T>,
    config: PeripheralConfig,
    service: ServiceDefinition,
    state: LifecycleState,
    state_tx: watch::Sender<LifecycleState>,
    session: Option<Session>,
    notifications: NotificationQueues<T>,
    responder: DiscoveryResponder,
    listener: ListenerSink,
    time_source: Arc<dyn TimeSource>,
    last_error_code: Option<AdvertiseErrorCode>,
    stats: ControllerStats,
}

impl<T: GattTransport> PeripheralController<T> {
    /// Create a stopped controller
    pub fn new(transport: Arc<T>, config: PeripheralConfig, listener: ListenerSink) -> Self {
        Self::with_time_source(transport, config, listener, Arc::new(SystemTimeSource))
    }

    /// Create a stopped controller with an injected clock
    pub fn with_time_source(
        transport: Arc<T>,
        config: PeripheralConfig,
        listener: ListenerSink,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Stopped);
        let notifications =
            NotificationQueues::new(Arc::clone(&transport), config.notification_queue_size);
        Self {
            transport,
            config,
            service: ServiceDefinition::offchat(),
            state: LifecycleState::Stopped,
            state_tx,
            session: None,
            notifications,
            responder: DiscoveryResponder::with_time_source(time_source.clone()),
            listener,
            time_source,
            last_error_code: None,
            stats: ControllerStats::default(),
        }
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_advertising(&self) -> bool {
        self.state.is_advertising()
    }

    /// Registry of the live session, if any
    pub fn registry(&self) -> Option<&PeerRegistry> {
        self.session.as_ref().map(|session| &session.registry)
    }

    pub fn last_error_code(&self) -> Option<AdvertiseErrorCode> {
        self.last_error_code
    }

    /// Counters, including deliveries the notification workers finished so far
    pub fn stats(&self) -> ControllerStats {
        let tracker = self.notifications.tracker();
        ControllerStats {
            notifications_delivered: tracker.delivered(),
            notifications_failed: tracker.failed(),
            ..self.stats.clone()
        }
    }

    /// Tracker for notifications queued by this controller
    pub fn delivery_tracker(&self) -> Arc<DeliveryTracker> {
        self.notifications.tracker()
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            debug!("Lifecycle {} -> {}", self.state, next);
            self.state = next;
            self.state_tx.send_replace(next);
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Begin advertising as `identity`
    ///
    /// Succeeds once the radio accepted the request; the move to `Advertising`
    /// happens when the transport reports the start result.
    pub async fn start(&mut self, identity: LocalIdentity) -> OffchatResult<()> {
        if self.state != LifecycleState::Stopped {
            return Err(OffchatError::InvalidState {
                operation: "start advertising",
                state: self.state,
            });
        }

        self.transport.radio_status().await.ensure_can_advertise()?;

        self.transition(LifecycleState::Starting);
        match self.open_and_advertise(&identity).await {
            Ok(()) => {
                self.session = Some(Session::new(identity, self.time_source.now()));
                self.last_error_code = None;
                self.stats.starts += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.start_failures += 1;
                self.transition(LifecycleState::Stopped);
                Err(e)
            }
        }
    }

    async fn open_and_advertise(&self, identity: &LocalIdentity) -> OffchatResult<()> {
        let local_name = self.config.resolve_local_name(&identity.local_name);

        // Best effort: the service is reachable by UUID even without the name
        if let Err(e) = self.transport.set_local_name(&local_name).await {
            warn!("Could not set adapter name to {:?}: {}", local_name, e);
        }

        self.transport.open_gatt_server(&self.service).await?;

        let request = AdvertiseRequest {
            local_name,
            service_uuid: OFFCHAT_SERVICE_UUID,
            settings: self.config.advertise.clone(),
        };
        if let Err(e) = self.transport.start_advertising(&request).await {
            self.close_gatt_server().await;
            return Err(e);
        }

        info!(
            "Advertising requested as {:?} for user {}",
            request.local_name, identity.user_id
        );
        Ok(())
    }

    /// Stop advertising and tear down every peer
    ///
    /// Connected peers are force-disconnected and the session is dropped. Stopping an
    /// already stopped peripheral is a no-op.
    pub async fn stop(&mut self) -> OffchatResult<()> {
        match self.state {
            LifecycleState::Stopped => {
                debug!("Stop requested while already stopped");
                return Ok(());
            }
            LifecycleState::Stopping => {
                return Err(OffchatError::InvalidState {
                    operation: "stop advertising",
                    state: self.state,
                });
            }
            LifecycleState::Starting | LifecycleState::Advertising => {}
        }

        self.transition(LifecycleState::Stopping);
        let result = self.transport.stop_advertising().await;
        if let Err(e) = &result {
            warn!("Radio failed to stop advertising: {}", e);
        }

        self.teardown_session().await;
        self.close_gatt_server().await;
        self.stats.stops += 1;
        self.transition(LifecycleState::Stopped);
        info!("Advertising stopped");
        result
    }

    async fn teardown_session(&mut self) {
        self.notifications.close_all();
        let Some(mut session) = self.session.take() else {
            return;
        };

        let peers = session.registry.clear();
        if peers.is_empty() {
            return;
        }

        let transport = &self.transport;
        let disconnects = peers.iter().map(|peer| async move {
            if let Err(e) = transport.disconnect_peer(peer).await {
                warn!("Failed to disconnect {}: {}", peer, e);
            }
        });
        join_all(disconnects).await;
        info!("Disconnected {} peers", peers.len());
    }

    async fn close_gatt_server(&self) {
        if let Err(e) = self.transport.close_gatt_server().await {
            warn!("Failed to close GATT server: {}", e);
        }
    }

    /// Snapshot current state for the controlling application
    pub fn status(&self) -> PeripheralStatus {
        let (identity, started_at, connected_peers, message_subscribers, discovery_subscribers) =
            match &self.session {
                Some(session) => (
                    Some(session.identity.clone()),
                    Some(session.started_at),
                    session.registry.connected_peers(),
                    session.registry.subscribers(GattChannel::Message).to_vec(),
                    session.registry.subscribers(GattChannel::Discovery).to_vec(),
                ),
                None => (None, None, Vec::new(), Vec::new(), Vec::new()),
            };

        PeripheralStatus {
            state: self.state,
            advertising: self.state.advertising_state(),
            identity,
            started_at,
            connected_peers,
            message_subscribers,
            discovery_subscribers,
            last_error_code: self.last_error_code,
            stats: self.stats(),
        }
    }

    // ------------------------------------------------------------------------
    // Transport Events
    // ------------------------------------------------------------------------

    /// Asynchronous outcome of `start_advertising`
    pub async fn on_advertise_start_result(&mut self, success: bool, error_code: Option<i32>) {
        if self.state != LifecycleState::Starting {
            warn!(
                "Ignoring advertise start result (success={}) while {}",
                success, self.state
            );
            self.stats.stray_events_ignored += 1;
            return;
        }

        if success {
            self.transition(LifecycleState::Advertising);
            info!("Advertising started");
            return;
        }

        let code = error_code
            .map(AdvertiseErrorCode::new)
            .unwrap_or(AdvertiseErrorCode::INTERNAL_ERROR);
        error!("Advertising failed to start: {}", code);
        self.last_error_code = Some(code);
        self.stats.start_failures += 1;
        self.session = None;
        self.notifications.close_all();
        self.close_gatt_server().await;
        self.transition(LifecycleState::Stopped);
    }

    /// Whether a peer event should reach the session; counts it as stray otherwise
    fn accepts_peer_event(&mut self, event: &str, peer: &DeviceId) -> bool {
        if self.state != LifecycleState::Advertising || self.session.is_none() {
            warn!("Ignoring {} from {} while {}", event, peer, self.state);
            self.stats.stray_events_ignored += 1;
            return false;
        }
        true
    }

    pub async fn on_peer_connected(&mut self, peer: DeviceId, name: Option<String>) {
        if !self.accepts_peer_event("connect", &peer) {
            return;
        }
        let now = self.time_source.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if !session.registry.add_peer(peer.clone(), name.clone(), now) {
            debug!("Duplicate connect from {}", peer);
            return;
        }

        info!("Device connected: {} ({})", peer, name.as_deref().unwrap_or("no name"));
        self.stats.peers_connected += 1;
        self.listener.emit(ListenerEvent::DeviceConnected {
            device_id: peer,
            name,
        });
    }

    pub async fn on_peer_disconnected(&mut self, peer: DeviceId) {
        if !self.accepts_peer_event("disconnect", &peer) {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.registry.remove_peer(&peer).is_some() {
            self.stats.peers_disconnected += 1;
        }
        self.notifications.close(&peer);
        info!("Device disconnected: {}", peer);
        self.listener
            .emit(ListenerEvent::DeviceDisconnected { device_id: peer });
    }

    /// Subscribe or unsubscribe through the channel's descriptor
    pub async fn on_descriptor_write(
        &mut self,
        peer: DeviceId,
        channel: GattChannel,
        enable: bool,
    ) {
        if !self.accepts_peer_event("descriptor write", &peer) {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let change = if enable {
            session.registry.subscribe(&peer, channel)
        } else {
            session.registry.unsubscribe(&peer, channel)
        };
        debug!("{} descriptor write on {} (enable={}): {:?}", peer, channel, enable, change);

        if change == SubscriptionChange::Subscribed
            && channel == GattChannel::Discovery
            && self
                .responder
                .push_to_subscriber(&mut self.notifications, &session.identity, &peer)
        {
            self.stats.announcements_queued += 1;
        }
    }

    /// Serve a characteristic read
    pub async fn on_read_request(
        &mut self,
        peer: DeviceId,
        channel: GattChannel,
        offset: usize,
    ) -> Vec<u8> {
        if !self.accepts_peer_event("read", &peer) {
            return Vec::new();
        }
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };

        match self
            .responder
            .respond_to_read(&peer, &session.identity, channel, offset)
        {
            Ok(bytes) => {
                if channel == GattChannel::Discovery {
                    self.stats.announcements_read += 1;
                }
                bytes
            }
            Err(e) => {
                warn!("Failed to answer {} read from {}: {}", channel, peer, e);
                Vec::new()
            }
        }
    }

    /// Observe and relay a characteristic write
    ///
    /// Returns the acknowledgement for the transport: the received bytes when the peer
    /// asked for a response, whatever the relay outcome. Fanout only queues, so this
    /// never waits on a recipient.
    pub async fn on_write_request(
        &mut self,
        peer: DeviceId,
        channel: GattChannel,
        payload: Vec<u8>,
        response_needed: bool,
    ) -> Option<Vec<u8>> {
        if !self.accepts_peer_event("write", &peer) {
            return None;
        }
        let session = self.session.as_ref()?;

        let report = MessageRelay::handle_incoming_write(
            &session.registry,
            &mut self.notifications,
            &self.listener,
            &peer,
            channel,
            &payload,
        );
        self.stats.record_fanout(&report);

        response_needed.then_some(payload)
    }
}

impl<T: GattTransport> std::fmt::Debug for PeripheralController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralController")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("last_error_code", &self.last_error_code)
            .finish()
    }
}
