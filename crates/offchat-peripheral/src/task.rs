//! Serialized peripheral event loop
//!
//! Transport callbacks and application commands share one bounded FIFO channel, and a
//! single task drains it into the [`PeripheralController`]. Every registry operation
//! therefore runs to completion before the next one starts, and the order in which
//! inputs were sent is the order in which they are applied.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use uuid::Uuid;

use offchat_core::{
    DeviceId, GattChannel, LifecycleState, OffchatError, Result as OffchatResult,
    SubscriptionRequest, UNKNOWN_DEVICE_NAME,
};

use crate::controller::{PeripheralController, PeripheralStatus};
use crate::session::LocalIdentity;
use crate::transport::GattTransport;

// ----------------------------------------------------------------------------
// Inbound Messages
// ----------------------------------------------------------------------------

/// Events reported by the radio stack
#[derive(Debug)]
pub enum TransportEvent {
    PeerConnected {
        peer: DeviceId,
        name: Option<String>,
    },
    PeerDisconnected {
        peer: DeviceId,
    },
    ReadRequest {
        peer: DeviceId,
        channel: GattChannel,
        offset: usize,
        respond_to: oneshot::Sender<Vec<u8>>,
    },
    WriteRequest {
        peer: DeviceId,
        channel: GattChannel,
        payload: Vec<u8>,
        response_needed: bool,
        respond_to: oneshot::Sender<Option<Vec<u8>>>,
    },
    DescriptorWrite {
        peer: DeviceId,
        channel: GattChannel,
        enable: bool,
    },
    AdvertiseStartResult {
        success: bool,
        error_code: Option<i32>,
    },
}

impl TransportEvent {
    fn kind(&self) -> &'static str {
        match self {
            TransportEvent::PeerConnected { .. } => "peer_connected",
            TransportEvent::PeerDisconnected { .. } => "peer_disconnected",
            TransportEvent::ReadRequest { .. } => "read_request",
            TransportEvent::WriteRequest { .. } => "write_request",
            TransportEvent::DescriptorWrite { .. } => "descriptor_write",
            TransportEvent::AdvertiseStartResult { .. } => "advertise_start_result",
        }
    }
}

/// Commands from the controlling application
#[derive(Debug)]
pub enum PeripheralCommand {
    StartAdvertising {
        identity: LocalIdentity,
        respond_to: oneshot::Sender<OffchatResult<()>>,
    },
    StopAdvertising {
        respond_to: oneshot::Sender<OffchatResult<()>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<PeripheralStatus>,
    },
    Shutdown,
}

/// Single inbound stream consumed by the event loop
#[derive(Debug)]
pub enum PeripheralInput {
    Transport(TransportEvent),
    Command(PeripheralCommand),
}

pub type InputSender = mpsc::Sender<PeripheralInput>;
pub type InputReceiver = mpsc::Receiver<PeripheralInput>;

// ----------------------------------------------------------------------------
// Transport Event Sender
// ----------------------------------------------------------------------------

/// Handle the radio stack uses to report events
///
/// Read and write requests wait for the event loop's answer; everything else is
/// queued and returns as soon as the loop has room for it.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    sender: InputSender,
}

impl TransportEventSender {
    pub(crate) fn new(sender: InputSender) -> Self {
        Self { sender }
    }

    async fn send(&self, event: TransportEvent) -> OffchatResult<()> {
        self.sender
            .send(PeripheralInput::Transport(event))
            .await
            .map_err(|_| OffchatError::channel("peripheral event loop has stopped"))
    }

    pub async fn peer_connected(
        &self,
        peer: impl Into<DeviceId>,
        name: Option<String>,
    ) -> OffchatResult<()> {
        self.send(TransportEvent::PeerConnected {
            peer: peer.into(),
            name,
        })
        .await
    }

    /// Report a connection whose name lookup failed
    pub async fn peer_connected_name_unavailable(
        &self,
        peer: impl Into<DeviceId>,
    ) -> OffchatResult<()> {
        self.peer_connected(peer, Some(UNKNOWN_DEVICE_NAME.to_string()))
            .await
    }

    pub async fn peer_disconnected(&self, peer: impl Into<DeviceId>) -> OffchatResult<()> {
        self.send(TransportEvent::PeerDisconnected { peer: peer.into() })
            .await
    }

    /// Forward a read and wait for the value to return
    pub async fn read_request(
        &self,
        peer: impl Into<DeviceId>,
        channel: GattChannel,
        offset: usize,
    ) -> OffchatResult<Vec<u8>> {
        let (respond_to, response) = oneshot::channel();
        self.send(TransportEvent::ReadRequest {
            peer: peer.into(),
            channel,
            offset,
            respond_to,
        })
        .await?;
        response
            .await
            .map_err(|_| OffchatError::channel("read request dropped"))
    }

    /// Forward a write and wait for the acknowledgement value
    pub async fn write_request(
        &self,
        peer: impl Into<DeviceId>,
        channel: GattChannel,
        payload: Vec<u8>,
        response_needed: bool,
    ) -> OffchatResult<Option<Vec<u8>>> {
        let (respond_to, response) = oneshot::channel();
        self.send(TransportEvent::WriteRequest {
            peer: peer.into(),
            channel,
            payload,
            response_needed,
            respond_to,
        })
        .await?;
        response
            .await
            .map_err(|_| OffchatError::channel("write request dropped"))
    }

    pub async fn descriptor_write(
        &self,
        peer: impl Into<DeviceId>,
        channel: GattChannel,
        enable: bool,
    ) -> OffchatResult<()> {
        self.send(TransportEvent::DescriptorWrite {
            peer: peer.into(),
            channel,
            enable,
        })
        .await
    }

    /// Forward a raw descriptor write addressed by characteristic UUID
    ///
    /// Unknown characteristics yield `NotFound` and malformed values
    /// `InvalidDescriptorValue`; the transport should log these and carry on.
    pub async fn descriptor_value_write(
        &self,
        peer: impl Into<DeviceId>,
        characteristic: &Uuid,
        value: &[u8],
    ) -> OffchatResult<()> {
        let channel = GattChannel::resolve(characteristic)?;
        let request = SubscriptionRequest::from_cccd_value(value)?;
        self.descriptor_write(peer, channel, request.is_enabled())
            .await
    }

    pub async fn advertise_start_result(
        &self,
        success: bool,
        error_code: Option<i32>,
    ) -> OffchatResult<()> {
        self.send(TransportEvent::AdvertiseStartResult {
            success,
            error_code,
        })
        .await
    }
}

// ----------------------------------------------------------------------------
// Peripheral Task
// ----------------------------------------------------------------------------

/// Event loop that owns the controller
pub struct PeripheralTask<T: GattTransport> {
    controller: PeripheralController<T>,
    receiver: InputReceiver,
    running: bool,
}

impl<T: GattTransport> PeripheralTask<T> {
    pub fn new(controller: PeripheralController<T>, receiver: InputReceiver) -> Self {
        Self {
            controller,
            receiver,
            running: true,
        }
    }

    /// Drain the inbound channel until shutdown or until every sender is gone
    pub async fn run(mut self) -> OffchatResult<()> {
        info!("Peripheral task starting");

        while self.running {
            match self.receiver.recv().await {
                Some(PeripheralInput::Transport(event)) => {
                    trace!("Transport event: {}", event.kind());
                    self.process_event(event).await;
                }
                Some(PeripheralInput::Command(command)) => {
                    self.process_command(command).await;
                }
                None => {
                    info!("Inbound channel closed, shutting down");
                    break;
                }
            }
        }

        if self.controller.state() != LifecycleState::Stopped {
            if let Err(e) = self.controller.stop().await {
                error!("Error stopping during shutdown: {}", e);
            }
        }

        info!("Peripheral task stopped");
        Ok(())
    }

    async fn process_command(&mut self, command: PeripheralCommand) {
        match command {
            PeripheralCommand::StartAdvertising {
                identity,
                respond_to,
            } => {
                let result = self.controller.start(identity).await;
                if let Err(e) = &result {
                    warn!("Start advertising rejected: {}", e);
                }
                Self::reply(respond_to, result, "start");
            }
            PeripheralCommand::StopAdvertising { respond_to } => {
                let result = self.controller.stop().await;
                Self::reply(respond_to, result, "stop");
            }
            PeripheralCommand::GetStatus { respond_to } => {
                Self::reply(respond_to, self.controller.status(), "status");
            }
            PeripheralCommand::Shutdown => {
                debug!("Shutdown requested");
                self.running = false;
            }
        }
    }

    async fn process_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerConnected { peer, name } => {
                self.controller.on_peer_connected(peer, name).await;
            }
            TransportEvent::PeerDisconnected { peer } => {
                self.controller.on_peer_disconnected(peer).await;
            }
            TransportEvent::ReadRequest {
                peer,
                channel,
                offset,
                respond_to,
            } => {
                let value = self.controller.on_read_request(peer, channel, offset).await;
                Self::reply(respond_to, value, "read");
            }
            TransportEvent::WriteRequest {
                peer,
                channel,
                payload,
                response_needed,
                respond_to,
            } => {
                let ack = self
                    .controller
                    .on_write_request(peer, channel, payload, response_needed)
                    .await;
                Self::reply(respond_to, ack, "write");
            }
            TransportEvent::DescriptorWrite {
                peer,
                channel,
                enable,
            } => {
                self.controller
                    .on_descriptor_write(peer, channel, enable)
                    .await;
            }
            TransportEvent::AdvertiseStartResult {
                success,
                error_code,
            } => {
                self.controller
                    .on_advertise_start_result(success, error_code)
                    .await;
            }
        }
    }

    fn reply<R>(respond_to: oneshot::Sender<R>, value: R, what: &str) {
        if respond_to.send(value).is_err() {
            debug!("Caller went away before {} reply", what);
        }
    }
}
