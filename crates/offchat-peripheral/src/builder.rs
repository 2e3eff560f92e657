//! Peripheral builder and application handle
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use offchat_peripheral::{LocalIdentity, MockGattTransport, PeripheralBuilder};
//! # async fn run() -> offchat_core::Result<()> {
//! let (handle, mut events) = PeripheralBuilder::new(Arc::new(MockGattTransport::new())).spawn()?;
//! handle.start_advertising(LocalIdentity::new("user-1", "alice")).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{}: {}", event.name(), event.payload());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use offchat_core::{
    LifecycleState, OffchatError, PeripheralConfig, Result as OffchatResult, SystemTimeSource,
    TimeSource,
};

use crate::controller::{PeripheralController, PeripheralStatus};
use crate::listener::{listener_channel, ListenerReceiver};
use crate::outbound::DeliveryTracker;
use crate::session::LocalIdentity;
use crate::task::{
    InputSender, PeripheralCommand, PeripheralInput, PeripheralTask, TransportEventSender,
};
use crate::transport::GattTransport;

// ----------------------------------------------------------------------------
// Peripheral Builder
// ----------------------------------------------------------------------------

/// Wires a transport, a controller and the event loop together
pub struct PeripheralBuilder<T: GattTransport> {
    transport: Arc<T>,
    config: PeripheralConfig,
    time_source: Arc<dyn TimeSource>,
}

impl<T: GattTransport> PeripheralBuilder<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            config: PeripheralConfig::default(),
            time_source: Arc::new(SystemTimeSource),
        }
    }

    /// Set the peripheral configuration
    pub fn with_config(mut self, config: PeripheralConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject a clock for announcement and connection timestamps
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Build the event loop without spawning it
    pub fn build(
        self,
    ) -> OffchatResult<(PeripheralTask<T>, PeripheralHandle, ListenerReceiver)> {
        self.config.validate()?;

        let (sender, receiver) = mpsc::channel(self.config.event_buffer_size);
        let (sink, listener) = listener_channel(self.config.listener_buffer_size);
        let controller = PeripheralController::with_time_source(
            self.transport,
            self.config,
            sink,
            self.time_source,
        );
        let state = controller.subscribe_state();
        let deliveries = controller.delivery_tracker();

        let handle = PeripheralHandle {
            sender,
            state,
            deliveries,
            task: None,
        };
        Ok((PeripheralTask::new(controller, receiver), handle, listener))
    }

    /// Build and spawn the event loop on the current runtime
    pub fn spawn(self) -> OffchatResult<(PeripheralHandle, ListenerReceiver)> {
        let (task, mut handle, listener) = self.build()?;
        handle.task = Some(tokio::spawn(task.run()));
        info!("Peripheral event loop spawned");
        Ok((handle, listener))
    }
}

// ----------------------------------------------------------------------------
// Peripheral Handle
// ----------------------------------------------------------------------------

/// Commands exposed to the controlling application
#[derive(Debug)]
pub struct PeripheralHandle {
    sender: InputSender,
    state: watch::Receiver<LifecycleState>,
    deliveries: Arc<DeliveryTracker>,
    task: Option<JoinHandle<OffchatResult<()>>>,
}

impl PeripheralHandle {
    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> PeripheralCommand,
    ) -> OffchatResult<R> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(PeripheralInput::Command(command(respond_to)))
            .await
            .map_err(|_| OffchatError::channel("peripheral event loop has stopped"))?;
        response
            .await
            .map_err(|_| OffchatError::channel("peripheral event loop dropped the request"))
    }

    /// Start advertising as `identity`
    ///
    /// Resolves once the radio accepted the request; use [`Self::wait_for_state`] to
    /// wait for `Advertising`.
    pub async fn start_advertising(&self, identity: LocalIdentity) -> OffchatResult<()> {
        self.request(|respond_to| PeripheralCommand::StartAdvertising {
            identity,
            respond_to,
        })
        .await?
    }

    /// Stop advertising and disconnect every peer
    pub async fn stop_advertising(&self) -> OffchatResult<()> {
        self.request(|respond_to| PeripheralCommand::StopAdvertising { respond_to })
            .await?
    }

    /// Whether the service is live
    pub fn is_advertising(&self) -> bool {
        self.state.borrow().is_advertising()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Wait until the lifecycle reaches `target`
    pub async fn wait_for_state(&self, target: LifecycleState) -> OffchatResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| OffchatError::channel("peripheral event loop has stopped"))
    }

    /// Snapshot of the peripheral, ordered after every input sent before it
    pub async fn status(&self) -> OffchatResult<PeripheralStatus> {
        self.request(|respond_to| PeripheralCommand::GetStatus { respond_to })
            .await
    }

    /// Wait until every notification queued by inputs sent before this call has been
    /// pushed, failed, or discarded
    ///
    /// Never returns while a recipient's push is stalled and that peer is still
    /// connected; bound it with a timeout if that matters.
    pub async fn wait_for_deliveries(&self) -> OffchatResult<()> {
        self.status().await?;
        self.deliveries.wait_idle().await;
        Ok(())
    }

    /// Sender for the radio stack's events
    pub fn transport_events(&self) -> TransportEventSender {
        TransportEventSender::new(self.sender.clone())
    }

    /// Stop the event loop, tearing down any live session, and wait for it to exit
    pub async fn shutdown(mut self) -> OffchatResult<()> {
        if self
            .sender
            .send(PeripheralInput::Command(PeripheralCommand::Shutdown))
            .await
            .is_err()
        {
            debug!("Event loop already gone at shutdown");
        }

        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| OffchatError::channel(format!("peripheral task panicked: {}", e)))?,
            None => Ok(()),
        }
    }
}
