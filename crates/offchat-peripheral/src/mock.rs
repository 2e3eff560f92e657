//! In-memory GATT transport for tests and scripted runs
//!
//! Records every outbound call the core makes (notifications, disconnects, advertise
//! requests) and can be told to fail specific operations. Inbound traffic is driven
//! separately through a `TransportEventSender`.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use offchat_core::{
    DeviceId, GattChannel, OffchatError, Result as OffchatResult, ServiceDefinition,
};

use crate::transport::{AdvertiseRequest, GattTransport, RadioStatus};

// ----------------------------------------------------------------------------
// Mock Transport Configuration
// ----------------------------------------------------------------------------

/// Failure knobs for the mock transport
#[derive(Debug, Clone, Default)]
pub struct MockTransportConfig {
    /// Reported adapter capabilities
    pub radio: RadioStatus,
    /// Reject `set_local_name` with `TransportDenied`
    pub deny_local_name: bool,
    /// Fail `open_gatt_server`
    pub fail_gatt_server: bool,
    /// Reject `start_advertising` with `TransportDenied`
    pub deny_advertising: bool,
    /// Fail `stop_advertising`
    pub fail_stop_advertising: bool,
}

impl MockTransportConfig {
    /// Radio that works for everything
    pub fn ready() -> Self {
        Self::default()
    }

    /// Radio that is switched off
    pub fn radio_disabled() -> Self {
        Self {
            radio: RadioStatus::disabled(),
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Recorded Calls
// ----------------------------------------------------------------------------

/// One notification the core asked the transport to push
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedNotification {
    pub device_id: DeviceId,
    pub channel: GattChannel,
    #[serde(serialize_with = "serialize_lossy")]
    pub payload: Vec<u8>,
}

fn serialize_lossy<S: serde::Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(payload))
}

#[derive(Debug, Default)]
struct MockState {
    config: MockTransportConfig,
    local_name: Option<String>,
    server_open: bool,
    advertising: bool,
    advertise_requests: Vec<AdvertiseRequest>,
    pushes: Vec<PushedNotification>,
    failing_peers: HashSet<DeviceId>,
    stalled_peers: HashSet<DeviceId>,
    disconnects: Vec<DeviceId>,
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

/// Recording transport with configurable failures
#[derive(Debug, Default)]
pub struct MockGattTransport {
    state: Mutex<MockState>,
}

impl MockGattTransport {
    pub fn new() -> Self {
        Self::with_config(MockTransportConfig::ready())
    }

    pub fn with_config(config: MockTransportConfig) -> Self {
        Self {
            state: Mutex::new(MockState {
                config,
                ..MockState::default()
            }),
        }
    }

    /// Replace the failure knobs
    pub async fn set_config(&self, config: MockTransportConfig) {
        self.state.lock().await.config = config;
    }

    /// Make every push to `peer` fail
    pub async fn fail_pushes_to(&self, peer: impl Into<DeviceId>) {
        self.state.lock().await.failing_peers.insert(peer.into());
    }

    /// Let pushes to `peer` succeed again
    pub async fn restore_pushes_to(&self, peer: &DeviceId) {
        self.state.lock().await.failing_peers.remove(peer);
    }

    /// Make every push to `peer` hang forever, like a link that stopped acknowledging
    pub async fn stall_pushes_to(&self, peer: impl Into<DeviceId>) {
        self.state.lock().await.stalled_peers.insert(peer.into());
    }

    /// All successful pushes, in call order
    pub async fn pushes(&self) -> Vec<PushedNotification> {
        self.state.lock().await.pushes.clone()
    }

    /// Successful pushes to one peer on one channel
    pub async fn pushes_to(&self, peer: &DeviceId, channel: GattChannel) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .await
            .pushes
            .iter()
            .filter(|push| &push.device_id == peer && push.channel == channel)
            .map(|push| push.payload.clone())
            .collect()
    }

    /// Drain recorded pushes
    pub async fn take_pushes(&self) -> Vec<PushedNotification> {
        std::mem::take(&mut self.state.lock().await.pushes)
    }

    /// Peers the core force-disconnected, in call order
    pub async fn disconnects(&self) -> Vec<DeviceId> {
        self.state.lock().await.disconnects.clone()
    }

    pub async fn advertise_requests(&self) -> Vec<AdvertiseRequest> {
        self.state.lock().await.advertise_requests.clone()
    }

    pub async fn local_name(&self) -> Option<String> {
        self.state.lock().await.local_name.clone()
    }

    pub async fn is_server_open(&self) -> bool {
        self.state.lock().await.server_open
    }

    pub async fn is_advertising(&self) -> bool {
        self.state.lock().await.advertising
    }
}

#[async_trait]
impl GattTransport for MockGattTransport {
    async fn radio_status(&self) -> RadioStatus {
        self.state.lock().await.config.radio
    }

    async fn set_local_name(&self, name: &str) -> OffchatResult<()> {
        let mut state = self.state.lock().await;
        if state.config.deny_local_name {
            return Err(OffchatError::denied("renaming the adapter is not permitted"));
        }
        state.local_name = Some(name.to_string());
        Ok(())
    }

    async fn open_gatt_server(&self, service: &ServiceDefinition) -> OffchatResult<()> {
        let mut state = self.state.lock().await;
        if state.config.fail_gatt_server {
            return Err(OffchatError::transport("Failed to open GATT server"));
        }
        debug!(
            "Mock GATT server open with {} characteristics",
            service.characteristics.len()
        );
        state.server_open = true;
        Ok(())
    }

    async fn close_gatt_server(&self) -> OffchatResult<()> {
        self.state.lock().await.server_open = false;
        Ok(())
    }

    async fn start_advertising(&self, request: &AdvertiseRequest) -> OffchatResult<()> {
        let mut state = self.state.lock().await;
        if state.config.deny_advertising {
            return Err(OffchatError::denied("advertising is not permitted"));
        }
        state.advertise_requests.push(request.clone());
        state.advertising = true;
        Ok(())
    }

    async fn stop_advertising(&self) -> OffchatResult<()> {
        let mut state = self.state.lock().await;
        state.advertising = false;
        if state.config.fail_stop_advertising {
            return Err(OffchatError::transport("radio did not acknowledge stop"));
        }
        Ok(())
    }

    async fn push_notification(
        &self,
        peer: &DeviceId,
        channel: GattChannel,
        payload: &[u8],
    ) -> OffchatResult<()> {
        let mut state = self.state.lock().await;
        if state.stalled_peers.contains(peer) {
            drop(state);
            debug!("Mock push to {} stalls", peer);
            return std::future::pending().await;
        }
        if state.failing_peers.contains(peer) {
            return Err(OffchatError::transport(format!("notify to {} failed", peer)));
        }
        state.pushes.push(PushedNotification {
            device_id: peer.clone(),
            channel,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn disconnect_peer(&self, peer: &DeviceId) -> OffchatResult<()> {
        self.state.lock().await.disconnects.push(peer.clone());
        Ok(())
    }
}
