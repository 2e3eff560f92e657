//! Transport seam between the peripheral core and the radio stack
//!
//! The radio stack (advertising, connection establishment, attribute delivery, MTU
//! negotiation) lives behind [`GattTransport`]. Inbound traffic flows the other way as
//! [`crate::task::TransportEvent`]s sent through a [`crate::TransportEventSender`].

use async_trait::async_trait;
use uuid::Uuid;

use offchat_core::{
    AdvertiseSettings, DeviceId, GattChannel, OffchatError, Result as OffchatResult,
    ServiceDefinition,
};

// ----------------------------------------------------------------------------
// Radio Status
// ----------------------------------------------------------------------------

/// Capabilities of the local radio checked before advertising starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioStatus {
    /// Adapter present and powered on
    pub enabled: bool,
    /// Adapter can act as an advertising peripheral
    pub advertising_supported: bool,
}

impl RadioStatus {
    /// A powered radio that can advertise
    pub fn ready() -> Self {
        Self {
            enabled: true,
            advertising_supported: true,
        }
    }

    /// A disabled or missing radio
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            advertising_supported: false,
        }
    }

    /// Fail with `UnsupportedOperation` unless advertising is possible
    pub fn ensure_can_advertise(&self) -> OffchatResult<()> {
        if !self.enabled {
            return Err(OffchatError::unsupported("Bluetooth is not enabled"));
        }
        if !self.advertising_supported {
            return Err(OffchatError::unsupported(
                "BLE advertising not supported on this device",
            ));
        }
        Ok(())
    }
}

impl Default for RadioStatus {
    fn default() -> Self {
        Self::ready()
    }
}

// ----------------------------------------------------------------------------
// Advertise Request
// ----------------------------------------------------------------------------

/// Everything the radio needs to begin advertising
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseRequest {
    pub local_name: String,
    /// Included in both the advertisement and the scan response
    pub service_uuid: Uuid,
    pub settings: AdvertiseSettings,
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Outbound operations the core requests from the radio stack
///
/// Methods take `&self` so that pushes to several peers can run concurrently.
/// Implementations report permission failures as `OffchatError::TransportDenied`.
#[async_trait]
pub trait GattTransport: Send + Sync + 'static {
    /// Current adapter capabilities
    async fn radio_status(&self) -> RadioStatus;

    /// Rename the adapter
    async fn set_local_name(&self, name: &str) -> OffchatResult<()>;

    /// Register the service and start serving attribute requests
    async fn open_gatt_server(&self, service: &ServiceDefinition) -> OffchatResult<()>;

    /// Unregister the service
    async fn close_gatt_server(&self) -> OffchatResult<()>;

    /// Ask the radio to advertise; success or failure is reported later through
    /// `TransportEvent::AdvertiseStartResult`
    async fn start_advertising(&self, request: &AdvertiseRequest) -> OffchatResult<()>;

    /// Stop advertising
    async fn stop_advertising(&self) -> OffchatResult<()>;

    /// Push one notification frame to one peer
    async fn push_notification(
        &self,
        peer: &DeviceId,
        channel: GattChannel,
        payload: &[u8],
    ) -> OffchatResult<()>;

    /// Force a peer's connection closed
    async fn disconnect_peer(&self, peer: &DeviceId) -> OffchatResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_checks() {
        assert!(RadioStatus::ready().ensure_can_advertise().is_ok());

        let disabled = RadioStatus::disabled().ensure_can_advertise().unwrap_err();
        assert!(matches!(disabled, OffchatError::UnsupportedOperation { .. }));
        assert!(disabled.to_string().contains("not enabled"));

        let no_peripheral_mode = RadioStatus {
            enabled: true,
            advertising_supported: false,
        };
        let err = no_peripheral_mode.ensure_can_advertise().unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}
