//! Listener events surfaced to the host application
//!
//! Events are fire-and-forget: each carries a name (`deviceConnected`,
//! `deviceDisconnected`, `messageReceived`, `discoveryReceived`) and a flat payload map
//! keyed the way the host bridge expects (`deviceId`, `name`, `data`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::gatt::GattChannel;
use crate::types::DeviceId;

/// Name reported when the transport cannot resolve a peer's display name
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

// ----------------------------------------------------------------------------
// Listener Events
// ----------------------------------------------------------------------------

/// Lifecycle and payload events for the host listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ListenerEvent {
    #[serde(rename_all = "camelCase")]
    DeviceConnected {
        device_id: DeviceId,
        name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DeviceDisconnected { device_id: DeviceId },
    #[serde(rename_all = "camelCase")]
    MessageReceived { device_id: DeviceId, data: String },
    #[serde(rename_all = "camelCase")]
    DiscoveryReceived { device_id: DeviceId, data: String },
}

impl ListenerEvent {
    /// Build the received-write observation for a channel
    ///
    /// The payload is decoded as UTF-8 with replacement characters for invalid
    /// sequences; nothing is rejected.
    pub fn received(channel: GattChannel, device_id: DeviceId, payload: &[u8]) -> Self {
        let data = String::from_utf8_lossy(payload).into_owned();
        match channel {
            GattChannel::Message => ListenerEvent::MessageReceived { device_id, data },
            GattChannel::Discovery => ListenerEvent::DiscoveryReceived { device_id, data },
        }
    }

    /// Event name as seen by the host
    pub fn name(&self) -> &'static str {
        match self {
            ListenerEvent::DeviceConnected { .. } => "deviceConnected",
            ListenerEvent::DeviceDisconnected { .. } => "deviceDisconnected",
            ListenerEvent::MessageReceived { .. } => "messageReceived",
            ListenerEvent::DiscoveryReceived { .. } => "discoveryReceived",
        }
    }

    /// Peer the event concerns
    pub fn device_id(&self) -> &DeviceId {
        match self {
            ListenerEvent::DeviceConnected { device_id, .. }
            | ListenerEvent::DeviceDisconnected { device_id }
            | ListenerEvent::MessageReceived { device_id, .. }
            | ListenerEvent::DiscoveryReceived { device_id, .. } => device_id,
        }
    }

    /// Payload map handed to the host listener
    pub fn payload(&self) -> Value {
        match self {
            ListenerEvent::DeviceConnected { device_id, name } => {
                json!({ "deviceId": device_id, "name": name })
            }
            ListenerEvent::DeviceDisconnected { device_id } => json!({ "deviceId": device_id }),
            ListenerEvent::MessageReceived { device_id, data }
            | ListenerEvent::DiscoveryReceived { device_id, data } => {
                json!({ "deviceId": device_id, "data": data })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_and_payloads() {
        let event = ListenerEvent::DeviceConnected {
            device_id: DeviceId::new("AA"),
            name: Some("Pixel".to_string()),
        };
        assert_eq!(event.name(), "deviceConnected");
        assert_eq!(event.payload(), json!({"deviceId": "AA", "name": "Pixel"}));

        let unnamed = ListenerEvent::DeviceConnected {
            device_id: DeviceId::new("BB"),
            name: None,
        };
        assert_eq!(unnamed.payload(), json!({"deviceId": "BB", "name": null}));
    }

    #[test]
    fn test_received_decodes_lossily() {
        let event = ListenerEvent::received(GattChannel::Message, DeviceId::new("AA"), b"hi\xff");
        assert_eq!(
            event,
            ListenerEvent::MessageReceived {
                device_id: DeviceId::new("AA"),
                data: "hi\u{FFFD}".to_string(),
            }
        );

        let empty = ListenerEvent::received(GattChannel::Discovery, DeviceId::new("AA"), b"");
        assert_eq!(empty.name(), "discoveryReceived");
        assert_eq!(empty.payload(), json!({"deviceId": "AA", "data": ""}));
    }

    #[test]
    fn test_tagged_serialization() {
        let event = ListenerEvent::DeviceDisconnected {
            device_id: DeviceId::new("CC"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({"event": "deviceDisconnected", "payload": {"deviceId": "CC"}})
        );
    }
}
