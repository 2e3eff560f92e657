//! GATT schema for the Offchat service
//!
//! One primary service with two characteristics, `message` and `discovery`. Both are
//! readable, writable and notifiable, and both carry the standard Client
//! Characteristic Configuration descriptor through which peers subscribe.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{OffchatError, Result};

// ----------------------------------------------------------------------------
// Service, Characteristic and Descriptor UUIDs
// ----------------------------------------------------------------------------

/// Offchat primary service UUID
pub const OFFCHAT_SERVICE_UUID: Uuid = Uuid::from_u128(0x19b10000_e8f2_537e_4f6c_d104768a1214);

/// Characteristic carrying chat payloads
pub const MESSAGE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x19b10001_e8f2_537e_4f6c_d104768a1214);

/// Characteristic carrying discovery announcements
pub const DISCOVERY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x19b10002_e8f2_537e_4f6c_d104768a1214);

/// Client Characteristic Configuration descriptor (0x2902)
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

// ----------------------------------------------------------------------------
// Logical Channels
// ----------------------------------------------------------------------------

/// One of the two logical lines exposed by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GattChannel {
    Message,
    Discovery,
}

impl GattChannel {
    pub const ALL: [GattChannel; 2] = [GattChannel::Message, GattChannel::Discovery];

    /// Characteristic UUID backing this channel
    pub fn characteristic_uuid(self) -> Uuid {
        match self {
            GattChannel::Message => MESSAGE_CHARACTERISTIC_UUID,
            GattChannel::Discovery => DISCOVERY_CHARACTERISTIC_UUID,
        }
    }

    /// Descriptor UUID that carries subscribe/unsubscribe for this channel
    pub fn descriptor_uuid(self) -> Uuid {
        CLIENT_CHARACTERISTIC_CONFIG_UUID
    }

    /// Map a characteristic UUID back to its channel
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.characteristic_uuid() == *uuid)
    }

    /// Like [`GattChannel::from_uuid`] but reports unknown characteristics as `NotFound`
    pub fn resolve(uuid: &Uuid) -> Result<Self> {
        Self::from_uuid(uuid)
            .ok_or_else(|| OffchatError::not_found(format!("characteristic {}", uuid)))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GattChannel::Message => "message",
            GattChannel::Discovery => "discovery",
        }
    }
}

impl fmt::Display for GattChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Service Definition
// ----------------------------------------------------------------------------

/// Characteristic properties advertised to centrals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

impl CharacteristicProperties {
    /// READ | WRITE | NOTIFY
    pub const READ_WRITE_NOTIFY: Self = Self {
        read: true,
        write: true,
        write_without_response: false,
        notify: true,
    };
}

/// Attribute permissions required to access a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePermissions {
    pub read: bool,
    pub write: bool,
}

impl AttributePermissions {
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };
}

/// One characteristic of the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicDefinition {
    pub channel: GattChannel,
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub permissions: AttributePermissions,
    pub descriptors: Vec<Uuid>,
}

/// Service layout the transport registers when the GATT server opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<CharacteristicDefinition>,
}

impl ServiceDefinition {
    /// The Offchat service: both channels with READ | WRITE | NOTIFY and a CCCD each
    pub fn offchat() -> Self {
        let characteristics = GattChannel::ALL
            .into_iter()
            .map(|channel| CharacteristicDefinition {
                channel,
                uuid: channel.characteristic_uuid(),
                properties: CharacteristicProperties::READ_WRITE_NOTIFY,
                permissions: AttributePermissions::READ_WRITE,
                descriptors: vec![channel.descriptor_uuid()],
            })
            .collect();

        Self {
            uuid: OFFCHAT_SERVICE_UUID,
            primary: true,
            characteristics,
        }
    }

    /// Look up the characteristic for a channel
    pub fn characteristic(&self, channel: GattChannel) -> Option<&CharacteristicDefinition> {
        self.characteristics.iter().find(|c| c.channel == channel)
    }
}

impl Default for ServiceDefinition {
    fn default() -> Self {
        Self::offchat()
    }
}

// ----------------------------------------------------------------------------
// Subscription Descriptor Values
// ----------------------------------------------------------------------------

/// Decoded value of a Client Characteristic Configuration write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionRequest {
    Notify,
    Indicate,
    Disable,
}

impl SubscriptionRequest {
    pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
    pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
    pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

    /// Decode the little-endian CCCD bitfield (bit 0 notify, bit 1 indicate)
    pub fn from_cccd_value(value: &[u8]) -> Result<Self> {
        let bits = match value {
            [low, high] => u16::from_le_bytes([*low, *high]),
            _ => {
                return Err(OffchatError::InvalidDescriptorValue {
                    value: format!("{:02x?}", value),
                })
            }
        };

        match bits {
            0x0000 => Ok(Self::Disable),
            // Notify wins when a central asks for both
            0x0001 | 0x0003 => Ok(Self::Notify),
            0x0002 => Ok(Self::Indicate),
            _ => Err(OffchatError::InvalidDescriptorValue {
                value: format!("{:02x?}", value),
            }),
        }
    }

    /// Encode back to the two-byte descriptor value
    pub fn to_cccd_value(self) -> [u8; 2] {
        match self {
            Self::Notify => Self::ENABLE_NOTIFICATION_VALUE,
            Self::Indicate => Self::ENABLE_INDICATION_VALUE,
            Self::Disable => Self::DISABLE_NOTIFICATION_VALUE,
        }
    }

    /// Whether the request turns pushes on
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Disable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_strings_match_protocol() {
        assert_eq!(
            OFFCHAT_SERVICE_UUID.to_string(),
            "19b10000-e8f2-537e-4f6c-d104768a1214"
        );
        assert_eq!(
            MESSAGE_CHARACTERISTIC_UUID.to_string(),
            "19b10001-e8f2-537e-4f6c-d104768a1214"
        );
        assert_eq!(
            DISCOVERY_CHARACTERISTIC_UUID.to_string(),
            "19b10002-e8f2-537e-4f6c-d104768a1214"
        );
        assert_eq!(
            CLIENT_CHARACTERISTIC_CONFIG_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_channel_uuid_resolution() {
        for channel in GattChannel::ALL {
            assert_eq!(GattChannel::from_uuid(&channel.characteristic_uuid()), Some(channel));
        }
        assert_eq!(GattChannel::from_uuid(&OFFCHAT_SERVICE_UUID), None);
        assert!(matches!(
            GattChannel::resolve(&CLIENT_CHARACTERISTIC_CONFIG_UUID),
            Err(OffchatError::NotFound { .. })
        ));
    }

    #[test]
    fn test_offchat_service_layout() {
        let service = ServiceDefinition::offchat();
        assert!(service.primary);
        assert_eq!(service.characteristics.len(), 2);

        let discovery = service.characteristic(GattChannel::Discovery).unwrap();
        assert_eq!(discovery.uuid, DISCOVERY_CHARACTERISTIC_UUID);
        assert_eq!(discovery.properties, CharacteristicProperties::READ_WRITE_NOTIFY);
        assert_eq!(discovery.descriptors, vec![CLIENT_CHARACTERISTIC_CONFIG_UUID]);
    }

    #[test]
    fn test_cccd_decoding() {
        assert_eq!(
            SubscriptionRequest::from_cccd_value(&[0x01, 0x00]).unwrap(),
            SubscriptionRequest::Notify
        );
        assert_eq!(
            SubscriptionRequest::from_cccd_value(&[0x02, 0x00]).unwrap(),
            SubscriptionRequest::Indicate
        );
        assert_eq!(
            SubscriptionRequest::from_cccd_value(&[0x03, 0x00]).unwrap(),
            SubscriptionRequest::Notify
        );
        assert_eq!(
            SubscriptionRequest::from_cccd_value(&[0x00, 0x00]).unwrap(),
            SubscriptionRequest::Disable
        );
        assert!(SubscriptionRequest::from_cccd_value(&[0x01]).is_err());
        assert!(SubscriptionRequest::from_cccd_value(&[0x04, 0x00]).is_err());
        assert!(SubscriptionRequest::from_cccd_value(&[]).is_err());
    }

    #[test]
    fn test_cccd_encoding() {
        assert_eq!(SubscriptionRequest::Indicate.to_cccd_value(), [0x02, 0x00]);
        assert!(SubscriptionRequest::Indicate.is_enabled());
        assert!(!SubscriptionRequest::Disable.is_enabled());
    }
}
