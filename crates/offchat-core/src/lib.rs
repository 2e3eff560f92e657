//! Offchat Core Protocol Vocabulary
//!
//! This crate provides the types shared by every part of the Offchat BLE peripheral:
//! peer identifiers and timestamps, the fixed GATT schema (service, characteristics,
//! subscribe descriptor), the discovery announcement wire format, the listener event
//! model handed to the host application, configuration, and the error taxonomy.
//!
//! The state machine that uses these types lives in `offchat-peripheral`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod announce;
pub mod config;
pub mod errors;
pub mod events;
pub mod gatt;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use announce::{AnnouncementKind, DiscoveryAnnouncement};
pub use config::{AdvertiseMode, AdvertiseSettings, PeripheralConfig, TxPowerLevel};
pub use errors::{OffchatError, Result};
pub use events::{ListenerEvent, UNKNOWN_DEVICE_NAME};
pub use gatt::{
    AttributePermissions, CharacteristicDefinition, CharacteristicProperties, GattChannel,
    ServiceDefinition, SubscriptionRequest, CLIENT_CHARACTERISTIC_CONFIG_UUID,
    DISCOVERY_CHARACTERISTIC_UUID, MESSAGE_CHARACTERISTIC_UUID, OFFCHAT_SERVICE_UUID,
};
pub use types::{
    AdvertiseErrorCode, AdvertisingState, DeviceId, LifecycleState, SystemTimeSource,
    TimeSource, Timestamp,
};
