//! Peripheral configuration

use serde::{Deserialize, Serialize};

use crate::errors::{OffchatError, Result};

/// Longest local name a BLE adapter accepts
const MAX_LOCAL_NAME_BYTES: usize = 248;

/// Longest advertising timeout the radio accepts (3 minutes)
const MAX_ADVERTISE_TIMEOUT_MS: u32 = 180_000;

// ----------------------------------------------------------------------------
// Advertising Settings
// ----------------------------------------------------------------------------

/// Advertising interval trade-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

/// Transmit power for advertising packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    High,
}

/// Settings handed to the radio when advertising starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
    /// Whether centrals may connect
    pub connectable: bool,
    /// Advertising duration limit; 0 advertises until stopped
    pub timeout_ms: u32,
    /// Include the adapter name in the advertisement (the scan response never does)
    pub include_device_name: bool,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self {
            mode: AdvertiseMode::LowLatency,
            tx_power: TxPowerLevel::High,
            connectable: true,
            timeout_ms: 0,
            include_device_name: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Peripheral Configuration
// ----------------------------------------------------------------------------

/// Configuration for the peripheral state machine and its event loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Adapter name used when `startAdvertising` does not supply one
    pub local_name: String,
    /// Capacity of the inbound channel shared by transport events and commands
    pub event_buffer_size: usize,
    /// Notifications queued per peer before new ones are dropped
    pub notification_queue_size: usize,
    /// Listener events buffered for the host before new ones are dropped
    pub listener_buffer_size: usize,
    /// Advertising parameters
    pub advertise: AdvertiseSettings,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            local_name: "Offchat".to_string(),
            event_buffer_size: 256,
            notification_queue_size: 64,
            listener_buffer_size: 1024,
            advertise: AdvertiseSettings::default(),
        }
    }
}

impl PeripheralConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Small buffers for tests
    pub fn testing() -> Self {
        Self {
            event_buffer_size: 16,
            notification_queue_size: 8,
            listener_buffer_size: 64,
            ..Self::default()
        }
    }

    /// Set default local name
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    /// Set inbound channel capacity
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Set per-peer notification queue capacity
    pub fn with_notification_queue_size(mut self, size: usize) -> Self {
        self.notification_queue_size = size;
        self
    }

    /// Set listener buffer capacity
    pub fn with_listener_buffer_size(mut self, size: usize) -> Self {
        self.listener_buffer_size = size;
        self
    }

    /// Set advertising parameters
    pub fn with_advertise_settings(mut self, settings: AdvertiseSettings) -> Self {
        self.advertise = settings;
        self
    }

    /// Pick the name to advertise: the caller's if given, else the configured default
    pub fn resolve_local_name(&self, requested: &str) -> String {
        if requested.trim().is_empty() {
            self.local_name.clone()
        } else {
            requested.to_string()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.local_name.trim().is_empty() {
            return Err(OffchatError::configuration("local_name must not be empty"));
        }
        if self.local_name.len() > MAX_LOCAL_NAME_BYTES {
            return Err(OffchatError::configuration(format!(
                "local_name is {} bytes (max {})",
                self.local_name.len(),
                MAX_LOCAL_NAME_BYTES
            )));
        }
        if self.event_buffer_size == 0 {
            return Err(OffchatError::configuration(
                "event_buffer_size must be greater than 0",
            ));
        }
        if self.notification_queue_size == 0 {
            return Err(OffchatError::configuration(
                "notification_queue_size must be greater than 0",
            ));
        }
        if self.listener_buffer_size == 0 {
            return Err(OffchatError::configuration(
                "listener_buffer_size must be greater than 0",
            ));
        }
        if self.advertise.timeout_ms > MAX_ADVERTISE_TIMEOUT_MS {
            return Err(OffchatError::configuration(format!(
                "advertise.timeout_ms is {} (max {})",
                self.advertise.timeout_ms, MAX_ADVERTISE_TIMEOUT_MS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_plugin() {
        let config = PeripheralConfig::default();
        assert_eq!(config.local_name, "Offchat");
        assert_eq!(config.advertise.mode, AdvertiseMode::LowLatency);
        assert_eq!(config.advertise.tx_power, TxPowerLevel::High);
        assert!(config.advertise.connectable);
        assert_eq!(config.advertise.timeout_ms, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(PeripheralConfig::new().with_local_name("  ").validate().is_err());
        assert!(PeripheralConfig::new()
            .with_local_name("x".repeat(249))
            .validate()
            .is_err());
        assert!(PeripheralConfig::new()
            .with_event_buffer_size(0)
            .validate()
            .is_err());
        assert!(PeripheralConfig::new()
            .with_notification_queue_size(0)
            .validate()
            .is_err());
        assert!(PeripheralConfig::new()
            .with_listener_buffer_size(0)
            .validate()
            .is_err());

        let settings = AdvertiseSettings {
            timeout_ms: 180_001,
            ..AdvertiseSettings::default()
        };
        assert!(PeripheralConfig::new()
            .with_advertise_settings(settings)
            .validate()
            .is_err());
    }

    #[test]
    fn test_local_name_resolution() {
        let config = PeripheralConfig::new().with_local_name("Fallback");
        assert_eq!(config.resolve_local_name(""), "Fallback");
        assert_eq!(config.resolve_local_name("Mine"), "Mine");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PeripheralConfig =
            serde_json::from_str(r#"{"advertise": {"mode": "balanced"}}"#).unwrap();
        assert_eq!(config.local_name, "Offchat");
        assert_eq!(config.advertise.mode, AdvertiseMode::Balanced);
        assert_eq!(config.advertise.tx_power, TxPowerLevel::High);
    }
}
