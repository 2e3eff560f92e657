//! Core types for the Offchat peripheral
//!
//! Newtypes for transport-level peer identity and millisecond timestamps, the time
//! source abstraction, and the advertising lifecycle states.

use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Device Identifier
// ----------------------------------------------------------------------------

/// Transport-level identity of a connected peer (a Bluetooth address on real radios)
///
/// The identifier is opaque to the core: it is only compared, hashed and echoed back
/// to the transport and the listener.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier from any string-like address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Borrow the address string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for DeviceId {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of timestamps, injectable for deterministic tests
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// System time source implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Lifecycle State
// ----------------------------------------------------------------------------

/// Advertising lifecycle of the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Advertising,
    Stopping,
}

impl LifecycleState {
    /// Whether the service is live and accepting peers
    pub fn is_advertising(&self) -> bool {
        *self == LifecycleState::Advertising
    }

    /// Collapse the lifecycle into the boolean view external callers query
    pub fn advertising_state(&self) -> AdvertisingState {
        if self.is_advertising() {
            AdvertisingState::Advertising
        } else {
            AdvertisingState::Idle
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Advertising => "advertising",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Process-wide advertising flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvertisingState {
    Idle,
    Advertising,
}

// ----------------------------------------------------------------------------
// Advertise Error Codes
// ----------------------------------------------------------------------------

/// Error code reported by the radio when advertising fails to start
///
/// Codes follow the Android `AdvertiseCallback` numbering, which is what the peers
/// running this protocol report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdvertiseErrorCode(i32);

impl AdvertiseErrorCode {
    pub const DATA_TOO_LARGE: Self = Self(1);
    pub const TOO_MANY_ADVERTISERS: Self = Self(2);
    pub const ALREADY_STARTED: Self = Self(3);
    pub const INTERNAL_ERROR: Self = Self(4);
    pub const FEATURE_UNSUPPORTED: Self = Self(5);

    pub fn new(code: i32) -> Self {
        Self(code)
    }

    pub fn code(&self) -> i32 {
        self.0
    }

    /// Human-readable name for logs
    pub fn description(&self) -> &'static str {
        match self.0 {
            1 => "advertise data too large",
            2 => "too many advertisers",
            3 => "advertising already started",
            4 => "internal radio error",
            5 => "advertising feature unsupported",
            _ => "unknown advertise error",
        }
    }
}

impl fmt::Display for AdvertiseErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.description())
    }
}
