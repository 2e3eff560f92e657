//! Error types for the Offchat peripheral
//!
//! `OffchatError` carries the whole taxonomy: command-level failures
//! (`UnsupportedOperation`, `InvalidState`), transport failures (`TransportDenied`,
//! `Transport`), lookups that miss (`NotFound`), and the plumbing errors that end the
//! event loop (`Channel`, `Configuration`).

use thiserror::Error;

use crate::types::LifecycleState;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Core error type for the Offchat peripheral
#[derive(Debug, Error)]
pub enum OffchatError {
    #[error("Unsupported operation: {reason}")]
    UnsupportedOperation { reason: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("Transport denied: {reason}")]
    TransportDenied { reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid descriptor value: {value}")]
    InvalidDescriptorValue { value: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel error: {reason}")]
    Channel { reason: String },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },
}

impl OffchatError {
    /// Create an unsupported-operation error
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            reason: reason.into(),
        }
    }

    /// Create a transport-denied (permission/security) error
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::TransportDenied {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a generic transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a channel error
    pub fn channel(reason: impl Into<String>) -> Self {
        Self::Channel {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether this error means the event loop can no longer make progress
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Channel { .. } | Self::Configuration { .. })
    }
}

/// Result type used throughout the Offchat crates
pub type Result<T> = core::result::Result<T, OffchatError>;
