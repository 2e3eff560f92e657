//! Advertising session
//!
//! A session holds everything that only exists while the service is live: the local
//! identity announced to peers and the peer registry. It is built by `start` and
//! dropped by `stop`, so a restarted peripheral never sees state from the previous run.

use serde::{Deserialize, Serialize};

use offchat_core::Timestamp;

use crate::registry::PeerRegistry;

/// Identity this device announces to peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIdentity {
    pub user_id: String,
    pub username: String,
    /// Adapter name requested for this session; empty uses the configured default
    #[serde(default)]
    pub local_name: String,
}

impl LocalIdentity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            local_name: String::new(),
        }
    }

    /// Request a specific adapter name
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }
}

/// State owned by one start/stop cycle
#[derive(Debug)]
pub struct Session {
    pub identity: LocalIdentity,
    pub registry: PeerRegistry,
    pub started_at: Timestamp,
}

impl Session {
    pub fn new(identity: LocalIdentity, started_at: Timestamp) -> Self {
        Self {
            identity,
            registry: PeerRegistry::new(),
            started_at,
        }
    }
}
