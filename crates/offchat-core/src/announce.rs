//! Discovery announcement wire format
//!
//! An announcement is the self-describing identity document a peer receives when it
//! reads or subscribes to the discovery characteristic. On the wire it is a flat UTF-8
//! JSON object:
//!
//! ```json
//! {"id":"<uuid>","type":"discovery","userId":"...","username":"...","timestamp":1700000000000}
//! ```
//!
//! Field names and the literal `type` value are part of the interoperability contract.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Announcement Payload
// ----------------------------------------------------------------------------

/// Type tag of an announcement; only `discovery` exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnouncementKind {
    #[serde(rename = "discovery")]
    Discovery,
}

/// Discovery announcement advertising this device's identity to a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryAnnouncement {
    /// Unique per emission
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnnouncementKind,
    pub user_id: String,
    pub username: String,
    /// Milliseconds since Unix epoch
    pub timestamp: u64,
}

impl DiscoveryAnnouncement {
    /// Create an announcement with a fresh random identifier
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: AnnouncementKind::Discovery,
            user_id: user_id.into(),
            username: username.into(),
            timestamp: timestamp.as_millis(),
        }
    }

    /// Creation time
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::new(self.timestamp)
    }

    /// Serialize to the UTF-8 JSON wire form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse an announcement received from a peer
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
