//! Offchat CLI Configuration
//!
//! Configuration is read from a TOML file (`--config offchat.toml`); every field has a
//! default, so a partial file only overrides what it names:
//!
//! ```toml
//! [identity]
//! user_id = "user-1"
//! username = "alice"
//!
//! [peripheral]
//! local_name = "Offchat"
//!
//! [peripheral.advertise]
//! mode = "low_latency"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use offchat_core::PeripheralConfig;
use offchat_peripheral::LocalIdentity;

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Identity announced to peers when a script does not supply one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_id: String,
    pub username: String,
    /// Adapter name; empty uses `peripheral.local_name`
    pub local_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_id: "offchat-local".to_string(),
            username: "Anonymous".to_string(),
            local_name: String::new(),
        }
    }
}

impl IdentityConfig {
    pub fn to_local_identity(&self) -> LocalIdentity {
        LocalIdentity::new(&self.user_id, &self.username).with_local_name(&self.local_name)
    }
}

/// Complete configuration for the Offchat CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub peripheral: PeripheralConfig,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.identity.user_id.trim().is_empty() {
            return Err(CliError::Config("identity.user_id must not be empty".to_string()));
        }
        if self.identity.username.trim().is_empty() {
            return Err(CliError::Config("identity.username must not be empty".to_string()));
        }
        self.peripheral.validate()?;
        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> Result<String> {
        let example = AppConfig {
            identity: IdentityConfig {
                user_id: "3f2a9c1e".to_string(),
                username: "alice".to_string(),
                local_name: "Alice's Phone".to_string(),
            },
            ..Default::default()
        };
        Ok(toml::to_string_pretty(&example)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
