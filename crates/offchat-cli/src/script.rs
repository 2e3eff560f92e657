//! Scripted replay of transport events
//!
//! A script is a JSON array of steps. Each step is fed through the peripheral's
//! transport event sender (or its command handle), then the runner waits for the event
//! loop to apply it and collects what came out: listener events, notifications pushed
//! to peers, read values and write acknowledgements.
//!
//! ```json
//! [
//!   {"op": "start", "username": "alice"},
//!   {"op": "advertise_result", "success": true},
//!   {"op": "connect", "device": "A"},
//!   {"op": "subscribe", "device": "A", "channel": "message"},
//!   {"op": "write", "device": "B", "channel": "message", "data": "hi"}
//! ]
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use offchat_core::GattChannel;
use offchat_peripheral::{
    ListenerReceiver, MockGattTransport, PeripheralBuilder, PeripheralHandle, PeripheralStatus,
    PushedNotification, TransportEventSender,
};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Script Steps
// ----------------------------------------------------------------------------

/// One scripted input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    /// `startAdvertising`; missing fields come from the configured identity
    Start {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        local_name: Option<String>,
    },
    /// Radio reports the outcome of the advertise request
    AdvertiseResult {
        success: bool,
        #[serde(default)]
        error_code: Option<i32>,
    },
    /// `stopAdvertising`
    Stop,
    Connect {
        device: String,
        #[serde(default)]
        name: Option<String>,
        /// Name lookup failed on the radio side
        #[serde(default)]
        name_unavailable: bool,
    },
    Disconnect {
        device: String,
    },
    Subscribe {
        device: String,
        channel: GattChannel,
    },
    Unsubscribe {
        device: String,
        channel: GattChannel,
    },
    /// Raw descriptor write addressed by characteristic UUID
    Descriptor {
        device: String,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    Write {
        device: String,
        channel: GattChannel,
        data: String,
        #[serde(default)]
        response_needed: bool,
    },
    Read {
        device: String,
        channel: GattChannel,
        #[serde(default)]
        offset: usize,
    },
    Status,
}

/// Parse a script from JSON text
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>> {
    serde_json::from_str(text).map_err(|e| CliError::Script(format!("Invalid script: {}", e)))
}

/// Built-in scenario: three peers, one relayed message, a discovery subscribe and a stop
pub fn demo_script() -> Vec<ScriptStep> {
    let connect = |device: &str, name: Option<&str>| ScriptStep::Connect {
        device: device.to_string(),
        name: name.map(str::to_string),
        name_unavailable: false,
    };
    let subscribe = |device: &str, channel| ScriptStep::Subscribe {
        device: device.to_string(),
        channel,
    };

    vec![
        ScriptStep::Start {
            user_id: None,
            username: None,
            local_name: None,
        },
        ScriptStep::AdvertiseResult {
            success: true,
            error_code: None,
        },
        connect("AA:AA:AA:AA:AA:01", Some("Pixel 8")),
        connect("AA:AA:AA:AA:AA:02", None),
        connect("AA:AA:AA:AA:AA:03", Some("Galaxy")),
        subscribe("AA:AA:AA:AA:AA:01", GattChannel::Message),
        subscribe("AA:AA:AA:AA:AA:02", GattChannel::Message),
        subscribe("AA:AA:AA:AA:AA:03", GattChannel::Message),
        subscribe("AA:AA:AA:AA:AA:03", GattChannel::Discovery),
        ScriptStep::Write {
            device: "AA:AA:AA:AA:AA:02".to_string(),
            channel: GattChannel::Message,
            data: r#"{"type":"message","text":"hello nearby"}"#.to_string(),
            response_needed: true,
        },
        ScriptStep::Disconnect {
            device: "AA:AA:AA:AA:AA:01".to_string(),
        },
        ScriptStep::Status,
        ScriptStep::Stop,
    ]
}

// ----------------------------------------------------------------------------
// Replay Output
// ----------------------------------------------------------------------------

/// One line of replay output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayRecord {
    Listener {
        step: usize,
        event: String,
        payload: Value,
    },
    Push {
        step: usize,
        #[serde(flatten)]
        notification: PushedNotification,
    },
    ReadValue {
        step: usize,
        data: String,
    },
    WriteAck {
        step: usize,
        data: Option<String>,
    },
    Status {
        step: usize,
        status: PeripheralStatus,
    },
    Error {
        step: usize,
        message: String,
    },
}

// ----------------------------------------------------------------------------
// Script Runner
// ----------------------------------------------------------------------------

/// Runs scripts against a peripheral backed by the in-memory transport
pub struct ScriptRunner {
    config: AppConfig,
    handle: PeripheralHandle,
    events: TransportEventSender,
    listener: ListenerReceiver,
    transport: Arc<MockGattTransport>,
}

impl ScriptRunner {
    /// Spawn a peripheral on the current runtime
    pub fn new(config: AppConfig) -> Result<Self> {
        let transport = Arc::new(MockGattTransport::new());
        let (handle, listener) = PeripheralBuilder::new(transport.clone())
            .with_config(config.peripheral.clone())
            .spawn()?;
        let events = handle.transport_events();

        Ok(Self {
            config,
            handle,
            events,
            listener,
            transport,
        })
    }

    /// Apply every step in order and collect the output
    pub async fn run(mut self, steps: &[ScriptStep]) -> Result<Vec<ReplayRecord>> {
        info!("Replaying {} steps", steps.len());
        let mut records = Vec::new();

        for (step, input) in steps.iter().enumerate() {
            debug!("Step {}: {:?}", step, input);
            match self.apply(step, input).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(CliError::Offchat(e)) if !e.is_fatal() => records.push(ReplayRecord::Error {
                    step,
                    message: e.to_string(),
                }),
                Err(e) => return Err(e),
            }

            // Barrier: ordered after this step's effects, including its notifications
            self.handle.wait_for_deliveries().await?;
            self.collect(step, &mut records).await;
        }

        self.handle.shutdown().await?;
        Ok(records)
    }

    async fn apply(&self, step: usize, input: &ScriptStep) -> Result<Option<ReplayRecord>> {
        match input {
            ScriptStep::Start {
                user_id,
                username,
                local_name,
            } => {
                let mut identity = self.config.identity.clone();
                if let Some(user_id) = user_id {
                    identity.user_id = user_id.clone();
                }
                if let Some(username) = username {
                    identity.username = username.clone();
                }
                if let Some(local_name) = local_name {
                    identity.local_name = local_name.clone();
                }
                self.handle
                    .start_advertising(identity.to_local_identity())
                    .await?;
            }
            ScriptStep::AdvertiseResult {
                success,
                error_code,
            } => {
                self.events
                    .advertise_start_result(*success, *error_code)
                    .await?;
            }
            ScriptStep::Stop => self.handle.stop_advertising().await?,
            ScriptStep::Connect {
                device,
                name,
                name_unavailable,
            } => {
                if *name_unavailable {
                    self.events
                        .peer_connected_name_unavailable(device.as_str())
                        .await?;
                } else {
                    self.events
                        .peer_connected(device.as_str(), name.clone())
                        .await?;
                }
            }
            ScriptStep::Disconnect { device } => {
                self.events.peer_disconnected(device.as_str()).await?;
            }
            ScriptStep::Subscribe { device, channel } => {
                self.events
                    .descriptor_write(device.as_str(), *channel, true)
                    .await?;
            }
            ScriptStep::Unsubscribe { device, channel } => {
                self.events
                    .descriptor_write(device.as_str(), *channel, false)
                    .await?;
            }
            ScriptStep::Descriptor {
                device,
                characteristic,
                value,
            } => {
                self.events
                    .descriptor_value_write(device.as_str(), characteristic, value)
                    .await?;
            }
            ScriptStep::Write {
                device,
                channel,
                data,
                response_needed,
            } => {
                let ack = self
                    .events
                    .write_request(
                        device.as_str(),
                        *channel,
                        data.as_bytes().to_vec(),
                        *response_needed,
                    )
                    .await?;
                return Ok(Some(ReplayRecord::WriteAck {
                    step,
                    data: ack.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
                }));
            }
            ScriptStep::Read {
                device,
                channel,
                offset,
            } => {
                let value = self
                    .events
                    .read_request(device.as_str(), *channel, *offset)
                    .await?;
                return Ok(Some(ReplayRecord::ReadValue {
                    step,
                    data: String::from_utf8_lossy(&value).into_owned(),
                }));
            }
            ScriptStep::Status => {
                let status = self.handle.status().await?;
                return Ok(Some(ReplayRecord::Status { step, status }));
            }
        }
        Ok(None)
    }

    async fn collect(&mut self, step: usize, records: &mut Vec<ReplayRecord>) {
        while let Ok(event) = self.listener.try_recv() {
            records.push(ReplayRecord::Listener {
                step,
                event: event.name().to_string(),
                payload: event.payload(),
            });
        }
        for notification in self.transport.take_pushes().await {
            records.push(ReplayRecord::Push { step, notification });
        }
    }
}
