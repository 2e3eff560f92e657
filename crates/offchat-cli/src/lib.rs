//! Offchat CLI library
//!
//! Configuration loading, command dispatch and scripted replay for the `offchat`
//! binary. Replay runs the peripheral against the in-memory transport, so it needs no
//! radio.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod script;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::{AppConfig, IdentityConfig};
pub use error::{CliError, Result};
pub use script::{demo_script, parse_script, ReplayRecord, ScriptRunner, ScriptStep};
