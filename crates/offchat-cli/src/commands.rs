//! Command handlers for the Offchat CLI

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::script::{demo_script, parse_script, ReplayRecord, ScriptRunner, ScriptStep};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Replay { script } => Self::handle_replay_command(config, &script).await,
            Commands::Demo => Self::handle_demo_command(config).await,
            Commands::Config => Self::handle_config_command(),
        }
    }

    /// Replay a script file and print the output as JSON lines
    async fn handle_replay_command(config: AppConfig, path: &Path) -> Result<()> {
        info!("Replaying script {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::Script(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let steps = parse_script(&text)?;
        Self::replay_and_print(config, &steps).await
    }

    async fn handle_demo_command(config: AppConfig) -> Result<()> {
        info!("Running built-in demo scenario");
        Self::replay_and_print(config, &demo_script()).await
    }

    fn handle_config_command() -> Result<()> {
        print!("{}", AppConfig::example_config()?);
        Ok(())
    }

    async fn replay_and_print(config: AppConfig, steps: &[ScriptStep]) -> Result<()> {
        let records = ScriptRunner::new(config)?.run(steps).await?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        Self::write_records(&mut out, &records)?;
        out.flush()?;
        Ok(())
    }

    /// Write one JSON object per line
    pub fn write_records<W: Write>(out: &mut W, records: &[ReplayRecord]) -> Result<()> {
        for record in records {
            serde_json::to_writer(&mut *out, record)?;
            writeln!(out)?;
        }
        Ok(())
    }
}
