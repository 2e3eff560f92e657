//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a JSON script of transport events against the peripheral
    Replay {
        /// Script file (a JSON array of steps)
        script: PathBuf,
    },
    /// Run the built-in three-peer scenario
    Demo,
    /// Print an example configuration file
    Config,
}
