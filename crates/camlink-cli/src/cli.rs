//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// camlink - simulated camera peripheral
#[derive(Debug, Parser)]
#[command(name = "camlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CAMLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json (overrides the config file)
    #[arg(long)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scripted central against a simulated peripheral
    Simulate {
        /// File delivered as the preview transfer (defaults to the configured
        /// preview source, then to generated data)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Bulk frame size the central negotiates
        #[arg(long)]
        packet_size: Option<usize>,

        /// Number of centrals subscribed to the file transfer channel
        #[arg(long, default_value = "2")]
        subscribers: usize,
    },

    /// Print the frames carrying a message, in hex
    Encode {
        /// Message text
        text: String,

        /// Encode as bulk frames of this size instead of control frames
        #[arg(long)]
        bulk: Option<usize>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
