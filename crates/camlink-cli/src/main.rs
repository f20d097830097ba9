//! camlink CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use camlink_cli::cli::{Cli, Command, ConfigAction};
use camlink_cli::commands::{self, simulate::SimulateOptions};
use camlink_cli::config::CliConfig;
use camlink_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = match cli.config {
        Some(ref path) => CliConfig::load_from(path)?,
        None => CliConfig::load()?,
    };

    camlink_core::init_tracing(config.tracing_config(cli.debug, cli.log_format.as_deref())?)?;

    match cli.command {
        Command::Simulate {
            file,
            packet_size,
            subscribers,
        } => {
            commands::simulate::run(
                config.server_config(),
                SimulateOptions {
                    file,
                    packet_size,
                    subscribers,
                },
            )
            .await
        }
        Command::Encode { text, bulk } => commands::encode::run(&text, bulk),
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, cli.config.as_deref()),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(cli.config.as_deref()),
        },
    }
}
