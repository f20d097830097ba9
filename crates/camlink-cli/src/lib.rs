//! CLI, configuration file, simulation driver
//!
//! This crate provides the `camlink` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, CliResult};
