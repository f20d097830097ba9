//! Subcommand implementations.

pub mod config;
pub mod encode;
pub mod simulate;
