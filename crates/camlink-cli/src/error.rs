//! CLI error types.

use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] camlink_protocol::ProtocolError),

    #[error("peripheral error: {0}")]
    Server(#[from] camlink_server::ServerError),

    #[error("transfer error: {0}")]
    Transfer(#[from] camlink_server::TransferError),

    #[error("logging setup failed: {0}")]
    Tracing(#[from] camlink_core::TracingError),

    /// A simulation step did not produce the expected result.
    #[error("simulation failed at {step}: {message}")]
    Simulation { step: &'static str, message: String },
}

impl CliError {
    /// Failure of the scripted central at `step`.
    pub fn simulation(step: &'static str, message: impl Into<String>) -> Self {
        Self::Simulation {
            step,
            message: message.into(),
        }
    }
}
