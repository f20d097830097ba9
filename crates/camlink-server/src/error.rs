//! Server error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::transport::SubscriberId;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the peripheral.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] camlink_protocol::ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Failures reported by the transport underneath.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("channel {channel} does not exist")]
    UnknownChannel { channel: Uuid },

    #[error("subscriber {subscriber} is not listening on {channel}")]
    NotSubscribed {
        channel: Uuid,
        subscriber: SubscriberId,
    },

    #[error("notify to subscriber {subscriber} failed: {message}")]
    SendFailed {
        subscriber: SubscriberId,
        message: String,
    },
}

impl TransportError {
    /// A failed send to `subscriber`.
    pub fn send_failed(subscriber: SubscriberId, message: impl Into<String>) -> Self {
        Self::SendFailed {
            subscriber,
            message: message.into(),
        }
    }
}

/// Why a bulk transfer did not run or did not finish.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("a transfer of {current} is already in progress")]
    Busy { current: String },

    #[error("bulk channel {channel} not found")]
    ChannelNotFound { channel: Uuid },

    #[error("no subscribers on bulk channel {channel}")]
    NoSubscribers { channel: Uuid },

    #[error("byte source {} is missing", path.display())]
    SourceMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("send failed after {frames_sent} frames: {source}")]
    Send {
        frames_sent: usize,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Protocol(#[from] camlink_protocol::ProtocolError),
}

impl TransferError {
    /// Returns true if the transfer was refused before sending anything.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Busy { .. }
                | Self::ChannelNotFound { .. }
                | Self::NoSubscribers { .. }
                | Self::SourceMissing { .. }
        )
    }
}

/// A read on a channel whose page sequence cannot be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("no pages left for channel")]
    Exhausted,
}
