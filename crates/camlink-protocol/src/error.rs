//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building or parsing protocol messages.
///
/// Malformed inbound frames are not errors: decoders return `None` and the
/// caller drops the bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message does not fit in a single control frame sequence.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Empty messages have no frame representation.
    #[error("empty message")]
    EmptyMessage,

    /// Bulk frame size outside the supported bounds.
    #[error("bulk frame size {size} out of range ({min}..={max})")]
    FrameSizeOutOfRange { size: usize, min: usize, max: usize },

    /// Source needs more bulk frames than the 16-bit counter can number.
    #[error("source needs {frames} bulk frames (max: {max})")]
    TooManyFrames { frames: usize, max: usize },

    /// Source is longer than the 32-bit length field.
    #[error("source length {size} exceeds the bulk length field")]
    SourceTooLarge { size: usize },

    /// Failed to serialize or parse a JSON envelope.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
