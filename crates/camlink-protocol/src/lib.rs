//! Wire protocol for the camlink peripheral.
//!
//! The link underneath carries at most 20 bytes per write or notification, so
//! every message is cut into fixed-size frames.
//!
//! # Frame layouts
//!
//! Control frames (commands and status pages) are always 20 bytes:
//!
//! ```text
//! +------+-------+-----+----------------+--------------------+
//! | 0xAA | total | seq | length (u16 BE)| payload (15 bytes) |
//! +------+-------+-----+----------------+--------------------+
//! ```
//!
//! Bulk frames (file delivery) are `frame_size` bytes, where the frame size is
//! negotiated by the central:
//!
//! ```text
//! +------+-----------------+---------------+------------------+-----------------------+
//! | 0xAB | total (u16 BE)  | seq (u16 BE)  | total len (u32 BE)| payload (size - 9)   |
//! +------+-----------------+---------------+------------------+-----------------------+
//! ```
//!
//! Sequence numbers are 1-indexed in both layouts.
//!
//! # Example
//!
//! ```rust
//! use camlink_protocol::{ControlFrame, split_message};
//!
//! let frames = split_message(b"{\"event\":\"start_recording\"}").unwrap();
//! let bytes = frames[0].encode();
//! assert_eq!(ControlFrame::decode(&bytes), Some(frames[0].clone()));
//! ```

mod bulk;
mod channel;
mod error;
mod frame;
mod types;

pub use bulk::{AssemblyProgress, BulkAssembler};
pub use channel::{Channel, SERVICE_UUID};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{BulkFrame, BulkSegments, ControlFrame, hex, segment_bulk, split_message};
pub use types::{
    EventKind, LiveAuthUris, NegotiationEnvelope, PendingUpload, RecordingData, RecordingEvent,
    ResponseEnvelope,
};

/// Size of every control frame on the wire.
pub const CONTROL_FRAME_LEN: usize = 20;

/// Payload bytes carried by one control frame.
pub const CONTROL_PAYLOAD_LEN: usize = 15;

/// Header bytes in front of a control frame payload.
pub const CONTROL_HEADER_LEN: usize = 5;

/// First byte of a control frame.
pub const CONTROL_MARKER: u8 = 0xAA;

/// First byte of a bulk frame.
pub const BULK_MARKER: u8 = 0xAB;

/// Header bytes in front of a bulk frame payload, independent of frame size.
pub const BULK_HEADER_LEN: usize = 9;

/// Bulk frame size used until the central negotiates another one.
pub const DEFAULT_BULK_FRAME_SIZE: usize = 512;

/// Largest bulk frame size a central may negotiate.
pub const MAX_BULK_FRAME_SIZE: usize = 4096;

/// Smallest bulk frame size that still carries one payload byte.
pub const MIN_BULK_FRAME_SIZE: usize = BULK_HEADER_LEN + 1;

/// Largest message that fits in one control frame sequence.
pub const MAX_CONTROL_MESSAGE_LEN: usize = u8::MAX as usize * CONTROL_PAYLOAD_LEN;
