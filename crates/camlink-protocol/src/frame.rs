//! Control and bulk frame codec.
//!
//! Encoding is pure. Decoding returns `None` for anything that is not a
//! well-formed frame (wrong length, wrong marker, sequence outside
//! `1..=total`); callers drop such input silently.

use std::iter::FusedIterator;

use crate::error::{ProtocolError, ProtocolResult};
use crate::{
    BULK_HEADER_LEN, BULK_MARKER, CONTROL_FRAME_LEN, CONTROL_HEADER_LEN, CONTROL_MARKER,
    CONTROL_PAYLOAD_LEN, MAX_BULK_FRAME_SIZE, MAX_CONTROL_MESSAGE_LEN, MIN_BULK_FRAME_SIZE,
};

/// A single 20-byte control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    /// Number of frames in the message (1-255).
    pub total_count: u8,
    /// Position of this frame in the message, 1-indexed.
    pub sequence: u8,
    /// Payload bytes across all frames of the message.
    pub declared_length: u16,
    /// Payload chunk, zero-padded on the final frame.
    pub payload: [u8; CONTROL_PAYLOAD_LEN],
}

impl ControlFrame {
    /// Creates a frame from a payload chunk of at most 15 bytes.
    ///
    /// Shorter chunks are zero-padded; bytes beyond the 15th are ignored.
    pub fn new(total_count: u8, sequence: u8, declared_length: u16, chunk: &[u8]) -> Self {
        let mut payload = [0u8; CONTROL_PAYLOAD_LEN];
        let len = chunk.len().min(CONTROL_PAYLOAD_LEN);
        payload[..len].copy_from_slice(&chunk[..len]);
        Self {
            total_count,
            sequence,
            declared_length,
            payload,
        }
    }

    /// Encodes the frame to its wire representation.
    pub fn encode(&self) -> [u8; CONTROL_FRAME_LEN] {
        let mut bytes = [0u8; CONTROL_FRAME_LEN];
        bytes[0] = CONTROL_MARKER;
        bytes[1] = self.total_count;
        bytes[2] = self.sequence;
        bytes[3..5].copy_from_slice(&self.declared_length.to_be_bytes());
        bytes[CONTROL_HEADER_LEN..].copy_from_slice(&self.payload);
        bytes
    }

    /// Decodes a control frame, or returns `None` for non-protocol bytes.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CONTROL_FRAME_LEN || bytes[0] != CONTROL_MARKER {
            return None;
        }

        let total_count = bytes[1];
        let sequence = bytes[2];
        if sequence == 0 || sequence > total_count {
            return None;
        }

        let mut payload = [0u8; CONTROL_PAYLOAD_LEN];
        payload.copy_from_slice(&bytes[CONTROL_HEADER_LEN..]);

        Some(Self {
            total_count,
            sequence,
            declared_length: u16::from_be_bytes([bytes[3], bytes[4]]),
            payload,
        })
    }
}

/// Splits a message into the control frames that carry it.
///
/// # Example
///
/// ```rust
/// use camlink_protocol::split_message;
///
/// let frames = split_message(&[b'x'; 35]).unwrap();
/// assert_eq!(frames.len(), 3);
/// assert_eq!(frames[2].payload[5], 0);
/// ```
pub fn split_message(message: &[u8]) -> ProtocolResult<Vec<ControlFrame>> {
    if message.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if message.len() > MAX_CONTROL_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLarge {
            size: message.len(),
            max: MAX_CONTROL_MESSAGE_LEN,
        });
    }

    // Both casts are bounded by MAX_CONTROL_MESSAGE_LEN.
    let declared_length = message.len() as u16;
    let total_count = message.len().div_ceil(CONTROL_PAYLOAD_LEN) as u8;

    Ok(message
        .chunks(CONTROL_PAYLOAD_LEN)
        .zip(1..=total_count)
        .map(|(chunk, sequence)| ControlFrame::new(total_count, sequence, declared_length, chunk))
        .collect())
}

/// A single bulk frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFrame {
    /// Number of frames in the transfer.
    pub total_count: u16,
    /// Position of this frame in the transfer, 1-indexed.
    pub sequence: u16,
    /// Length of the whole source, repeated in every frame.
    pub total_length: u32,
    /// Payload chunk. Only the last frame may be shorter than the capacity.
    pub payload: Vec<u8>,
}

impl BulkFrame {
    /// Payload bytes one frame of `frame_size` bytes can carry.
    pub fn payload_capacity(frame_size: usize) -> usize {
        frame_size.saturating_sub(BULK_HEADER_LEN)
    }

    /// Encodes the frame into exactly `frame_size` bytes, zero-filling the tail.
    pub fn encode(&self, frame_size: usize) -> ProtocolResult<Vec<u8>> {
        check_frame_size(frame_size)?;
        let capacity = Self::payload_capacity(frame_size);
        if self.payload.len() > capacity {
            return Err(ProtocolError::MessageTooLarge {
                size: self.payload.len(),
                max: capacity,
            });
        }

        let mut bytes = vec![0u8; frame_size];
        bytes[0] = BULK_MARKER;
        bytes[1..3].copy_from_slice(&self.total_count.to_be_bytes());
        bytes[3..5].copy_from_slice(&self.sequence.to_be_bytes());
        bytes[5..9].copy_from_slice(&self.total_length.to_be_bytes());
        bytes[BULK_HEADER_LEN..BULK_HEADER_LEN + self.payload.len()]
            .copy_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Decodes a bulk frame; the frame size is the length of `bytes`.
    ///
    /// The zero fill of the last frame is stripped using the total length.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if check_frame_size(bytes.len()).is_err() || bytes[0] != BULK_MARKER {
            return None;
        }

        let total_count = u16::from_be_bytes([bytes[1], bytes[2]]);
        let sequence = u16::from_be_bytes([bytes[3], bytes[4]]);
        if sequence == 0 || sequence > total_count {
            return None;
        }
        let total_length = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

        let capacity = Self::payload_capacity(bytes.len());
        let mut payload = bytes[BULK_HEADER_LEN..].to_vec();
        if sequence == total_count {
            let preceding = (usize::from(total_count) - 1) * capacity;
            let remaining = (total_length as usize).saturating_sub(preceding);
            if remaining <= capacity {
                payload.truncate(remaining);
            }
        }

        Some(Self {
            total_count,
            sequence,
            total_length,
            payload,
        })
    }
}

fn check_frame_size(frame_size: usize) -> ProtocolResult<()> {
    if (MIN_BULK_FRAME_SIZE..=MAX_BULK_FRAME_SIZE).contains(&frame_size) {
        Ok(())
    } else {
        Err(ProtocolError::FrameSizeOutOfRange {
            size: frame_size,
            min: MIN_BULK_FRAME_SIZE,
            max: MAX_BULK_FRAME_SIZE,
        })
    }
}

/// Lazily cuts a byte source into bulk frames.
///
/// Created by [`segment_bulk`].
#[derive(Debug, Clone)]
pub struct BulkSegments<'a> {
    chunks: std::slice::Chunks<'a, u8>,
    total_count: u16,
    total_length: u32,
    next_sequence: u16,
}

impl Iterator for BulkSegments<'_> {
    type Item = BulkFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        Some(BulkFrame {
            total_count: self.total_count,
            sequence,
            total_length: self.total_length,
            payload: chunk.to_vec(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for BulkSegments<'_> {}

impl FusedIterator for BulkSegments<'_> {}

impl BulkSegments<'_> {
    /// Number of frames the whole source produces.
    pub fn total_count(&self) -> u16 {
        self.total_count
    }

    /// Length of the whole source.
    pub fn total_length(&self) -> u32 {
        self.total_length
    }
}

/// Segments `source` into bulk frames sized for `frame_size`.
///
/// An empty source yields no frames.
///
/// # Example
///
/// ```rust
/// use camlink_protocol::segment_bulk;
///
/// let source = vec![7u8; 2000];
/// let frames: Vec<_> = segment_bulk(&source, 512).unwrap().collect();
/// assert_eq!(frames.len(), 4);
/// assert_eq!(frames[3].payload.len(), 491);
/// ```
pub fn segment_bulk(source: &[u8], frame_size: usize) -> ProtocolResult<BulkSegments<'_>> {
    check_frame_size(frame_size)?;

    let total_length = u32::try_from(source.len())
        .map_err(|_| ProtocolError::SourceTooLarge { size: source.len() })?;

    let capacity = BulkFrame::payload_capacity(frame_size);
    let frames = source.len().div_ceil(capacity);
    let total_count = u16::try_from(frames).map_err(|_| ProtocolError::TooManyFrames {
        frames,
        max: u16::MAX as usize,
    })?;

    Ok(BulkSegments {
        chunks: source.chunks(capacity),
        total_count,
        total_length,
        next_sequence: 1,
    })
}

/// Uppercase hex bytes separated by spaces, as frames are shown in logs.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
