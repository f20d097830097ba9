//! Bulk frame size negotiation.
//!
//! The central proposes a frame size on the negotiation channel, as a bare
//! decimal, as `{"data": n}`, or as four raw bytes (big-endian). Values in
//! `1..=4096` replace the current size; anything else is ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use camlink_protocol::{DEFAULT_BULK_FRAME_SIZE, MAX_BULK_FRAME_SIZE, NegotiationEnvelope};
use tracing::{debug, info, warn};

/// Shared handle to the current bulk frame size.
///
/// Clones observe the same value. Readers may see a value that is about to
/// be replaced; negotiation is expected to finish before a transfer starts.
#[derive(Debug, Clone)]
pub struct NegotiatedSize(Arc<AtomicUsize>);

impl Default for NegotiatedSize {
    fn default() -> Self {
        Self::new(DEFAULT_BULK_FRAME_SIZE)
    }
}

impl NegotiatedSize {
    /// New handle holding `initial`.
    pub fn new(initial: usize) -> Self {
        Self(Arc::new(AtomicUsize::new(initial)))
    }

    /// Current frame size in bytes.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn swap(&self, value: usize) -> usize {
        self.0.swap(value, Ordering::AcqRel)
    }
}

/// What a negotiation message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    Applied { previous: usize, current: usize },
    /// Parsed but out of bounds; the size is unchanged.
    Rejected { value: i64 },
    /// No size found in the message.
    Unparsable,
}

/// Applies negotiation messages to a [`NegotiatedSize`].
#[derive(Debug, Clone, Default)]
pub struct PacketSizeNegotiator {
    size: NegotiatedSize,
}

impl PacketSizeNegotiator {
    /// Negotiator writing into `size`.
    pub fn new(size: NegotiatedSize) -> Self {
        Self { size }
    }

    /// Handle shared with the transfer engine.
    pub fn size(&self) -> NegotiatedSize {
        self.size.clone()
    }

    /// Frame size in effect.
    pub fn current(&self) -> usize {
        self.size.get()
    }

    /// Parses `message` and applies the size if it is within bounds.
    pub fn apply(&self, message: &[u8]) -> NegotiationOutcome {
        let Some(value) = parse_packet_size(message) else {
            debug!(len = message.len(), "No packet size in negotiation message");
            return NegotiationOutcome::Unparsable;
        };

        match usize::try_from(value) {
            Ok(size) if size > 0 && size <= MAX_BULK_FRAME_SIZE => {
                let previous = self.size.swap(size);
                info!(previous, current = size, "Packet size negotiated");
                NegotiationOutcome::Applied {
                    previous,
                    current: size,
                }
            }
            _ => {
                warn!(
                    value,
                    current = self.size.get(),
                    max = MAX_BULK_FRAME_SIZE,
                    "Packet size out of bounds, keeping current"
                );
                NegotiationOutcome::Rejected { value }
            }
        }
    }
}

/// Extracts a proposed frame size. The first form that parses wins:
/// JSON object with `data`, bare integer text, then four big-endian bytes.
pub fn parse_packet_size(message: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(message).ok().map(str::trim);

    if let Some(text) = text {
        if text.starts_with('{') {
            if let Some(size) = serde_json::from_str::<NegotiationEnvelope>(text)
                .ok()
                .and_then(|env| env.packet_size())
            {
                return Some(size);
            }
        } else if let Ok(size) = text.parse::<i64>() {
            return Some(size);
        }
    }

    let raw: [u8; 4] = message.get(..4)?.try_into().ok()?;
    Some(i64::from(i32::from_be_bytes(raw)))
}
