//! Receiver-side reassembly of bulk transfers.
//!
//! Bulk frames carry the full source length in every frame, so the receiver
//! can tell a finished transfer from a truncated one without any extra
//! signalling.

use std::collections::BTreeMap;

use crate::frame::BulkFrame;

/// Result of feeding one frame to a [`BulkAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyProgress {
    /// Bytes were not a bulk frame.
    Ignored,
    /// More frames are needed.
    Pending { received: usize, total: u16 },
    /// Every frame arrived; the source bytes, exactly `total_length` long.
    Complete(Vec<u8>),
    /// Every frame arrived but the payloads do not add up to the declared length.
    Truncated { expected: u32, received: usize },
}

/// Collects bulk frames for one transfer at a time.
#[derive(Debug, Default)]
pub struct BulkAssembler {
    header: Option<(u16, u32)>,
    parts: BTreeMap<u16, Vec<u8>>,
}

impl BulkAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and accepts raw notification bytes.
    pub fn accept_bytes(&mut self, bytes: &[u8]) -> AssemblyProgress {
        match BulkFrame::decode(bytes) {
            Some(frame) => self.accept(frame),
            None => AssemblyProgress::Ignored,
        }
    }

    /// Accepts one decoded frame.
    ///
    /// A frame whose header differs from the transfer in progress starts a
    /// new transfer. Repeated sequence numbers overwrite earlier payloads.
    pub fn accept(&mut self, frame: BulkFrame) -> AssemblyProgress {
        let header = (frame.total_count, frame.total_length);
        if self.header != Some(header) {
            self.reset();
            self.header = Some(header);
        }

        self.parts.insert(frame.sequence, frame.payload);
        if self.parts.len() < usize::from(frame.total_count) {
            return AssemblyProgress::Pending {
                received: self.parts.len(),
                total: frame.total_count,
            };
        }

        let mut data: Vec<u8> = std::mem::take(&mut self.parts)
            .into_values()
            .flatten()
            .collect();
        self.header = None;

        let expected = frame.total_length;
        if data.len() < expected as usize {
            return AssemblyProgress::Truncated {
                expected,
                received: data.len(),
            };
        }
        data.truncate(expected as usize);
        AssemblyProgress::Complete(data)
    }

    /// Drops any partially received transfer.
    pub fn reset(&mut self) {
        self.header = None;
        self.parts.clear();
    }

    /// Number of distinct frames held for the current transfer.
    pub fn received(&self) -> usize {
        self.parts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment_bulk;

    fn encoded(source: &[u8], frame_size: usize) -> Vec<Vec<u8>> {
        segment_bulk(source, frame_size)
            .unwrap()
            .map(|f| f.encode(frame_size).unwrap())
            .collect()
    }

    #[test]
    fn assembles_out_of_order() {
        let source: Vec<u8> = (0..1500u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut frames = encoded(&source, 128);
        frames.reverse();

        let mut assembler = BulkAssembler::new();
        let last = frames.len() - 1;
        for (i, bytes) in frames.iter().enumerate() {
            let progress = assembler.accept_bytes(bytes);
            if i < last {
                assert!(matches!(progress, AssemblyProgress::Pending { .. }));
            } else {
                assert_eq!(progress, AssemblyProgress::Complete(source.clone()));
            }
        }
        assert_eq!(assembler.received(), 0);
    }

    #[test]
    fn ignores_non_bulk_bytes() {
        let mut assembler = BulkAssembler::new();
        assert_eq!(assembler.accept_bytes(&[0xAA; 20]), AssemblyProgress::Ignored);
        assert_eq!(assembler.accept_bytes(&[]), AssemblyProgress::Ignored);
    }

    #[test]
    fn duplicate_frames_do_not_complete_early() {
        let source = vec![1u8; 30];
        let frames = encoded(&source, 19);
        assert_eq!(frames.len(), 3);

        let mut assembler = BulkAssembler::new();
        assembler.accept_bytes(&frames[0]);
        assert_eq!(
            assembler.accept_bytes(&frames[0]),
            AssemblyProgress::Pending {
                received: 1,
                total: 3
            }
        );
        assembler.accept_bytes(&frames[1]);
        assert_eq!(
            assembler.accept_bytes(&frames[2]),
            AssemblyProgress::Complete(source)
        );
    }

    #[test]
    fn detects_truncation() {
        let mut assembler = BulkAssembler::new();
        let frame = BulkFrame {
            total_count: 1,
            sequence: 1,
            total_length: 100,
            payload: vec![0; 3],
        };
        assert_eq!(
            assembler.accept(frame),
            AssemblyProgress::Truncated {
                expected: 100,
                received: 3
            }
        );
    }

    #[test]
    fn new_header_restarts_transfer() {
        let mut assembler = BulkAssembler::new();
        let first = encoded(&[1u8; 40], 19);
        let second = encoded(&[2u8; 5], 19);

        assembler.accept_bytes(&first[0]);
        assert_eq!(assembler.received(), 1);
        assert_eq!(
            assembler.accept_bytes(&second[0]),
            AssemblyProgress::Complete(vec![2u8; 5])
        );
    }
}
