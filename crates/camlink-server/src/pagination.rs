//! Serves long read responses one control frame per read.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use camlink_protocol::{ControlFrame, ProtocolResult, split_message};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::PageError;

#[derive(Debug)]
struct PageEntry {
    frames: Vec<ControlFrame>,
    cursor: usize,
}

/// Per-channel page sequences with a read cursor.
#[derive(Debug, Default)]
pub struct PaginationCache {
    entries: Mutex<HashMap<Uuid, PageEntry>>,
}

impl PaginationCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, PageEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Splits `message` into frames for `channel`, replacing any previous sequence.
    ///
    /// Returns the number of frames prepared.
    pub fn prepare(&self, channel: Uuid, message: &[u8]) -> ProtocolResult<usize> {
        let frames = split_message(message)?;
        let count = frames.len();
        self.lock().insert(channel, PageEntry { frames, cursor: 0 });
        debug!(channel = %channel, frames = count, len = message.len(), "Prepared pages");
        Ok(count)
    }

    /// Returns the frame at the cursor and advances it.
    ///
    /// The entry is removed after its last frame. Without an entry the read is
    /// `Exhausted`; any inconsistent entry is purged.
    pub fn next_frame(&self, channel: Uuid) -> Result<ControlFrame, PageError> {
        serve(&mut self.lock(), channel)
    }

    /// Like [`next_frame`](Self::next_frame), preparing a fresh sequence
    /// from `generate` when the channel has none.
    ///
    /// Lookup, preparation and serving happen under one lock, so a concurrent
    /// reader finishing the previous sequence cannot leave this read without
    /// a frame. `generate` runs only when a new sequence is needed. A `None`
    /// from it means the channel has no message and the read is `Exhausted`.
    pub fn next_or_prepare<F>(&self, channel: Uuid, generate: F) -> Result<ControlFrame, PageError>
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        let mut entries = self.lock();
        if !entries.contains_key(&channel) {
            let message = generate().ok_or(PageError::Exhausted)?;
            let frames = split_message(&message).map_err(|e| {
                debug!(channel = %channel, error = %e, "Cannot paginate message");
                PageError::Exhausted
            })?;
            debug!(channel = %channel, frames = frames.len(), len = message.len(), "Prepared pages");
            entries.insert(channel, PageEntry { frames, cursor: 0 });
        }
        serve(&mut entries, channel)
    }

    /// Whether `channel` has a sequence in progress.
    pub fn contains(&self, channel: &Uuid) -> bool {
        self.lock().contains_key(channel)
    }

    /// Drops the sequence for `channel`, if any.
    pub fn remove(&self, channel: &Uuid) -> bool {
        self.lock().remove(channel).is_some()
    }

    /// Number of channels with a sequence in progress.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn serve(entries: &mut HashMap<Uuid, PageEntry>, channel: Uuid) -> Result<ControlFrame, PageError> {
    let Some(entry) = entries.get_mut(&channel) else {
        return Err(PageError::Exhausted);
    };

    let Some(frame) = entry.frames.get(entry.cursor).cloned() else {
        entries.remove(&channel);
        debug!(channel = %channel, "Purged stale page entry");
        return Err(PageError::Exhausted);
    };

    entry.cursor += 1;
    trace!(
        channel = %channel,
        page = entry.cursor,
        total = entry.frames.len(),
        "Serving page"
    );
    if entry.cursor >= entry.frames.len() {
        entries.remove(&channel);
    }
    Ok(frame)
}
