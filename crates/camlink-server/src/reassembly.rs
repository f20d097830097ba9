//! Reassembly of control frame sequences written by the central.
//!
//! Sessions are keyed by a scope string (which channel the frames arrived
//! on) plus the frame header's total count and declared length. Frames may
//! arrive in any order and may repeat; the latest payload for a sequence
//! number wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use camlink_protocol::{CONTROL_PAYLOAD_LEN, ControlFrame};
use tracing::{debug, trace};

/// Identity of one in-progress message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Channel UUID string, or `negotiation`.
    pub scope: String,
    /// Frames in the message.
    pub total_count: u8,
    /// Message length before padding.
    pub declared_length: u16,
}

impl SessionKey {
    /// Key for the message `frame` belongs to within `scope`.
    pub fn new(scope: impl Into<String>, frame: &ControlFrame) -> Self {
        Self {
            scope: scope.into(),
            total_count: frame.total_count,
            declared_length: frame.declared_length,
        }
    }
}

/// Result of accepting one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyOutcome {
    Pending { received: usize, total: u8 },
    /// The full message, truncated to the declared length.
    Complete(Vec<u8>),
}

#[derive(Debug)]
struct Session {
    parts: BTreeMap<u8, [u8; CONTROL_PAYLOAD_LEN]>,
    created: Instant,
}

/// Thread-safe table of in-progress reassembly sessions.
#[derive(Debug, Default)]
pub struct ReassemblyTable {
    sessions: Mutex<HashMap<SessionKey, Session>>,
}

impl ReassemblyTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a frame and returns the message once every sequence number is present.
    ///
    /// Lookup, insert, completion check and removal happen under one lock, so
    /// a session completes exactly once even with concurrent writers.
    pub fn accept(&self, scope: &str, frame: &ControlFrame) -> ReassemblyOutcome {
        let key = SessionKey::new(scope, frame);
        let mut sessions = self.lock();

        let received = {
            let session = sessions.entry(key.clone()).or_insert_with(|| {
                debug!(
                    scope = %scope,
                    total = frame.total_count,
                    declared_length = frame.declared_length,
                    "New reassembly session"
                );
                Session {
                    parts: BTreeMap::new(),
                    created: Instant::now(),
                }
            });
            if session.parts.insert(frame.sequence, frame.payload).is_some() {
                trace!(scope = %scope, seq = frame.sequence, "Duplicate fragment replaced");
            }
            session.parts.len()
        };

        if received < usize::from(frame.total_count) {
            trace!(scope = %scope, received, total = frame.total_count, "Fragment stored");
            return ReassemblyOutcome::Pending {
                received,
                total: frame.total_count,
            };
        }

        let parts = sessions
            .remove(&key)
            .map(|session| session.parts)
            .unwrap_or_default();
        drop(sessions);

        let mut message: Vec<u8> = parts.into_values().flatten().collect();
        message.truncate(usize::from(key.declared_length));
        debug!(scope = %scope, len = message.len(), "Reassembly complete");
        ReassemblyOutcome::Complete(message)
    }

    /// Drops every session in `scope`. Returns how many were dropped.
    pub fn reset(&self, scope: &str) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|key, _| key.scope != scope);
        let dropped = before - sessions.len();
        if dropped > 0 {
            debug!(scope = %scope, dropped, "Reset reassembly sessions");
        }
        dropped
    }

    /// Drops sessions started more than `ttl` ago.
    pub fn evict_older_than(&self, ttl: Duration) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|key, session| {
            let keep = session.created.elapsed() < ttl;
            if !keep {
                trace!(
                    scope = %key.scope,
                    received = session.parts.len(),
                    total = key.total_count,
                    "Evicting stale reassembly session"
                );
            }
            keep
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, "Evicted stale reassembly sessions");
        }
        evicted
    }

    /// Number of in-progress sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no message is in progress.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlink_protocol::split_message;
    use std::sync::Arc;

    const MESSAGE: &[u8] = br#"{"event":"start_recording","data":{"id":12,"title":"Cup final"}}"#;

    #[test]
    fn completes_in_order() {
        let table = ReassemblyTable::new();
        let frames = split_message(MESSAGE).unwrap();
        let (last, rest) = frames.split_last().unwrap();
        for frame in rest {
            assert!(matches!(
                table.accept("data", frame),
                ReassemblyOutcome::Pending { .. }
            ));
        }
        assert_eq!(
            table.accept("data", last),
            ReassemblyOutcome::Complete(MESSAGE.to_vec())
        );
        assert!(table.is_empty());
    }

    #[test]
    fn completes_in_any_order_exactly_once() {
        let frames = split_message(MESSAGE).unwrap();
        let n = frames.len();
        // Every rotation plus the reversed order.
        let mut orders: Vec<Vec<usize>> = (0..n)
            .map(|r| (0..n).map(|i| (i + r) % n).collect())
            .collect();
        orders.push((0..n).rev().collect());

        for order in orders {
            let table = ReassemblyTable::new();
            let completions: Vec<_> = order
                .iter()
                .map(|&i| table.accept("data", &frames[i]))
                .filter(|o| matches!(o, ReassemblyOutcome::Complete(_)))
                .collect();
            assert_eq!(completions, vec![ReassemblyOutcome::Complete(MESSAGE.to_vec())]);
        }
    }

    #[test]
    fn duplicate_keeps_latest_payload() {
        let table = ReassemblyTable::new();
        let frames = split_message(&[b'a'; 30]).unwrap();
        assert_eq!(frames.len(), 2);

        let mut replacement = frames[0].clone();
        replacement.payload = [b'z'; CONTROL_PAYLOAD_LEN];

        table.accept("data", &frames[0]);
        assert_eq!(
            table.accept("data", &replacement),
            ReassemblyOutcome::Pending {
                received: 1,
                total: 2
            }
        );
        let ReassemblyOutcome::Complete(message) = table.accept("data", &frames[1]) else {
            panic!("expected completion");
        };
        assert_eq!(&message[..15], &[b'z'; 15]);
        assert_eq!(&message[15..], &[b'a'; 15]);
    }

    #[test]
    fn truncates_to_declared_length() {
        let table = ReassemblyTable::new();
        let frames = split_message(b"hello").unwrap();
        assert_eq!(
            table.accept("x", &frames[0]),
            ReassemblyOutcome::Complete(b"hello".to_vec())
        );
    }

    #[test]
    fn scopes_are_independent() {
        let table = ReassemblyTable::new();
        let frames = split_message(&[7u8; 20]).unwrap();

        table.accept("negotiation", &frames[0]);
        table.accept("data", &frames[1]);
        assert_eq!(table.len(), 2);

        assert_eq!(table.reset("negotiation"), 1);
        assert!(matches!(
            table.accept("data", &frames[0]),
            ReassemblyOutcome::Complete(_)
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn evicts_stale_sessions() {
        let table = ReassemblyTable::new();
        let frames = split_message(&[1u8; 40]).unwrap();
        table.accept("data", &frames[0]);

        assert_eq!(table.evict_older_than(Duration::from_secs(60)), 0);
        assert_eq!(table.evict_older_than(Duration::ZERO), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn concurrent_writers_complete_once() {
        let table = Arc::new(ReassemblyTable::new());
        let message = vec![b'q'; 15 * 40];
        let frames = split_message(&message).unwrap();

        let handles: Vec<_> = frames
            .into_iter()
            .map(|frame| {
                let table = table.clone();
                std::thread::spawn(move || table.accept("data", &frame))
            })
            .collect();

        let completes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| matches!(o, ReassemblyOutcome::Complete(m) if *m == message))
            .count();
        assert_eq!(completes, 1);
        assert!(table.is_empty());
    }
}
