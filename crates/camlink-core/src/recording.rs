//! Recording session state machine.
//!
//! A session moves `Idle -> Recording <-> Paused -> Idle`. Every transition
//! takes the wall clock instant explicitly (the `*_at` methods) so callers and
//! tests control time; the plain methods use `Utc::now()`.
//!
//! ```
//! use camlink_core::{RecordingSession, RecordingState};
//! use chrono::{Duration, Utc};
//!
//! let t0 = Utc::now();
//! let mut session = RecordingSession::new();
//! session.start_at(t0).unwrap();
//! session.pause_at(t0 + Duration::seconds(10)).unwrap();
//! session.resume_at(t0 + Duration::seconds(15)).unwrap();
//! session.stop_at(t0 + Duration::seconds(25)).unwrap();
//!
//! assert_eq!(session.state(), RecordingState::Idle);
//! assert_eq!(session.duration_at(t0), Duration::seconds(20));
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

/// Result type for recording transitions.
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Rejected state transitions. The session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: RecordingState,
        action: RecordingAction,
    },
}

/// Recording lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Paused,
}

impl RecordingState {
    /// Status string reported to the central.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
        }
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition requested on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingAction {
    Start,
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for RecordingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordingAction::Start => "start",
            RecordingAction::Pause => "pause",
            RecordingAction::Resume => "resume",
            RecordingAction::Stop => "stop",
        })
    }
}

/// Outcome of a transition or a periodic tick, delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Started { at: DateTime<Utc> },
    Paused { at: DateTime<Utc> },
    Resumed { at: DateTime<Utc> },
    Stopped { at: DateTime<Utc>, duration: Duration },
    Tick { elapsed: Duration },
}

/// Elapsed time accounting for one recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    state: RecordingState,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    pause_start: Option<DateTime<Utc>>,
    paused: Duration,
}

impl RecordingSession {
    /// Idle session with no timings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn is_paused(&self) -> bool {
        self.state == RecordingState::Paused
    }

    /// When the current or last recording started.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// When the last recording stopped; `None` while one is running.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Closed pause intervals folded so far.
    pub fn accumulated_paused(&self) -> Duration {
        self.paused
    }

    fn reject(&self, action: RecordingAction) -> RecordingError {
        RecordingError::InvalidTransition {
            from: self.state,
            action,
        }
    }

    /// `Idle -> Recording`. Clears any previous recording's timings.
    pub fn start_at(&mut self, now: DateTime<Utc>) -> RecordingResult<TimerEvent> {
        if self.state != RecordingState::Idle {
            return Err(self.reject(RecordingAction::Start));
        }
        *self = Self {
            state: RecordingState::Recording,
            start_time: Some(now),
            ..Self::default()
        };
        Ok(TimerEvent::Started { at: now })
    }

    /// `Recording -> Paused`.
    pub fn pause_at(&mut self, now: DateTime<Utc>) -> RecordingResult<TimerEvent> {
        if self.state != RecordingState::Recording {
            return Err(self.reject(RecordingAction::Pause));
        }
        self.state = RecordingState::Paused;
        self.pause_start = Some(now);
        Ok(TimerEvent::Paused { at: now })
    }

    /// `Paused -> Recording`.
    pub fn resume_at(&mut self, now: DateTime<Utc>) -> RecordingResult<TimerEvent> {
        if self.state != RecordingState::Paused {
            return Err(self.reject(RecordingAction::Resume));
        }
        self.close_pause(now);
        self.state = RecordingState::Recording;
        Ok(TimerEvent::Resumed { at: now })
    }

    /// `Recording | Paused -> Idle`. An open pause is folded in first.
    pub fn stop_at(&mut self, now: DateTime<Utc>) -> RecordingResult<TimerEvent> {
        if self.state == RecordingState::Idle {
            return Err(self.reject(RecordingAction::Stop));
        }
        self.close_pause(now);
        self.end_time = Some(now);
        self.state = RecordingState::Idle;
        Ok(TimerEvent::Stopped {
            at: now,
            duration: self.duration_at(now),
        })
    }

    fn close_pause(&mut self, now: DateTime<Utc>) {
        if let Some(pause_start) = self.pause_start.take() {
            self.paused += (now - pause_start).max(Duration::zero());
        }
    }

    /// [`start_at`](Self::start_at) the current time.
    pub fn start(&mut self) -> RecordingResult<TimerEvent> {
        self.start_at(Utc::now())
    }

    /// [`pause_at`](Self::pause_at) the current time.
    pub fn pause(&mut self) -> RecordingResult<TimerEvent> {
        self.pause_at(Utc::now())
    }

    /// [`resume_at`](Self::resume_at) the current time.
    pub fn resume(&mut self) -> RecordingResult<TimerEvent> {
        self.resume_at(Utc::now())
    }

    /// [`stop_at`](Self::stop_at) the current time.
    pub fn stop(&mut self) -> RecordingResult<TimerEvent> {
        self.stop_at(Utc::now())
    }

    /// Recorded time as of `now`, excluding pauses.
    ///
    /// After a stop this is the final duration, independent of `now`. Never
    /// negative, zero if nothing was recorded.
    pub fn duration_at(&self, now: DateTime<Utc>) -> Duration {
        let Some(start) = self.start_time else {
            return Duration::zero();
        };
        let end = self.end_time.unwrap_or(now);
        let mut paused = self.paused;
        if let Some(pause_start) = self.pause_start {
            paused += (end - pause_start).max(Duration::zero());
        }
        (end - start - paused).max(Duration::zero())
    }

    /// [`duration_at`](Self::duration_at) the current time.
    pub fn duration(&self) -> Duration {
        self.duration_at(Utc::now())
    }

    /// Tick event for observers, or `None` unless actively recording.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Option<TimerEvent> {
        self.is_recording().then(|| TimerEvent::Tick {
            elapsed: self.duration_at(now),
        })
    }

    /// Human readable state with the elapsed time.
    pub fn status_description_at(&self, now: DateTime<Utc>) -> String {
        let elapsed = format_duration(self.duration_at(now));
        match self.state {
            RecordingState::Recording => format!("recording ({elapsed})"),
            RecordingState::Paused => format!("paused ({elapsed})"),
            RecordingState::Idle if self.end_time.is_some() => format!("stopped ({elapsed})"),
            RecordingState::Idle => "not recording".to_string(),
        }
    }

    /// Back to a fresh idle session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Formats a duration as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 26, 13, 56, 6).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    #[test]
    fn pause_resume_accounting() {
        let mut s = RecordingSession::new();
        s.start_at(t0()).unwrap();
        s.pause_at(t0() + secs(10)).unwrap();
        s.resume_at(t0() + secs(15)).unwrap();
        let stopped = s.stop_at(t0() + secs(25)).unwrap();

        assert_eq!(s.accumulated_paused(), secs(5));
        assert_eq!(
            stopped,
            TimerEvent::Stopped {
                at: t0() + secs(25),
                duration: secs(20)
            }
        );
        assert_eq!(s.state(), RecordingState::Idle);
        // Frozen after stop.
        assert_eq!(s.duration_at(t0() + secs(1000)), secs(20));
    }

    #[test]
    fn duration_while_paused_excludes_open_pause() {
        let mut s = RecordingSession::new();
        s.start_at(t0()).unwrap();
        s.pause_at(t0() + secs(10)).unwrap();
        assert_eq!(s.duration_at(t0() + secs(40)), secs(10));
        assert_eq!(s.tick_at(t0() + secs(40)), None);
    }

    #[test]
    fn stop_while_paused_folds_pause() {
        let mut s = RecordingSession::new();
        s.start_at(t0()).unwrap();
        s.pause_at(t0() + secs(30)).unwrap();
        s.stop_at(t0() + secs(50)).unwrap();
        assert_eq!(s.accumulated_paused(), secs(20));
        assert_eq!(s.duration_at(t0() + secs(60)), secs(30));
    }

    #[test]
    fn invalid_transitions_do_not_mutate() {
        let mut s = RecordingSession::new();
        assert_eq!(
            s.pause_at(t0()),
            Err(RecordingError::InvalidTransition {
                from: RecordingState::Idle,
                action: RecordingAction::Pause
            })
        );
        assert!(s.resume_at(t0()).is_err());
        assert!(s.stop_at(t0()).is_err());

        s.start_at(t0()).unwrap();
        assert!(s.start_at(t0() + secs(1)).is_err());
        assert!(s.resume_at(t0() + secs(1)).is_err());
        assert_eq!(s.start_time(), Some(t0()));
        assert_eq!(s.state(), RecordingState::Recording);
    }

    #[test]
    fn idle_duration_is_zero_and_never_negative() {
        let s = RecordingSession::new();
        assert_eq!(s.duration_at(t0()), Duration::zero());

        let mut s = RecordingSession::new();
        s.start_at(t0()).unwrap();
        assert_eq!(s.duration_at(t0() - secs(5)), Duration::zero());
    }

    #[test]
    fn restart_clears_previous_timings() {
        let mut s = RecordingSession::new();
        s.start_at(t0()).unwrap();
        s.pause_at(t0() + secs(1)).unwrap();
        s.stop_at(t0() + secs(3)).unwrap();

        s.start_at(t0() + secs(100)).unwrap();
        assert_eq!(s.accumulated_paused(), Duration::zero());
        assert_eq!(s.end_time(), None);
        assert_eq!(s.duration_at(t0() + secs(104)), secs(4));
    }

    #[test]
    fn reset_returns_to_fresh_idle() {
        let mut s = RecordingSession::new();
        s.start_at(t0()).unwrap();
        s.reset();
        assert_eq!(s.state(), RecordingState::Idle);
        assert_eq!(s.start_time(), None);
        assert_eq!(s.status_description_at(t0()), "not recording");
    }

    #[test]
    fn ticks_only_while_recording() {
        let mut s = RecordingSession::new();
        assert_eq!(s.tick_at(t0()), None);
        s.start_at(t0()).unwrap();
        assert_eq!(
            s.tick_at(t0() + secs(3)),
            Some(TimerEvent::Tick { elapsed: secs(3) })
        );
    }

    #[test]
    fn descriptions() {
        let mut s = RecordingSession::new();
        s.start_at(t0()).unwrap();
        assert_eq!(
            s.status_description_at(t0() + secs(65)),
            "recording (00:01:05)"
        );
        s.pause_at(t0() + secs(65)).unwrap();
        assert_eq!(s.status_description_at(t0() + secs(99)), "paused (00:01:05)");
        s.stop_at(t0() + secs(99)).unwrap();
        assert_eq!(s.status_description_at(t0() + secs(99)), "stopped (00:01:05)");
    }

    #[test]
    fn formats_long_durations() {
        assert_eq!(format_duration(Duration::zero()), "00:00:00");
        assert_eq!(format_duration(secs(3661)), "01:01:01");
        assert_eq!(format_duration(secs(100 * 3600 + 59)), "100:00:59");
        assert_eq!(format_duration(secs(-5)), "00:00:00");
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RecordingState::Paused).unwrap(),
            "\"paused\""
        );
    }
}
