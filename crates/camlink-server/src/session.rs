//! Recording controller: a [`RecordingSession`] plus observers and a ticker.
//!
//! While recording, a background task emits [`TimerEvent::Tick`] every
//! `tick_interval`. The task is aborted on pause and stop and respawned on
//! resume, so there is never more than one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use camlink_core::{RecordingResult, RecordingSession, RecordingState, TimerEvent, format_duration};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Receives transition and tick events.
pub type TimerObserver = Arc<dyn Fn(&TimerEvent) + Send + Sync>;

struct Inner {
    session: Mutex<RecordingSession>,
    observers: RwLock<Vec<TimerObserver>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, RecordingSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: &TimerEvent) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer(event);
        }
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self.ticker().take() {
            handle.abort();
            trace!("Recording ticker stopped");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// Shared, cloneable handle to the recording state.
#[derive(Clone)]
pub struct RecordingController {
    inner: Arc<Inner>,
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl RecordingController {
    /// Idle controller ticking every `tick_interval` while recording.
    ///
    /// A zero interval disables ticks; transitions are still reported.
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(RecordingSession::new()),
                observers: RwLock::new(Vec::new()),
                ticker: Mutex::new(None),
                tick_interval,
            }),
        }
    }

    /// Registers an observer for all subsequent events.
    pub fn subscribe(&self, observer: TimerObserver) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Starts a recording and the ticker.
    pub fn start(&self) -> RecordingResult<TimerEvent> {
        self.transition(RecordingSession::start)
    }

    /// Pauses and stops ticking.
    pub fn pause(&self) -> RecordingResult<TimerEvent> {
        self.transition(RecordingSession::pause)
    }

    /// Resumes a paused recording and ticks again.
    pub fn resume(&self) -> RecordingResult<TimerEvent> {
        self.transition(RecordingSession::resume)
    }

    /// Stops the recording, freezing its duration.
    pub fn stop(&self) -> RecordingResult<TimerEvent> {
        self.transition(RecordingSession::stop)
    }

    fn transition(
        &self,
        apply: fn(&mut RecordingSession) -> RecordingResult<TimerEvent>,
    ) -> RecordingResult<TimerEvent> {
        let (event, recording) = {
            let mut session = self.inner.session();
            let event = apply(&mut *session)?;
            (event, session.is_recording())
        };

        self.inner.stop_ticker();
        if recording {
            self.spawn_ticker();
        }

        match &event {
            TimerEvent::Stopped { duration, .. } => {
                info!(duration = %format_duration(*duration), "Recording stopped")
            }
            other => info!(event = ?other, "Recording transition"),
        }
        self.inner.notify(&event);
        Ok(event)
    }

    fn spawn_ticker(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, recording ticks disabled");
            return;
        };
        if self.inner.tick_interval.is_zero() {
            debug!("Zero tick interval, recording ticks disabled");
            return;
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.tick_interval;

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let Some(event) = inner.session().tick_at(Utc::now()) else {
                    break;
                };
                inner.notify(&event);
            }
            debug!("Recording ticker exited");
        });
        if let Some(previous) = self.inner.ticker().replace(handle) {
            previous.abort();
        }
    }

    /// Current recording state.
    pub fn state(&self) -> RecordingState {
        self.inner.session().state()
    }

    /// Recorded time so far, excluding pauses.
    pub fn duration(&self) -> chrono::Duration {
        self.inner.session().duration()
    }

    /// `HH:MM:SS` of [`duration`](Self::duration).
    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration())
    }

    /// Human-readable state with the recorded time.
    pub fn status_description(&self) -> String {
        self.inner.session().status_description_at(Utc::now())
    }

    /// Stops ticking and returns to a fresh idle session without notifying.
    pub fn reset(&self) {
        self.inner.stop_ticker();
        self.inner.session().reset();
        debug!("Recording session reset");
    }

    /// Whether a ticker task is currently scheduled.
    pub fn is_ticking(&self) -> bool {
        self.inner
            .ticker()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
