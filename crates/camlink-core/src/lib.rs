//! Recording session state machine and logging setup for camlink.

pub mod recording;
pub mod tracing;

pub use recording::{
    RecordingAction, RecordingError, RecordingResult, RecordingSession, RecordingState,
    TimerEvent, format_duration,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing, parse_level};
