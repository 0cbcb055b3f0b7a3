//! Long-lived services: playback session tracking and the stack supervisor.

pub mod session_tracker;
pub mod supervisor;

pub use session_tracker::{
    ActiveSession, ClientInfo, PlaybackSessionTracker, ProgressOutcome, SessionState,
};
pub use supervisor::{
    ConfigSource, HealthError, HealthProbe, HttpHealthProbe, SharedConfigSource, Supervisor,
    SupervisorHandle, SupervisorState,
};
