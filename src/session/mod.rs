//! Recording sessions and complete record/replay runs
//!
//! # Components
//!
//! - [`RecordingSession`] - Walks the recording gate through
//!   `Idle -> Armed -> Recording -> Stopped` on operator signals
//! - [`SessionOrchestrator`] - Connects, records, replays and persists one run,
//!   cleaning up on every exit path
//! - [`SessionMetadata`] - Summary of a run, saved next to the artifact

pub mod orchestrator;
pub mod recorder;
pub mod types;

pub use orchestrator::{RunOutcome, RunReport, SessionOrchestrator};
pub use recorder::{RecordingSession, StopReason};
pub use types::{SessionMetadata, SessionState};
