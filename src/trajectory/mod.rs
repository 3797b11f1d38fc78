//! Trajectory storage
//!
//! - [`TrajectoryBuffer`] - append-then-freeze sample store, owned by the
//!   session orchestrator
//! - [`SampleGate`] - shared, state-gated handle the telemetry handler appends
//!   through while a phase is active

pub mod buffer;
pub mod gate;

pub use buffer::{BufferPhase, TrajectoryBuffer};
pub use gate::{Offer, RecordingLimits, SampleGate};
