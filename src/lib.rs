//! # kinreplay: trajectory record/replay for remotely actuated vehicles
//!
//! Records a vehicle's kinematic telemetry while an operator moves it by hand,
//! then replays the recorded path as a sequence of paced motion commands while
//! recording the vehicle's telemetry a second time. Both trajectories are saved
//! to a single CSV artifact for comparison.
//!
//! ## Architecture
//!
//! - **Link**: [`link::VehicleLink`] abstracts the radio link; telemetry arrives
//!   on the link's own I/O thread through registered handlers
//! - **Trajectory**: [`trajectory::SampleGate`] pairs the session state with the
//!   buffer it gates, so appends are only accepted while recording
//! - **Session**: [`session::SessionOrchestrator`] drives connect, record,
//!   replay and persist, and cleans up on every exit path
//! - **Replay**: [`replay::ReplayPlanner`] turns adjacent samples into steps,
//!   [`replay::CommandDispatcher`] issues them as blocking commands
//! - **Signals**: operator gates come from a [`signal::SignalSource`]
//!
//! ## Configuration
//!
//! Runs are configured by a TOML [`config::RunConfig`]; the default file lives in
//! the platform data directory under `kinreplay`.
//!
//! ## Example
//!
//! ```ignore
//! use kinreplay::{
//!     config::RunConfig,
//!     link::{SimConfig, SimulatedConnector},
//!     replay::ThreadPacer,
//!     session::SessionOrchestrator,
//!     signal::LineSignalSource,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::load_or_default("kinreplay.toml");
//!     let _guard = kinreplay::logging::init(config.logging.log_dir.as_deref())?;
//!
//!     let connector = SimulatedConnector::new(SimConfig::default());
//!     let mut signals = LineSignalSource::stdin(config.recording.gate_key.clone())?;
//!     let report = SessionOrchestrator::new(&connector, config).run(&mut signals, ThreadPacer)?;
//!     println!("{}", report.outcome);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod param_probe;
pub mod persistence;
pub mod replay;
pub mod session;
pub mod signal;
pub mod trajectory;
pub mod types;

// Re-export commonly used types
pub use config::RunConfig;
pub use error::{CommandError, ReplayError, Result};
pub use link::{LinkConnector, LinkGuard, MotionControl, VehicleLink};
pub use session::{RunOutcome, RunReport, SessionOrchestrator};
pub use types::{Channel, ChannelConfig, TelemetrySample, Vec3};
