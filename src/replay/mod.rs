//! Replay: planning motion steps from a frozen trajectory and dispatching them
//!
//! - [`ReplayPlanner`] turns adjacent samples into [`PlanStep`]s
//! - [`CommandDispatcher`] issues them on a [`MotionControl`](crate::link::MotionControl),
//!   holding between steps through a [`Pacer`]

pub mod dispatcher;
pub mod pacer;
pub mod planner;

pub use dispatcher::{
    planned_duration, CommandDispatcher, DispatchOptions, DispatchOutcome, DispatchReport,
    ReplayMode,
};
pub use pacer::{Pacer, RecordingPacer, ThreadPacer};
pub use planner::{PlanStep, PlanSteps, ReplayPlanner, SkipReason, StepKind, MIN_HOLD};
