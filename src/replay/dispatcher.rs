//! Issues planned steps as blocking motion commands

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::{CommandError, ReplayError, Result};
use crate::link::{CommandStats, MotionControl};
use crate::signal::{token, SignalSource};

use super::pacer::Pacer;
use super::planner::{PlanStep, StepKind};

/// How a move step is turned into a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// `move_by` the recorded displacement
    #[default]
    Relative,
    /// `go_to` the recorded absolute position
    Waypoint,
}

impl std::fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayMode::Relative => write!(f, "relative"),
            ReplayMode::Waypoint => write!(f, "waypoint"),
        }
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchOptions {
    pub mode: ReplayMode,
    /// Take off before the first step and land after the last
    pub manage_flight: bool,
    pub takeoff_height_m: f64,
    /// Poll the signal source for "stop" between steps
    pub stop_on_signal: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            mode: ReplayMode::Relative,
            manage_flight: false,
            takeoff_height_m: 0.5,
            stop_on_signal: false,
        }
    }
}

/// How a dispatch ended
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Every step was dispatched
    Completed,
    /// The operator stopped the replay before `at_step` was dispatched
    Cancelled { at_step: usize },
    /// The vehicle refused `step`; later steps were not dispatched
    Aborted { step: usize, source: CommandError },
}

/// Summary of one dispatch
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Motion commands accepted
    pub moves: usize,
    /// Steps held without a command
    pub skips: usize,
    /// Moves whose speed was clamped
    pub clamped: usize,
    pub outcome: DispatchOutcome,
    /// Set if landing failed after the steps ran
    pub landing_error: Option<CommandError>,
    pub stats: CommandStats,
}

impl DispatchReport {
    fn new() -> Self {
        Self {
            moves: 0,
            skips: 0,
            clamped: 0,
            outcome: DispatchOutcome::Completed,
            landing_error: None,
            stats: CommandStats::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == DispatchOutcome::Completed
    }

    /// Step at which dispatch stopped early, if it did
    pub fn stopped_at(&self) -> Option<usize> {
        match self.outcome {
            DispatchOutcome::Completed => None,
            DispatchOutcome::Cancelled { at_step } => Some(at_step),
            DispatchOutcome::Aborted { step, .. } => Some(step),
        }
    }

    /// The abort as a [`ReplayError::Dispatch`], if there was one
    pub fn error(&self) -> Option<ReplayError> {
        match &self.outcome {
            DispatchOutcome::Aborted { step, source } => Some(ReplayError::Dispatch {
                step: *step,
                source: source.clone(),
            }),
            _ => None,
        }
    }

    /// Turn an aborted dispatch into an error
    pub fn into_result(self) -> Result<Self> {
        match self.error() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// Replays plan steps on a [`MotionControl`]
///
/// Each move blocks until the vehicle accepts it, then the pacer holds for the
/// step's hold. The first rejection aborts the run; nothing is retried.
pub struct CommandDispatcher<P: Pacer> {
    options: DispatchOptions,
    pacer: P,
}

impl<P: Pacer> CommandDispatcher<P> {
    pub fn new(options: DispatchOptions, pacer: P) -> Self {
        Self { options, pacer }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    fn command<M>(&self, motion: &mut M, step: &PlanStep) -> std::result::Result<(), CommandError>
    where
        M: MotionControl + ?Sized,
    {
        match self.options.mode {
            ReplayMode::Relative => {
                let d = step.displacement;
                motion.move_by(d.x, d.y, d.z, step.speed)
            }
            ReplayMode::Waypoint => {
                let p = step.target;
                motion.go_to(p.x, p.y, p.z, step.speed)
            }
        }
    }

    fn timed<F>(stats: &mut CommandStats, f: F) -> std::result::Result<(), CommandError>
    where
        F: FnOnce() -> std::result::Result<(), CommandError>,
    {
        let start = Instant::now();
        let result = f();
        match &result {
            Ok(()) => stats.record_accepted(start.elapsed()),
            Err(_) => stats.record_rejected(),
        }
        result
    }

    fn stop_requested(&self, signals: &mut Option<&mut dyn SignalSource>) -> bool {
        if !self.options.stop_on_signal {
            return false;
        }
        let Some(signals) = signals.as_deref_mut() else {
            return false;
        };
        match signals.try_signal(token::STOP) {
            Ok(fired) => fired,
            Err(e) => {
                tracing::warn!("Stop signal unavailable during replay: {}", e);
                false
            }
        }
    }

    /// Dispatch every step and report how far it got
    ///
    /// Never fails: an abort is recorded in the report's outcome.
    pub fn run<M, I>(
        &mut self,
        motion: &mut M,
        steps: I,
        mut signals: Option<&mut dyn SignalSource>,
    ) -> DispatchReport
    where
        M: MotionControl + ?Sized,
        I: IntoIterator<Item = PlanStep>,
    {
        let mut report = DispatchReport::new();

        if self.options.manage_flight {
            let height = self.options.takeoff_height_m;
            tracing::info!("Taking off to {:.2} m", height);
            if let Err(source) = Self::timed(&mut report.stats, || motion.take_off(height)) {
                tracing::error!("Take-off refused: {}", source);
                report.outcome = DispatchOutcome::Aborted { step: 0, source };
            }
        }

        let proceed = report.outcome == DispatchOutcome::Completed;
        for step in steps.into_iter().take_while(|_| proceed) {
            if self.stop_requested(&mut signals) {
                tracing::info!("Replay stopped by operator before step {}", step.index);
                report.outcome = DispatchOutcome::Cancelled { at_step: step.index };
                break;
            }

            match step.kind {
                StepKind::Move => {
                    tracing::debug!(
                        "Step {}: {} {} at {:.3} m/s, hold {:?}",
                        step.index,
                        self.options.mode,
                        match self.options.mode {
                            ReplayMode::Relative => step.displacement,
                            ReplayMode::Waypoint => step.target,
                        },
                        step.speed,
                        step.hold
                    );
                    let result = Self::timed(&mut report.stats, || self.command(motion, &step));
                    if let Err(source) = result {
                        tracing::error!("Step {} refused: {}", step.index, source);
                        report.outcome = DispatchOutcome::Aborted {
                            step: step.index,
                            source,
                        };
                        break;
                    }
                    report.moves += 1;
                    if step.clamped {
                        report.clamped += 1;
                    }
                }
                StepKind::Skip(reason) => {
                    tracing::debug!("Step {}: skipped ({:?})", step.index, reason);
                    report.skips += 1;
                }
            }
            self.pacer.hold(step.hold);
        }

        if self.options.manage_flight {
            tracing::info!("Landing");
            if let Err(e) = Self::timed(&mut report.stats, || motion.land()) {
                tracing::error!("Landing failed: {}", e);
                report.landing_error = Some(e);
            }
        }

        tracing::info!(
            "Dispatch finished: {} moves, {} skips, {} clamped, outcome {:?}",
            report.moves,
            report.skips,
            report.clamped,
            report.outcome
        );
        report
    }

    /// Dispatch every step; an abort becomes [`ReplayError::Dispatch`]
    pub fn dispatch<M, I>(
        &mut self,
        motion: &mut M,
        steps: I,
        signals: Option<&mut dyn SignalSource>,
    ) -> Result<DispatchReport>
    where
        M: MotionControl + ?Sized,
        I: IntoIterator<Item = PlanStep>,
    {
        self.run(motion, steps, signals).into_result()
    }
}

/// Total time the pacer will hold for `steps`
pub fn planned_duration<'a, I>(steps: I) -> Duration
where
    I: IntoIterator<Item = &'a PlanStep>,
{
    steps.into_iter().map(|s| s.hold).sum()
}
