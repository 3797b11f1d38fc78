//! Turns a recorded trajectory into relative motion steps
//!
//! Each adjacent pair of samples becomes one [`PlanStep`]: the displacement
//! between them, the speed that covers it in the recorded interval, and how
//! long to hold afterwards. Pairs that cannot produce a meaningful speed
//! (repeated or backwards timestamps, no movement, non-finite positions) become
//! skips: no command, just a minimal pause.

use std::time::Duration;

use crate::types::{TelemetrySample, Vec3};

/// Pause used in place of a degenerate step
pub const MIN_HOLD: Duration = Duration::from_millis(10);

/// Why a step carries no command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Both samples share a timestamp
    ZeroInterval,
    /// The later sample has an earlier timestamp
    NegativeInterval,
    /// No displacement between the samples
    Stationary,
    /// A position component was NaN or infinite
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Issue a motion command
    Move,
    /// Hold without commanding
    Skip(SkipReason),
}

/// One step of a replay plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanStep {
    /// Index of the later sample of the pair (1-based step number)
    pub index: usize,
    /// Relative displacement to command
    pub displacement: Vec3,
    /// Absolute position of the later sample
    pub target: Vec3,
    /// Commanded speed in m/s; zero for skips
    pub speed: f64,
    /// Signed recorded interval in seconds
    pub interval_s: f64,
    /// Wait after the command (or in place of it)
    pub hold: Duration,
    pub kind: StepKind,
    /// Speed was reduced to the configured maximum
    pub clamped: bool,
}

impl PlanStep {
    pub fn is_move(&self) -> bool {
        self.kind == StepKind::Move
    }

    pub fn is_skip(&self) -> bool {
        !self.is_move()
    }
}

/// Stateless step planner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayPlanner {
    min_hold: Duration,
    max_speed_mps: Option<f64>,
}

impl Default for ReplayPlanner {
    fn default() -> Self {
        Self {
            min_hold: MIN_HOLD,
            max_speed_mps: None,
        }
    }
}

impl ReplayPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause used for skipped steps
    pub fn with_min_hold(mut self, hold: Duration) -> Self {
        self.min_hold = hold;
        self
    }

    /// Clamp commanded speeds to `max` m/s
    pub fn with_max_speed(mut self, max: Option<f64>) -> Self {
        self.max_speed_mps = max.filter(|m| m.is_finite() && *m > 0.0);
        self
    }

    pub fn min_hold(&self) -> Duration {
        self.min_hold
    }

    /// Lazily plan every adjacent pair of `samples`
    ///
    /// Yields `samples.len() - 1` steps (none for fewer than two samples).
    pub fn plan<'a>(&self, samples: &'a [TelemetrySample]) -> PlanSteps<'a> {
        PlanSteps {
            planner: *self,
            samples,
            next: 1,
        }
    }

    /// Plan the step between `prev` and `next`
    pub fn step(&self, index: usize, prev: &TelemetrySample, next: &TelemetrySample) -> PlanStep {
        let interval_ms = next.timestamp() as i128 - prev.timestamp() as i128;
        let interval_s = interval_ms as f64 / 1000.0;
        let displacement = next.position() - prev.position();

        let raw_speed = if interval_s > 0.0 {
            displacement.norm() / interval_s
        } else {
            0.0
        };

        let skip = if interval_ms == 0 {
            Some(SkipReason::ZeroInterval)
        } else if interval_ms < 0 {
            Some(SkipReason::NegativeInterval)
        } else if !raw_speed.is_finite() || !displacement.is_finite() {
            Some(SkipReason::NonFinite)
        } else if raw_speed == 0.0 {
            Some(SkipReason::Stationary)
        } else {
            None
        };

        if let Some(reason) = skip {
            tracing::debug!(
                "Step {}: degenerate ({:?}, dt={}s), holding {:?}",
                index,
                reason,
                interval_s,
                self.min_hold
            );
            return PlanStep {
                index,
                displacement,
                target: next.position(),
                speed: 0.0,
                interval_s,
                hold: self.min_hold,
                kind: StepKind::Skip(reason),
                clamped: false,
            };
        }

        let (speed, clamped) = match self.max_speed_mps {
            Some(max) if raw_speed > max => {
                tracing::warn!(
                    "Step {}: speed {:.3} m/s clamped to {:.3} m/s",
                    index,
                    raw_speed,
                    max
                );
                (max, true)
            }
            _ => (raw_speed, false),
        };

        PlanStep {
            index,
            displacement,
            target: next.position(),
            speed,
            interval_s,
            hold: Duration::from_millis(interval_ms as u64),
            kind: StepKind::Move,
            clamped,
        }
    }
}

/// Iterator over the steps of a plan
#[derive(Debug)]
pub struct PlanSteps<'a> {
    planner: ReplayPlanner,
    samples: &'a [TelemetrySample],
    next: usize,
}

impl Iterator for PlanSteps<'_> {
    type Item = PlanStep;

    fn next(&mut self) -> Option<PlanStep> {
        let next = self.samples.get(self.next)?;
        let prev = &self.samples[self.next - 1];
        let step = self.planner.step(self.next, prev, next);
        self.next += 1;
        Some(step)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.samples.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PlanSteps<'_> {}
