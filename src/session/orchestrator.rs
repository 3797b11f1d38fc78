//! One complete record/replay run
//!
//! The orchestrator owns the link and both trajectory buffers for the length
//! of a run:
//!
//! 1. Connect (the only failure returned as `Err`)
//! 2. Arm, record and stop under operator control
//! 3. Wait for the replay gate, start the echo recording, plan and dispatch
//! 4. Always: stop subscriptions, freeze both buffers, persist, disconnect
//!
//! Any error after connecting ends the run early but still goes through step 4
//! and is reported in [`RunReport::outcome`].

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::RunConfig;
use crate::error::{ReplayError, Result, ResultExt};
use crate::link::{LinkConnector, LinkGuard, SubscriptionId};
use crate::replay::{CommandDispatcher, DispatchOutcome, DispatchReport, Pacer};
use crate::signal::{token, SignalSource};
use crate::trajectory::{RecordingLimits, SampleGate, TrajectoryBuffer};

use super::recorder::{RecordingSession, StopReason};
use super::types::SessionMetadata;

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    /// The operator stopped the replay before `at_step`
    Cancelled { at_step: usize },
    Failed(ReplayError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn error(&self) -> Option<&ReplayError> {
        match self {
            RunOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Cancelled { at_step } => write!(f, "cancelled before step {}", at_step),
            RunOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunReport {
    /// Frozen recorded trajectory
    pub recorded: TrajectoryBuffer,
    /// Frozen telemetry echoed during replay
    pub replayed: TrajectoryBuffer,
    /// Why recording ended, if it got that far
    pub stop_reason: Option<StopReason>,
    /// Samples the recording gate dropped
    pub dropped_samples: u64,
    /// Dispatch summary, if replay started
    pub dispatch: Option<DispatchReport>,
    /// Path of the written artifact
    pub artifact: Option<PathBuf>,
    pub persistence_error: Option<ReplayError>,
    pub outcome: RunOutcome,
}

/// What the run phases hand over to cleanup
#[derive(Default)]
struct Progress {
    subscriptions: Vec<SubscriptionId>,
    recorded: Option<TrajectoryBuffer>,
    stop_reason: Option<StopReason>,
    dispatch: Option<DispatchReport>,
}

/// Drives a run from connection to persistence
pub struct SessionOrchestrator<'c> {
    connector: &'c dyn LinkConnector,
    config: RunConfig,
}

impl<'c> SessionOrchestrator<'c> {
    pub fn new(connector: &'c dyn LinkConnector, config: RunConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run one record/replay session
    ///
    /// Only a failed connection is returned as `Err`; every later failure is
    /// reported in the returned [`RunReport`] after cleanup has run.
    pub fn run<P: Pacer>(&self, signals: &mut dyn SignalSource, pacer: P) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut link = LinkGuard::connect(self.connector, &self.config.link.uri)?;

        let record_gate = SampleGate::new(
            "record",
            TrajectoryBuffer::new(),
            self.config.recording.limits(),
        );
        let replay_gate =
            SampleGate::new("replay", TrajectoryBuffer::new(), RecordingLimits::unbounded());

        let mut progress = Progress::default();
        let result = self.drive(
            &mut link,
            &record_gate,
            &replay_gate,
            signals,
            pacer,
            &mut progress,
        );
        if let Err(e) = &result {
            tracing::error!("Run ended early: {}", e);
        }

        // Cleanup runs on every path from here on
        for id in progress.subscriptions.drain(..) {
            link.unsubscribe(id);
        }
        let recorded = progress.recorded.take().unwrap_or_else(|| record_gate.finish());
        let replayed = replay_gate.finish();

        let outcome = match result {
            Err(e) => RunOutcome::Failed(e),
            Ok(()) => match progress.dispatch.as_ref().map(|d| &d.outcome) {
                Some(DispatchOutcome::Cancelled { at_step }) => {
                    RunOutcome::Cancelled { at_step: *at_step }
                }
                _ => RunOutcome::Completed,
            },
        };

        let metadata = self.metadata(
            started_at,
            &recorded,
            &replayed,
            progress.dispatch.as_ref(),
            &outcome,
        );
        let (artifact, persistence_error) =
            match self
                .config
                .persistence
                .sink()
                .write(recorded.as_slice(), replayed.as_slice(), Some(&metadata))
            {
                Ok(path) => (Some(path), None),
                Err(e) => {
                    tracing::error!("Failed to save run artifact: {}", e);
                    (None, Some(e))
                }
            };

        drop(link);
        tracing::info!(
            "Run {}: {} recorded, {} replayed samples",
            outcome,
            recorded.len(),
            replayed.len()
        );

        Ok(RunReport {
            recorded,
            replayed,
            stop_reason: progress.stop_reason,
            dropped_samples: record_gate.dropped(),
            dispatch: progress.dispatch,
            artifact,
            persistence_error,
            outcome,
        })
    }

    fn drive<P: Pacer>(
        &self,
        link: &mut LinkGuard,
        record_gate: &SampleGate,
        replay_gate: &SampleGate,
        signals: &mut dyn SignalSource,
        pacer: P,
        progress: &mut Progress,
    ) -> Result<()> {
        let channels = &self.config.channels;
        let recording_config = &self.config.recording;
        let gate_timeout = recording_config.gate_timeout();

        // Telemetry time lags the wall clock by up to one period; give the
        // telemetry bound the first chance to end the recording
        let slack = Duration::from_millis(2 * u64::from(channels.sample_period_ms));
        let mut recording = RecordingSession::new(record_gate.clone())
            .with_gate_timeout(gate_timeout)
            .with_max_wall_time(recording_config.max_duration().map(|d| d + slack));

        // Record
        recording.await_ready(signals)?;
        recording.await_start(signals)?;
        let record_id = link
            .subscribe(channels, record_gate.handler(channels.clone()))
            .context("subscribing to recording telemetry")?;
        progress.subscriptions.push(record_id);
        tracing::info!(
            "Streaming {} every {} ms ({} bytes per frame)",
            channels
                .active_channels()
                .iter()
                .map(|c| c.display_name())
                .collect::<Vec<_>>()
                .join(", "),
            channels.sample_period_ms,
            channels.payload_bytes()
        );
        progress.stop_reason = Some(recording.record_until_stopped(signals)?);
        link.unsubscribe(record_id);
        progress.subscriptions.retain(|id| *id != record_id);

        let recorded = recording.take_buffer()?;
        tracing::info!(
            "Recorded {} samples over {} ms ({} dropped)",
            recorded.len(),
            recorded.duration_ms(),
            record_gate.dropped()
        );
        if !recorded.timestamps_monotonic() {
            tracing::warn!("Recorded timestamps are not strictly increasing");
        }
        let recorded = progress.recorded.insert(recorded);

        // Replay
        signals.prompt(token::REPLAY, "Press to start the replay");
        if !signals.wait_for_signal(token::REPLAY, gate_timeout)? {
            return Err(ReplayError::GateTimeout(format!(
                "no '{}' signal within {:?}",
                token::REPLAY,
                gate_timeout.unwrap_or_default()
            )));
        }

        if recorded.len() < 2 {
            tracing::warn!("Nothing to replay: {} recorded samples", recorded.len());
            return Ok(());
        }

        replay_gate.arm()?;
        let replay_id = link
            .subscribe(channels, replay_gate.handler(channels.clone()))
            .context("subscribing to replay telemetry")?;
        progress.subscriptions.push(replay_id);
        replay_gate.start()?;

        let planner = self.config.replay.planner();
        let mut dispatcher = CommandDispatcher::new(self.config.replay.dispatch_options(), pacer);
        tracing::info!(
            "Replaying {} steps in {} mode",
            recorded.len() - 1,
            self.config.replay.mode
        );
        let report = dispatcher.run(&mut **link, planner.plan(recorded.as_slice()), Some(signals));
        let error = report.error();
        progress.dispatch = Some(report);
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn metadata(
        &self,
        started_at: DateTime<Utc>,
        recorded: &TrajectoryBuffer,
        replayed: &TrajectoryBuffer,
        dispatch: Option<&DispatchReport>,
        outcome: &RunOutcome,
    ) -> SessionMetadata {
        SessionMetadata {
            uri: self.config.link.uri.clone(),
            recorded_at: started_at,
            sample_period_ms: self.config.channels.sample_period_ms,
            channels: self.config.channels.channels.clone(),
            recorded_samples: recorded.len(),
            recorded_duration_ms: recorded.duration_ms(),
            replayed_samples: replayed.len(),
            moves: dispatch.map_or(0, |d| d.moves),
            skips: dispatch.map_or(0, |d| d.skips),
            aborted_at_step: dispatch.and_then(|d| d.stopped_at()),
            outcome: outcome.to_string(),
        }
    }
}
