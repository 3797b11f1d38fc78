//! Operator-driven recording session

use std::time::{Duration, Instant};

use crate::error::{ReplayError, Result};
use crate::signal::{token, SignalSource};
use crate::trajectory::{SampleGate, TrajectoryBuffer};

use super::types::SessionState;

/// Default slice for the recording wait
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator sent the stop signal
    Operator,
    /// The sample or duration bound was reached
    Limit,
}

/// Walks a [`SampleGate`] through `Idle -> Armed -> Recording -> Stopped`
/// in response to operator signals
#[derive(Debug)]
pub struct RecordingSession {
    gate: SampleGate,
    /// Bound on the ready/start waits
    gate_timeout: Option<Duration>,
    /// Wall-clock bound on the recording wait, for when telemetry stalls
    max_wall_time: Option<Duration>,
    poll_interval: Duration,
    started_at: Option<Instant>,
}

impl RecordingSession {
    pub fn new(gate: SampleGate) -> Self {
        Self {
            gate,
            gate_timeout: None,
            max_wall_time: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            started_at: None,
        }
    }

    pub fn with_gate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.gate_timeout = timeout;
        self
    }

    pub fn with_max_wall_time(mut self, limit: Option<Duration>) -> Self {
        self.max_wall_time = limit;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Gate feeding this session; register its handler on a subscription
    pub fn gate(&self) -> &SampleGate {
        &self.gate
    }

    pub fn state(&self) -> SessionState {
        self.gate.state()
    }

    /// Time since recording started
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    fn wait_gate(&self, signals: &mut dyn SignalSource, token: &str) -> Result<()> {
        if signals.wait_for_signal(token, self.gate_timeout)? {
            Ok(())
        } else {
            Err(ReplayError::GateTimeout(format!(
                "no '{}' signal within {:?}",
                token,
                self.gate_timeout.unwrap_or_default()
            )))
        }
    }

    /// Wait for the operator's "ready" and arm the gate
    pub fn await_ready(&mut self, signals: &mut dyn SignalSource) -> Result<()> {
        if self.state() != SessionState::Idle {
            return Err(ReplayError::InvalidTransition {
                from: self.state(),
                event: "arm",
            });
        }
        signals.prompt(token::READY, "Press to arm the recorder");
        self.wait_gate(signals, token::READY)?;
        self.gate.arm()
    }

    /// Wait for the operator's "start" and begin appending
    pub fn await_start(&mut self, signals: &mut dyn SignalSource) -> Result<()> {
        if self.state() != SessionState::Armed {
            return Err(ReplayError::InvalidTransition {
                from: self.state(),
                event: "start",
            });
        }
        signals.prompt(token::START, "Press to start recording");
        self.wait_gate(signals, token::START)?;
        self.gate.start()?;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Record until the operator stops or a bound is reached
    ///
    /// The wait is sliced so the bounds are checked even while the operator
    /// is idle.
    pub fn record_until_stopped(&mut self, signals: &mut dyn SignalSource) -> Result<StopReason> {
        if self.state() != SessionState::Recording {
            return Err(ReplayError::InvalidTransition {
                from: self.state(),
                event: "record",
            });
        }
        signals.prompt(token::STOP, "Recording; press to stop");

        loop {
            if self.gate.state().is_stopped() {
                return Ok(StopReason::Limit);
            }
            if self.max_wall_time.is_some_and(|max| self.elapsed() >= max) {
                tracing::info!("Recording wall-clock bound reached after {:?}", self.elapsed());
                self.gate.stop()?;
                return Ok(StopReason::Limit);
            }
            if signals.wait_for_signal(token::STOP, Some(self.poll_interval))? {
                self.gate.stop()?;
                return Ok(StopReason::Operator);
            }
        }
    }

    /// Hand back the frozen buffer; valid only once stopped
    pub fn take_buffer(&self) -> Result<TrajectoryBuffer> {
        self.gate.take_buffer()
    }

    /// Force the session to `Stopped` and hand back whatever was recorded
    pub fn finish(self) -> TrajectoryBuffer {
        self.gate.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{MockSignalSource, ScriptedSignalSource};
    use crate::trajectory::{Offer, RecordingLimits};
    use crate::types::{TelemetrySample, Vec3};

    fn session(limits: RecordingLimits) -> RecordingSession {
        let gate = SampleGate::new("record", TrajectoryBuffer::new(), limits);
        RecordingSession::new(gate).with_poll_interval(Duration::from_millis(5))
    }

    fn sample(t: u64) -> TelemetrySample {
        TelemetrySample::new(t, Vec3::new(0.0, t as f64 / 1000.0, 0.5))
    }

    #[test]
    fn test_full_lifecycle() {
        let mut session = session(RecordingLimits::unbounded());
        let mut signals = ScriptedSignalSource::new()
            .then(token::READY)
            .then(token::START)
            .then_after(token::STOP, Duration::from_millis(20));

        assert_eq!(session.gate().offer(sample(0)), Offer::Dropped);
        session.await_ready(&mut signals).unwrap();
        assert_eq!(session.state(), SessionState::Armed);
        assert_eq!(session.gate().offer(sample(10)), Offer::Dropped);

        session.await_start(&mut signals).unwrap();
        assert_eq!(session.gate().offer(sample(20)), Offer::Appended);
        assert_eq!(session.gate().offer(sample(30)), Offer::Appended);

        let reason = session.record_until_stopped(&mut signals).unwrap();
        assert_eq!(reason, StopReason::Operator);
        assert_eq!(session.gate().offer(sample(40)), Offer::Dropped);

        let buffer = session.take_buffer().unwrap();
        assert!(buffer.is_frozen());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_out_of_order_calls_are_rejected() {
        let mut session = session(RecordingLimits::unbounded());
        let mut signals = ScriptedSignalSource::new().then(token::START);
        assert!(matches!(
            session.await_start(&mut signals),
            Err(ReplayError::InvalidTransition { from: SessionState::Idle, .. })
        ));
        assert!(session.record_until_stopped(&mut signals).is_err());
        // The script was not consumed by the rejected calls
        assert_eq!(signals.remaining(), 1);
    }

    #[test]
    fn test_ready_timeout() {
        let mut session = session(RecordingLimits::unbounded())
            .with_gate_timeout(Some(Duration::from_millis(10)));
        let mut signals = MockSignalSource::new();
        signals.expect_prompt().return_const(());
        signals
            .expect_wait_for_signal()
            .withf(|token, timeout| token == "ready" && *timeout == Some(Duration::from_millis(10)))
            .times(1)
            .returning(|_, _| Ok(false));

        assert!(matches!(
            session.await_ready(&mut signals),
            Err(ReplayError::GateTimeout(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_sample_limit_ends_wait() {
        let limits = RecordingLimits {
            max_samples: Some(2),
            max_duration_ms: None,
        };
        let mut session = session(limits);
        let mut signals = ScriptedSignalSource::new().then(token::READY).then(token::START);
        session.await_ready(&mut signals).unwrap();
        session.await_start(&mut signals).unwrap();

        let gate = session.gate().clone();
        let producer = std::thread::spawn(move || {
            for t in 0..5 {
                gate.offer(sample(t * 100));
                std::thread::sleep(Duration::from_millis(2));
            }
        });

        // No stop signal is scripted, so only the bound can end the wait
        let reason = session.record_until_stopped(&mut signals).unwrap();
        producer.join().unwrap();
        assert_eq!(reason, StopReason::Limit);
        assert_eq!(session.take_buffer().unwrap().len(), 2);
    }

    #[test]
    fn test_wall_clock_bound_without_telemetry() {
        let mut session = session(RecordingLimits::unbounded())
            .with_max_wall_time(Some(Duration::from_millis(30)));
        let mut signals = ScriptedSignalSource::new().then(token::READY).then(token::START);
        session.await_ready(&mut signals).unwrap();
        session.await_start(&mut signals).unwrap();

        let reason = session.record_until_stopped(&mut signals).unwrap();
        assert_eq!(reason, StopReason::Limit);
        assert!(session.state().is_stopped());
        assert!(session.take_buffer().unwrap().is_empty());
    }

    #[test]
    fn test_finish_after_abort() {
        let mut session = session(RecordingLimits::unbounded());
        let mut signals = ScriptedSignalSource::new().then(token::READY).then(token::START);
        session.await_ready(&mut signals).unwrap();
        session.await_start(&mut signals).unwrap();
        session.gate().offer(sample(0));

        let buffer = session.finish();
        assert!(buffer.is_frozen());
        assert_eq!(buffer.len(), 1);
    }
}
