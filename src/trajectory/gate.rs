//! State-gated access to a trajectory buffer
//!
//! The telemetry handler runs on the link's I/O thread while the control
//! thread drives state transitions. Both go through [`SampleGate`], which keeps
//! the session state and the buffer under a single mutex: the handler's
//! "is recording? then append" check is atomic with the append, and the
//! `Recording -> Stopped` transition is the barrier after which the frozen
//! buffer can be read without further synchronization.
//!
//! Critical sections are O(1) and never perform I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ReplayError, Result};
use crate::link::TelemetryHandler;
use crate::session::types::SessionState;
use crate::types::{ChannelConfig, TelemetrySample};

use super::buffer::TrajectoryBuffer;

/// Optional bounds that end a recording without an operator signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingLimits {
    /// Stop after this many samples
    pub max_samples: Option<usize>,
    /// Stop once the recorded span (by telemetry timestamp) reaches this many ms
    pub max_duration_ms: Option<u64>,
}

impl RecordingLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    fn reached(&self, buffer: &TrajectoryBuffer) -> bool {
        let by_count = self.max_samples.is_some_and(|max| buffer.len() >= max);
        let by_time = self
            .max_duration_ms
            .is_some_and(|max| buffer.duration_ms() >= max);
        by_count || by_time
    }
}

/// What happened to a sample offered to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Appended to the buffer
    Appended,
    /// Appended, and the recording bound was reached by it
    LimitReached,
    /// Dropped because the gate was not recording
    Dropped,
}

#[derive(Debug)]
struct GateInner {
    state: SessionState,
    buffer: TrajectoryBuffer,
    limits: RecordingLimits,
}

/// Shared handle pairing a session state with the buffer it gates
#[derive(Debug, Clone)]
pub struct SampleGate {
    name: &'static str,
    inner: Arc<Mutex<GateInner>>,
    dropped: Arc<AtomicU64>,
}

impl SampleGate {
    /// Take ownership of `buffer` for the duration of one phase
    pub fn new(name: &'static str, buffer: TrajectoryBuffer, limits: RecordingLimits) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(GateInner {
                state: SessionState::Idle,
                buffer,
                limits,
            })),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        // A poisoned gate only means a handler panicked mid-append; the
        // buffer itself is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Number of samples appended so far
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of samples dropped because the gate was not recording
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// `Idle -> Armed`
    pub fn arm(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Idle => inner.state = SessionState::Armed,
                from => return Err(ReplayError::InvalidTransition { from, event: "arm" }),
            }
        }
        tracing::info!("{} gate armed", self.name);
        Ok(())
    }

    /// `Armed -> Recording`; opens the buffer
    pub fn start(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Armed => {
                    inner.buffer.open()?;
                    inner.state = SessionState::Recording;
                }
                from => return Err(ReplayError::InvalidTransition { from, event: "start" }),
            }
        }
        tracing::info!("{} gate recording", self.name);
        Ok(())
    }

    /// `Recording -> Stopped`; freezes the buffer
    ///
    /// Stopping an already stopped gate (e.g. one that hit its limit) is a
    /// no-op so the operator's stop signal never races the bound.
    pub fn stop(&self) -> Result<()> {
        let len = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Recording => {
                    inner.buffer.freeze();
                    inner.state = SessionState::Stopped;
                    inner.buffer.len()
                }
                SessionState::Stopped => return Ok(()),
                from => return Err(ReplayError::InvalidTransition { from, event: "stop" }),
            }
        };
        tracing::info!(
            "{} gate stopped with {} samples ({} dropped)",
            self.name,
            len,
            self.dropped()
        );
        Ok(())
    }

    /// Offer one sample from the telemetry stream
    ///
    /// Never fails: anything that cannot be appended is dropped and counted.
    pub fn offer(&self, sample: TelemetrySample) -> Offer {
        let mut inner = self.lock();
        if inner.state != SessionState::Recording {
            drop(inner);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Offer::Dropped;
        }

        if let Err(e) = inner.buffer.append(sample) {
            drop(inner);
            // Only reachable if the state machine and buffer disagree
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("{} gate rejected sample: {}", self.name, e);
            return Offer::Dropped;
        }

        if inner.limits.reached(&inner.buffer) {
            inner.buffer.freeze();
            inner.state = SessionState::Stopped;
            let len = inner.buffer.len();
            drop(inner);
            tracing::info!("{} gate reached its recording limit after {} samples", self.name, len);
            return Offer::LimitReached;
        }
        Offer::Appended
    }

    /// Build the push handler registered on a telemetry subscription
    pub fn handler(&self, channels: ChannelConfig) -> TelemetryHandler {
        let gate = self.clone();
        Box::new(move |timestamp: u64, values: &HashMap<String, f64>| {
            match channels.decode(timestamp, values) {
                Some(sample) => {
                    if gate.offer(sample) != Offer::Dropped {
                        tracing::trace!(
                            "[{}] t={} pos={} vel={:?} acc={:?}",
                            gate.name,
                            timestamp,
                            sample.position(),
                            sample.velocity(),
                            sample.acceleration()
                        );
                    }
                }
                None => {
                    tracing::warn!("[{}] incomplete telemetry frame at t={}", gate.name, timestamp);
                    gate.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        })
    }

    /// Hand the frozen buffer back to its owner
    ///
    /// Only allowed once the gate has stopped; the gate keeps an empty frozen
    /// buffer so late pushes still have nowhere to land.
    pub fn take_buffer(&self) -> Result<TrajectoryBuffer> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Stopped => Ok(std::mem::replace(
                &mut inner.buffer,
                TrajectoryBuffer::frozen_from(Vec::new()),
            )),
            from => Err(ReplayError::InvalidTransition {
                from,
                event: "take buffer",
            }),
        }
    }

    /// Stop the gate if it is still recording, then take the buffer
    ///
    /// Used on cleanup paths, where the gate may be in any state.
    pub fn finish(&self) -> TrajectoryBuffer {
        let (was_recording, mut buffer) = {
            let mut inner = self.lock();
            let was_recording = inner.state == SessionState::Recording;
            inner.state = SessionState::Stopped;
            let buffer = std::mem::replace(
                &mut inner.buffer,
                TrajectoryBuffer::frozen_from(Vec::new()),
            );
            (was_recording, buffer)
        };
        if was_recording {
            tracing::info!("{} gate stopped during cleanup", self.name);
        }
        buffer.freeze();
        buffer
    }
}
