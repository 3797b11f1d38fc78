//! Append-only trajectory storage

use crate::error::{ReplayError, Result};
use crate::types::TelemetrySample;

/// Writability phase of a [`TrajectoryBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferPhase {
    /// Created, not yet handed to a writer
    #[default]
    Pending,
    /// Accepting appends
    Open,
    /// Read-only for the rest of its life
    Frozen,
}

/// Time-ordered sequence of samples, append-only while open and immutable
/// once frozen. Samples are never removed.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryBuffer {
    samples: Vec<TelemetrySample>,
    phase: BufferPhase,
}

impl TrajectoryBuffer {
    /// Create an empty buffer in the pending phase
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            phase: BufferPhase::Pending,
        }
    }

    /// Build an already frozen buffer from existing samples
    pub fn frozen_from(samples: Vec<TelemetrySample>) -> Self {
        Self {
            samples,
            phase: BufferPhase::Frozen,
        }
    }

    pub fn phase(&self) -> BufferPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == BufferPhase::Open
    }

    pub fn is_frozen(&self) -> bool {
        self.phase == BufferPhase::Frozen
    }

    /// Make a pending buffer writable
    pub fn open(&mut self) -> Result<()> {
        match self.phase {
            BufferPhase::Pending => {
                self.phase = BufferPhase::Open;
                Ok(())
            }
            BufferPhase::Open => Ok(()),
            BufferPhase::Frozen => Err(ReplayError::BufferClosed),
        }
    }

    /// Append a sample in delivery order
    pub fn append(&mut self, sample: TelemetrySample) -> Result<()> {
        match self.phase {
            BufferPhase::Open => {
                self.samples.push(sample);
                Ok(())
            }
            BufferPhase::Pending => Err(ReplayError::OrderingViolation),
            BufferPhase::Frozen => Err(ReplayError::BufferClosed),
        }
    }

    /// Make the buffer read-only. Freezing twice is harmless.
    pub fn freeze(&mut self) {
        self.phase = BufferPhase::Frozen;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&TelemetrySample> {
        self.samples.get(index)
    }

    /// Samples in recorded order; call again to restart
    pub fn iter(&self) -> std::slice::Iter<'_, TelemetrySample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[TelemetrySample] {
        &self.samples
    }

    pub fn first(&self) -> Option<&TelemetrySample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&TelemetrySample> {
        self.samples.last()
    }

    /// Time between the first and last sample in milliseconds
    pub fn duration_ms(&self) -> u64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.timestamp().saturating_sub(first.timestamp()),
            _ => 0,
        }
    }

    /// Whether every adjacent pair has strictly increasing timestamps
    pub fn timestamps_monotonic(&self) -> bool {
        self.samples
            .windows(2)
            .all(|pair| pair[1].timestamp() > pair[0].timestamp())
    }
}

impl<'a> IntoIterator for &'a TrajectoryBuffer {
    type Item = &'a TelemetrySample;
    type IntoIter = std::slice::Iter<'a, TelemetrySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
