//! Session data types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::Channel;

/// State of a recording gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Waiting for the operator to get ready
    #[default]
    Idle,
    /// Operator is ready; nothing is recorded yet
    Armed,
    /// Telemetry is being appended
    Recording,
    /// Terminal: buffer frozen, nothing more is accepted
    Stopped,
}

impl SessionState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Check if the state is terminal
    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Armed => "Armed",
            SessionState::Recording => "Recording",
            SessionState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Summary of one record/replay run, written next to the CSV artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Vehicle URI
    pub uri: String,
    /// When the run started
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    /// Telemetry sampling period in milliseconds
    pub sample_period_ms: u32,
    /// Channels that were streamed
    pub channels: BTreeSet<Channel>,
    /// Samples in the recorded trajectory
    pub recorded_samples: usize,
    /// Span of the recorded trajectory in milliseconds
    pub recorded_duration_ms: u64,
    /// Samples echoed during replay
    pub replayed_samples: usize,
    /// Motion commands issued
    pub moves: usize,
    /// Degenerate steps replaced by an idle pause
    pub skips: usize,
    /// Step at which replay stopped early, if it did
    pub aborted_at_step: Option<usize>,
    /// Human readable run outcome
    pub outcome: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state() {
        assert!(SessionState::Recording.is_recording());
        assert!(!SessionState::Armed.is_recording());
        assert!(SessionState::Stopped.is_stopped());
        assert_eq!(SessionState::default(), SessionState::Idle);
        assert_eq!(SessionState::Armed.to_string(), "Armed");
    }
}
