//! Error handling for kinreplay
//!
//! This module defines the error types shared by the recording, replay and
//! persistence layers, plus a Result alias for use throughout the crate.

use thiserror::Error;

use crate::session::types::SessionState;

/// Errors reported by the vehicle link when a motion command is refused
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The link dropped while the command was in flight
    #[error("link down")]
    LinkDown,

    /// The command would leave the vehicle's flight envelope
    #[error("command out of envelope: {0}")]
    OutOfEnvelope(String),

    /// Any other rejection reported by the vehicle
    #[error("command rejected: {0}")]
    Rejected(String),
}

/// Main error type for kinreplay operations
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The vehicle link could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Append on a buffer that has not been opened for writing
    #[error("Ordering violation: buffer is not writable")]
    OrderingViolation,

    /// Append on a buffer that has already been frozen
    #[error("Buffer closed: append after freeze")]
    BufferClosed,

    /// Recording session asked to take a transition its state does not allow
    #[error("Invalid transition: cannot {event} while {from}")]
    InvalidTransition {
        from: SessionState,
        event: &'static str,
    },

    /// The vehicle refused a motion command during replay
    #[error("Dispatch failure at step {step}: {source}")]
    Dispatch {
        step: usize,
        #[source]
        source: CommandError,
    },

    /// Writing the run artifact failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// An operator gate did not fire within the configured timeout
    #[error("Timed out waiting for operator signal: {0}")]
    GateTimeout(String),

    /// The operator signal source failed or closed
    #[error("Signal source error: {0}")]
    Signal(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ReplayError>,
    },
}

impl ReplayError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ReplayError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Step index of a dispatch failure, looking through any context wrappers
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            ReplayError::Dispatch { step, .. } => Some(*step),
            ReplayError::WithContext { source, .. } => source.failed_step(),
            _ => None,
        }
    }
}

/// Result type alias for kinreplay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
