//! Holding between replay steps

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Waits out the hold that follows each replay step
pub trait Pacer: Send {
    fn hold(&mut self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn hold(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records holds instead of sleeping
///
/// Clones share the same log, so a test can keep one and hand the other to a
/// dispatcher.
#[derive(Debug, Clone, Default)]
pub struct RecordingPacer {
    holds: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds requested so far, in order
    pub fn holds(&self) -> Vec<Duration> {
        self.holds.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sum of all holds
    pub fn total(&self) -> Duration {
        self.holds().iter().sum()
    }
}

impl Pacer for RecordingPacer {
    fn hold(&mut self, duration: Duration) {
        self.holds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}
