//! Motion command statistics

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Size of the rolling window for recent command latencies
const RECENT_WINDOW_SIZE: usize = 50;

/// Acceptance counts and latency for motion commands sent during a replay
///
/// Latency is the time a blocking command call took to return.
#[derive(Debug, Clone, Serialize)]
pub struct CommandStats {
    /// Commands the vehicle accepted
    pub accepted: u64,
    /// Commands the vehicle refused
    pub rejected: u64,
    /// Total latency of accepted commands in microseconds
    pub total_latency_us: u64,
    /// Fastest accepted command (microseconds)
    pub min_latency_us: u64,
    /// Slowest accepted command (microseconds)
    pub max_latency_us: u64,
    #[serde(skip)]
    recent_latency_us: VecDeque<u64>,
}

impl Default for CommandStats {
    fn default() -> Self {
        Self {
            accepted: 0,
            rejected: 0,
            total_latency_us: 0,
            min_latency_us: u64::MAX,
            max_latency_us: 0,
            recent_latency_us: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl CommandStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted command and how long the call blocked
    pub fn record_accepted(&mut self, latency: Duration) {
        let us = latency.as_micros().min(u64::MAX as u128) as u64;
        self.accepted += 1;
        self.total_latency_us += us;
        self.min_latency_us = self.min_latency_us.min(us);
        self.max_latency_us = self.max_latency_us.max(us);

        self.recent_latency_us.push_back(us);
        if self.recent_latency_us.len() > RECENT_WINDOW_SIZE {
            self.recent_latency_us.pop_front();
        }
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Mean latency of accepted commands in microseconds
    pub fn avg_latency_us(&self) -> f64 {
        if self.accepted == 0 {
            0.0
        } else {
            self.total_latency_us as f64 / self.accepted as f64
        }
    }

    /// Spread (max - min) of the recent latency window
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_latency_us.iter().min().copied().unwrap_or(0);
        let max = self.recent_latency_us.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }

    /// Percentage of commands accepted; 100 when nothing was sent
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.accepted + self.rejected;
        if total == 0 {
            100.0
        } else {
            self.accepted as f64 / total as f64 * 100.0
        }
    }
}
