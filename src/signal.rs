//! Operator signal sources
//!
//! The recording session is gated by an operator pressing a key. The engine only
//! sees a [`SignalSource`]: something that blocks until a named gate fires.
//!
//! - [`LineSignalSource`] - reads lines from a terminal (or any `BufRead`) on a
//!   background thread; a line equal to the configured key fires the gate
//! - [`ScriptedSignalSource`] - fires a fixed sequence of gates after fixed
//!   delays, for tests and unattended runs

use crate::error::{ReplayError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::collections::VecDeque;
use std::io::BufRead;
use std::time::{Duration, Instant};

/// Gate names used by a record/replay run
pub mod token {
    /// Operator is ready (`Idle -> Armed`)
    pub const READY: &str = "ready";
    /// Start recording (`Armed -> Recording`)
    pub const START: &str = "start";
    /// Stop recording (`Recording -> Stopped`), or abort a replay
    pub const STOP: &str = "stop";
    /// Begin the replay flight
    pub const REPLAY: &str = "replay";
}

/// Source of operator gate signals
#[cfg_attr(test, mockall::automock)]
pub trait SignalSource: Send {
    /// Tell the operator what the next gate does
    fn prompt(&mut self, _token: &str, _message: &str) {}

    /// Block until the gate named `token` fires
    ///
    /// `None` waits indefinitely. Returns `Ok(false)` if the timeout elapsed
    /// first.
    fn wait_for_signal(&mut self, token: &str, timeout: Option<Duration>) -> Result<bool>;

    /// Check whether the gate has fired, without waiting
    fn try_signal(&mut self, token: &str) -> Result<bool> {
        self.wait_for_signal(token, Some(Duration::ZERO))
    }
}

/// Fires a gate whenever a line equal to `key` is read
///
/// Lines are read on a dedicated thread, so waiting can time out. Every gate
/// uses the same key; the prompt tells the operator which gate is next.
pub struct LineSignalSource {
    key: String,
    lines: Receiver<String>,
}

impl LineSignalSource {
    /// Read lines from `reader` on a background thread
    pub fn new<R>(reader: R, key: impl Into<String>) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = unbounded();
        std::thread::Builder::new()
            .name("signal-reader".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            key: key.into(),
            lines: rx,
        })
    }

    /// Read gate signals from the process's standard input
    pub fn stdin(key: impl Into<String>) -> Result<Self> {
        Self::new(std::io::BufReader::new(std::io::stdin()), key)
    }

    fn matches(&self, line: &str) -> bool {
        let line = line.trim();
        self.key.is_empty() || line.eq_ignore_ascii_case(self.key.trim())
    }
}

impl SignalSource for LineSignalSource {
    fn prompt(&mut self, _token: &str, message: &str) {
        if self.key.is_empty() {
            println!("{} [Enter]", message);
        } else {
            println!("{} [type '{}' + Enter]", message, self.key);
        }
    }

    fn wait_for_signal(&mut self, token: &str, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let line = match deadline {
                None => self
                    .lines
                    .recv()
                    .map_err(|_| {
                        ReplayError::Signal(format!("input closed while waiting for '{}'", token))
                    })?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.lines.recv_timeout(remaining) {
                        Ok(line) => line,
                        Err(RecvTimeoutError::Timeout) => return Ok(false),
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(ReplayError::Signal(format!(
                                "input closed while waiting for '{}'",
                                token
                            )))
                        }
                    }
                }
            };
            if self.matches(&line) {
                tracing::debug!("Gate '{}' fired", token);
                return Ok(true);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptedSignal {
    token: String,
    after: Duration,
}

/// Fires a fixed sequence of gates, each after a delay
///
/// Waiting for a gate that is not next in the script returns `Ok(false)` when
/// a timeout was given and an error otherwise, since it could never fire.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSignalSource {
    script: VecDeque<ScriptedSignal>,
}

impl ScriptedSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a gate that fires immediately when waited for
    pub fn then(self, token: &str) -> Self {
        self.then_after(token, Duration::ZERO)
    }

    /// Append a gate that fires `after` the wait for it begins
    pub fn then_after(mut self, token: &str, after: Duration) -> Self {
        self.script.push_back(ScriptedSignal {
            token: token.to_string(),
            after,
        });
        self
    }

    /// Gates still to fire
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl SignalSource for ScriptedSignalSource {
    fn prompt(&mut self, token: &str, message: &str) {
        tracing::debug!("[scripted] {} ({})", message, token);
    }

    fn wait_for_signal(&mut self, token: &str, timeout: Option<Duration>) -> Result<bool> {
        let next_matches = self.script.front().is_some_and(|s| s.token == token);
        if !next_matches {
            return match timeout {
                Some(t) => {
                    std::thread::sleep(t);
                    Ok(false)
                }
                None => Err(ReplayError::Signal(format!(
                    "script cannot fire '{}' (next: {:?})",
                    token,
                    self.script.front().map(|s| s.token.as_str())
                ))),
            };
        }

        let Some(next) = self.script.front_mut() else {
            return Ok(false);
        };
        match timeout {
            Some(t) if next.after > t => {
                std::thread::sleep(t);
                next.after -= t;
                Ok(false)
            }
            _ => {
                std::thread::sleep(next.after);
                self.script.pop_front();
                Ok(true)
            }
        }
    }
}
