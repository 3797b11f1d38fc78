//! Run configuration for kinreplay
//!
//! One [`RunConfig`] describes a record/replay run: which vehicle to connect
//! to, what to stream, how recording is bounded, how the trajectory is
//! replayed and where the artifact goes. It is stored as TOML.
//!
//! # Config Location
//!
//! The default config file lives in the platform data directory:
//! - **Linux**: `~/.local/share/kinreplay/kinreplay.toml`
//! - **macOS**: `~/Library/Application Support/kinreplay/kinreplay.toml`
//! - **Windows**: `%APPDATA%\kinreplay\kinreplay.toml`
//!
//! # Example
//!
//! ```toml
//! [link]
//! uri = "radio://0/80/2M/E7E7E7E7E7"
//!
//! [channels]
//! sample_period_ms = 100
//! channels = ["position", "velocity"]
//!
//! [recording]
//! max_duration_ms = 20000
//! gate_key = "s"
//!
//! [replay]
//! mode = "relative"
//! manage_flight = true
//! ```

use crate::error::{ReplayError, Result};
use crate::persistence::{PersistenceSink, DEFAULT_FILE_PREFIX};
use crate::replay::{DispatchOptions, ReplayMode, ReplayPlanner};
use crate::trajectory::RecordingLimits;
use crate::types::ChannelConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "kinreplay";

/// Config filename
pub const CONFIG_FILE: &str = "kinreplay.toml";

/// Default vehicle URI
pub const DEFAULT_URI: &str = "radio://0/80/2M/E7E7E7E7E7";

/// Default pause for degenerate replay steps, in milliseconds
pub const DEFAULT_MIN_HOLD_MS: u64 = 10;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path of the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Sections ====================

/// Vehicle link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub uri: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
        }
    }
}

/// Recording bounds and operator gates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Stop after this many samples
    pub max_samples: Option<usize>,
    /// Stop after this many milliseconds of recording
    pub max_duration_ms: Option<u64>,
    /// Give up on an operator gate after this long; unset waits forever
    pub gate_timeout_ms: Option<u64>,
    /// Line the operator types to fire a gate; empty means any Enter
    pub gate_key: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_samples: None,
            max_duration_ms: None,
            gate_timeout_ms: None,
            gate_key: "s".to_string(),
        }
    }
}

impl RecordingConfig {
    pub fn limits(&self) -> RecordingLimits {
        RecordingLimits {
            max_samples: self.max_samples,
            max_duration_ms: self.max_duration_ms,
        }
    }

    pub fn gate_timeout(&self) -> Option<Duration> {
        self.gate_timeout_ms.map(Duration::from_millis)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }
}

/// Replay planning and dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub mode: ReplayMode,
    /// Pause used for degenerate steps
    pub min_hold_ms: u64,
    /// Clamp commanded speeds (m/s)
    pub max_speed_mps: Option<f64>,
    /// Take off before replay and land afterwards
    pub manage_flight: bool,
    pub takeoff_height_m: f64,
    /// Let the operator's stop key end a replay early
    pub stop_on_signal: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            mode: ReplayMode::Relative,
            min_hold_ms: DEFAULT_MIN_HOLD_MS,
            max_speed_mps: None,
            manage_flight: true,
            takeoff_height_m: 0.5,
            stop_on_signal: false,
        }
    }
}

impl ReplayConfig {
    pub fn planner(&self) -> ReplayPlanner {
        ReplayPlanner::new()
            .with_min_hold(Duration::from_millis(self.min_hold_ms))
            .with_max_speed(self.max_speed_mps)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            mode: self.mode,
            manage_flight: self.manage_flight,
            takeoff_height_m: self.takeoff_height_m,
            stop_on_signal: self.stop_on_signal,
        }
    }
}

/// Artifact output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    /// Write a JSON summary next to the CSV
    pub write_metadata: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            write_metadata: false,
        }
    }
}

impl PersistenceConfig {
    pub fn sink(&self) -> PersistenceSink {
        PersistenceSink::new(&self.output_dir)
            .with_prefix(&self.file_prefix)
            .with_metadata(self.write_metadata)
    }
}

/// Log output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write daily rolling log files here
    pub log_dir: Option<PathBuf>,
}

// ==================== Run Config ====================

/// Complete configuration of one record/replay run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub link: LinkConfig,
    pub channels: ChannelConfig,
    pub recording: RecordingConfig,
    pub replay: ReplayConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

impl RunConfig {
    /// Parse from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ReplayError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ReplayError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplayError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReplayError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, self.to_toml()?).map_err(|e| {
            ReplayError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject settings no run could work with
    pub fn validate(&self) -> Result<()> {
        if self.link.uri.trim().is_empty() {
            return Err(ReplayError::Config("link.uri must not be empty".to_string()));
        }
        if self.channels.sample_period_ms == 0 {
            return Err(ReplayError::Config(
                "channels.sample_period_ms must be positive".to_string(),
            ));
        }
        if let Some(max) = self.replay.max_speed_mps {
            if !(max.is_finite() && max > 0.0) {
                return Err(ReplayError::Config(format!(
                    "replay.max_speed_mps must be positive, got {}",
                    max
                )));
            }
        }
        if self.replay.manage_flight && !(self.replay.takeoff_height_m > 0.0) {
            return Err(ReplayError::Config(format!(
                "replay.takeoff_height_m must be positive, got {}",
                self.replay.takeoff_height_m
            )));
        }
        if self.recording.max_samples == Some(0) {
            return Err(ReplayError::Config(
                "recording.max_samples must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
