//! Mock construction helpers

use std::path::Path;
use std::time::Duration;

use kinreplay::config::RunConfig;
use kinreplay::signal::{token, ScriptedSignalSource};

#[cfg(feature = "sim-link")]
use kinreplay::link::{SimConfig, SimPattern, SimulatedConnector};
#[cfg(feature = "sim-link")]
use kinreplay::Vec3;

/// Ready, start, stop after `record_for`, then replay
pub fn scripted_run(record_for: Duration) -> ScriptedSignalSource {
    ScriptedSignalSource::new()
        .then(token::READY)
        .then(token::START)
        .then_after(token::STOP, record_for)
        .then(token::REPLAY)
}

/// Fast config for the simulated vehicle writing into `output_dir`
pub fn sim_run_config(output_dir: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.link.uri = "sim://integration".to_string();
    config.channels.sample_period_ms = 10;
    config.replay.manage_flight = false;
    config.persistence.output_dir = output_dir.to_path_buf();
    config
}

/// Simulated vehicle drifting steadily so every recorded step is a move
#[cfg(feature = "sim-link")]
pub fn create_drifting_connector(config: SimConfig) -> SimulatedConnector {
    SimulatedConnector::new(
        config
            .with_pattern(SimPattern::Line {
                origin: Vec3::new(0.0, 0.0, 0.5),
                velocity: Vec3::new(0.25, -0.1, 0.05),
            })
            .with_command_latency(Duration::ZERO),
    )
}

/// Simulated vehicle holding still
#[cfg(feature = "sim-link")]
pub fn create_hovering_connector() -> SimulatedConnector {
    SimulatedConnector::new(
        SimConfig::default()
            .with_pattern(SimPattern::Hover(Vec3::new(0.0, 0.0, 0.5)))
            .with_command_latency(Duration::ZERO),
    )
}
