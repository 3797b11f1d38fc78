//! Parameter round-trip probe and one-shot telemetry capture
//!
//! A bring-up check for a link: for every name of a parameter group, register an
//! update callback, then write 2 and 1 with a settle time around each write.
//! The vehicle echoes each write back through the callback on its own I/O
//! thread; the echoes are collected over a channel and returned in arrival
//! order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError};
use serde::Serialize;

use crate::error::{ReplayError, Result};
use crate::link::VehicleLink;
use crate::replay::Pacer;
use crate::types::{Channel, ChannelConfig, TelemetrySample};

/// Wait after registering a callback and after each write
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// Values written to each parameter, in order
pub const PROBE_VALUES: [f64; 2] = [2.0, 1.0];

/// One parameter change reported by the vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterUpdate {
    /// `group.name`
    pub name: String,
    pub value: f64,
}

pub struct ParameterProbe<P: Pacer> {
    group: String,
    names: Vec<String>,
    settle: Duration,
    pacer: P,
}

impl<P: Pacer> ParameterProbe<P> {
    pub fn new(group: impl Into<String>, names: Vec<String>, pacer: P) -> Self {
        Self {
            group: group.into(),
            names,
            settle: DEFAULT_SETTLE,
            pacer,
        }
    }

    /// Probe every kinematic variable name (`x`, `y`, `z`, `vx` .. `az`) of `group`
    pub fn kinematics(group: impl Into<String>, pacer: P) -> Self {
        let names = [Channel::Position, Channel::Velocity, Channel::Acceleration]
            .iter()
            .flat_map(|c| c.suffixes())
            .map(str::to_string)
            .collect();
        Self::new(group, names, pacer)
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Run the probe and return the updates the vehicle reported
    pub fn run(&mut self, link: &mut dyn VehicleLink) -> Result<Vec<ParameterUpdate>> {
        let (tx, rx) = unbounded::<ParameterUpdate>();

        for name in &self.names {
            let full_name = format!("{}.{}", self.group, name);
            let tx = tx.clone();
            link.add_parameter_callback(
                &self.group,
                name,
                Box::new(move |name: &str, value: f64| {
                    tracing::info!("The vehicle has parameter {} set at {}", name, value);
                    let _ = tx.send(ParameterUpdate {
                        name: name.to_string(),
                        value,
                    });
                }),
            )?;
            self.pacer.hold(self.settle);

            for value in PROBE_VALUES {
                tracing::debug!("Setting {} = {}", full_name, value);
                link.set_parameter(&self.group, name, value)?;
                self.pacer.hold(self.settle);
            }
        }

        // Echoes may still be in flight when the pacer does not really wait
        let expected = self.names.len() * PROBE_VALUES.len();
        let deadline = Instant::now() + self.settle.max(Duration::from_millis(100));
        let mut updates = Vec::with_capacity(expected);
        while updates.len() < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(update) => updates.push(update),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        updates.extend(rx.try_iter());

        if updates.len() < expected {
            tracing::warn!(
                "Parameter probe saw {} of {} expected updates",
                updates.len(),
                expected
            );
        }
        Ok(updates)
    }
}

/// Subscribe to `channels`, wait for the first complete frame, then unsubscribe
pub fn capture_frame(
    link: &mut dyn VehicleLink,
    channels: &ChannelConfig,
    timeout: Duration,
) -> Result<TelemetrySample> {
    let (tx, rx) = bounded::<TelemetrySample>(1);
    let decoder = channels.clone();
    let id = link.subscribe(
        channels,
        Box::new(move |timestamp: u64, values: &HashMap<String, f64>| {
            if let Some(sample) = decoder.decode(timestamp, values) {
                let _ = tx.try_send(sample);
            }
        }),
    )?;

    let result = rx.recv_timeout(timeout);
    link.unsubscribe(id);

    let sample = result.map_err(|_| {
        ReplayError::Connection(format!(
            "no telemetry from {} within {:?}",
            link.uri(),
            timeout
        ))
    })?;
    tracing::info!(
        "[{}][{}]: pos={} vel={:?} acc={:?}",
        sample.timestamp(),
        channels.block_name,
        sample.position(),
        sample.velocity(),
        sample.acceleration()
    );
    Ok(sample)
}
