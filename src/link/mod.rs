//! Vehicle link abstraction
//!
//! The radio link, its telemetry protocol and the vehicle's motion execution
//! are provided by a vehicle SDK. This module describes what the record/replay
//! engine needs from it, so the engine can run against real hardware, the
//! [`SimulatedVehicle`] or a test double.
//!
//! # Components
//!
//! - [`LinkConnector`] - Opens a link from a URI
//! - [`VehicleLink`] - An open link: telemetry subscriptions, parameters, motion
//! - [`MotionControl`] - The motion-command half of a link, used by the dispatcher
//! - [`LinkGuard`] - Owns a link for one run and disconnects it on every exit path
//! - [`CommandStats`] - Latency and success tracking for motion commands
//!
//! # Threading
//!
//! Telemetry and parameter handlers are invoked on the link's own I/O thread.
//! They must return quickly and must not block; the engine's handlers only take
//! a short lock and append.

pub mod stats;

#[cfg(feature = "sim-link")]
pub mod sim;

pub use crate::error::CommandError;
pub use stats::CommandStats;

#[cfg(feature = "sim-link")]
pub use sim::{SimCommand, SimConfig, SimLog, SimPattern, SimulatedConnector, SimulatedVehicle};

use crate::error::{ReplayError, Result};
use crate::types::ChannelConfig;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Push handler for one telemetry frame: `(timestamp_ms, values_by_name)`
pub type TelemetryHandler = Box<dyn FnMut(u64, &HashMap<String, f64>) + Send>;

/// Push handler for parameter updates: `(full_name, value)`
pub type ParameterHandler = Box<dyn FnMut(&str, f64) + Send>;

/// Identifies an active telemetry subscription on a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u32);

/// Motion commands understood by the vehicle
///
/// Every call blocks until the vehicle has accepted (or refused) the command.
#[cfg_attr(test, mockall::automock)]
pub trait MotionControl {
    /// Move by a displacement relative to the current position, at `speed` m/s
    fn move_by(
        &mut self,
        dx: f64,
        dy: f64,
        dz: f64,
        speed: f64,
    ) -> std::result::Result<(), CommandError>;

    /// Fly to an absolute position at `speed` m/s
    fn go_to(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        speed: f64,
    ) -> std::result::Result<(), CommandError>;

    /// Take off and hold at `height` metres
    fn take_off(&mut self, height: f64) -> std::result::Result<(), CommandError>;

    /// Land at the current position
    fn land(&mut self) -> std::result::Result<(), CommandError>;
}

/// An open connection to one vehicle
pub trait VehicleLink: MotionControl + Send {
    /// URI the link was opened with
    fn uri(&self) -> &str;

    /// Whether the link is still up
    fn is_connected(&self) -> bool;

    /// Start streaming the variables of `channels` to `handler`
    ///
    /// Delivery is asynchronous and preserves order per subscription.
    fn subscribe(
        &mut self,
        channels: &ChannelConfig,
        handler: TelemetryHandler,
    ) -> Result<SubscriptionId>;

    /// Stop a subscription. When this returns the handler is no longer called.
    fn unsubscribe(&mut self, id: SubscriptionId);

    /// Set a parameter value on the vehicle
    fn set_parameter(&mut self, group: &str, name: &str, value: f64) -> Result<()>;

    /// Register a handler called whenever the parameter changes
    fn add_parameter_callback(
        &mut self,
        group: &str,
        name: &str,
        handler: ParameterHandler,
    ) -> Result<()>;

    /// Close the link. Must be safe to call more than once.
    fn disconnect(&mut self);
}

/// Opens vehicle links
pub trait LinkConnector {
    /// Connect to the vehicle at `uri`
    fn connect(&self, uri: &str) -> Result<Box<dyn VehicleLink>>;
}

/// Exclusive, scoped ownership of a vehicle link
///
/// The link is disconnected when the guard is dropped, whatever path the run
/// takes out of its scope.
pub struct LinkGuard {
    link: Box<dyn VehicleLink>,
}

impl LinkGuard {
    pub fn new(link: Box<dyn VehicleLink>) -> Self {
        Self { link }
    }

    /// Connect through `connector` and wrap the link
    pub fn connect(connector: &dyn LinkConnector, uri: &str) -> Result<Self> {
        tracing::info!("Connecting to {}", uri);
        let link = connector.connect(uri).map_err(|e| match e {
            ReplayError::Connection(_) => e,
            other => ReplayError::Connection(other.to_string()),
        })?;
        tracing::info!("Connected to {}", link.uri());
        Ok(Self::new(link))
    }
}

impl Deref for LinkGuard {
    type Target = dyn VehicleLink;

    fn deref(&self) -> &Self::Target {
        self.link.as_ref()
    }
}

impl DerefMut for LinkGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.link.as_mut()
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        tracing::info!("Disconnecting from {}", self.link.uri());
        self.link.disconnect();
    }
}
