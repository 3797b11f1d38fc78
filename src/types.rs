//! Core data types for kinreplay
//!
//! This module contains the value types shared by every layer of the
//! record/replay pipeline.
//!
//! # Main Types
//!
//! - [`Vec3`] - A 3-vector of `f64` with the little arithmetic the planner needs
//! - [`TelemetrySample`] - One timestamped kinematic reading
//! - [`Channel`] - Optional kinematic channel (position, velocity, acceleration)
//! - [`ChannelConfig`] - Which variables the link is asked to stream, and how often
//! - [`VariableType`] - Numeric type tag attached to each streamed variable

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::{Add, Sub};

/// Default telemetry sampling period in milliseconds
pub const DEFAULT_SAMPLE_PERIOD_MS: u32 = 100;

/// Default log block name
pub const DEFAULT_LOG_BLOCK: &str = "KinematicsLog";

/// Default variable group on the vehicle
pub const DEFAULT_VARIABLE_GROUP: &str = "stateEstimate";

/// A 3-vector of floats (metres, m/s or m/s² depending on the channel)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// The zero vector
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Multiply every component by `k`
    pub fn scale(&self, k: f64) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }

    /// Euclidean length
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Component-wise comparison within `epsilon`
    pub fn approx_eq(&self, other: &Vec3, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.z - other.z).abs() <= epsilon
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// One timestamped kinematic reading
///
/// Samples are immutable once built: the fields are private and only exposed
/// through copying accessors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    timestamp: u64,
    position: Vec3,
    velocity: Option<Vec3>,
    acceleration: Option<Vec3>,
}

impl TelemetrySample {
    /// Create a position-only sample
    pub fn new(timestamp: u64, position: Vec3) -> Self {
        Self {
            timestamp,
            position,
            velocity: None,
            acceleration: None,
        }
    }

    /// Attach a velocity reading
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = Some(velocity);
        self
    }

    /// Attach an acceleration reading
    pub fn with_acceleration(mut self, acceleration: Vec3) -> Self {
        self.acceleration = Some(acceleration);
        self
    }

    /// Milliseconds since link start
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Option<Vec3> {
        self.velocity
    }

    pub fn acceleration(&self) -> Option<Vec3> {
        self.acceleration
    }
}

/// Numeric type of a streamed variable, named as the vehicle firmware names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VariableType {
    #[serde(rename = "uint8_t")]
    U8,
    #[serde(rename = "uint16_t")]
    U16,
    #[serde(rename = "uint32_t")]
    U32,
    #[serde(rename = "int8_t")]
    I8,
    #[serde(rename = "int16_t")]
    I16,
    #[serde(rename = "int32_t")]
    I32,
    /// 16-bit half-precision float
    #[serde(rename = "FP16")]
    F16,
    /// 32-bit float (what the state estimate is published as)
    #[default]
    #[serde(rename = "float")]
    F32,
}

impl VariableType {
    /// Returns the size in bytes of this variable type on the wire
    pub fn size_bytes(&self) -> usize {
        match self {
            VariableType::U8 | VariableType::I8 => 1,
            VariableType::U16 | VariableType::I16 | VariableType::F16 => 2,
            VariableType::U32 | VariableType::I32 | VariableType::F32 => 4,
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::U8 => write!(f, "uint8_t"),
            VariableType::U16 => write!(f, "uint16_t"),
            VariableType::U32 => write!(f, "uint32_t"),
            VariableType::I8 => write!(f, "int8_t"),
            VariableType::I16 => write!(f, "int16_t"),
            VariableType::I32 => write!(f, "int32_t"),
            VariableType::F16 => write!(f, "FP16"),
            VariableType::F32 => write!(f, "float"),
        }
    }
}

/// A kinematic channel; each expands to three variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Position,
    Velocity,
    Acceleration,
}

impl Channel {
    /// Variable suffixes for the x, y and z components
    pub fn suffixes(&self) -> [&'static str; 3] {
        match self {
            Channel::Position => ["x", "y", "z"],
            Channel::Velocity => ["vx", "vy", "vz"],
            Channel::Acceleration => ["ax", "ay", "az"],
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Channel::Position => "Position",
            Channel::Velocity => "Velocity",
            Channel::Acceleration => "Acceleration",
        }
    }
}

/// A single variable the link is asked to stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogVariable {
    /// Fully qualified name, e.g. `stateEstimate.vx`
    pub name: String,
    pub var_type: VariableType,
}

/// Telemetry subscription description
///
/// Position is always part of the channel set; velocity and acceleration are
/// optional and only persisted, never used to derive commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Log block name announced to the vehicle
    #[serde(default = "default_block_name")]
    pub block_name: String,

    /// Variable group the channels live in
    #[serde(default = "default_group")]
    pub group: String,

    /// Sampling period in milliseconds
    #[serde(default = "default_sample_period")]
    pub sample_period_ms: u32,

    /// Active channels
    #[serde(default = "default_channels")]
    pub channels: BTreeSet<Channel>,

    /// Type tag used for every variable
    #[serde(default)]
    pub var_type: VariableType,
}

fn default_block_name() -> String {
    DEFAULT_LOG_BLOCK.to_string()
}

fn default_group() -> String {
    DEFAULT_VARIABLE_GROUP.to_string()
}

fn default_sample_period() -> u32 {
    DEFAULT_SAMPLE_PERIOD_MS
}

fn default_channels() -> BTreeSet<Channel> {
    BTreeSet::from([Channel::Position])
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            block_name: default_block_name(),
            group: default_group(),
            sample_period_ms: DEFAULT_SAMPLE_PERIOD_MS,
            channels: default_channels(),
            var_type: VariableType::F32,
        }
    }
}

impl ChannelConfig {
    /// Position-only configuration at the given period
    pub fn position_only(sample_period_ms: u32) -> Self {
        Self {
            sample_period_ms,
            ..Self::default()
        }
    }

    /// Position, velocity and acceleration at the given period
    pub fn full_kinematics(sample_period_ms: u32) -> Self {
        Self {
            sample_period_ms,
            channels: BTreeSet::from([Channel::Position, Channel::Velocity, Channel::Acceleration]),
            ..Self::default()
        }
    }

    /// Enable an extra channel
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.insert(channel);
        self
    }

    /// Whether a channel is part of the subscription
    pub fn has(&self, channel: Channel) -> bool {
        channel == Channel::Position || self.channels.contains(&channel)
    }

    /// Active channels in a fixed order, position first
    pub fn active_channels(&self) -> Vec<Channel> {
        [Channel::Position, Channel::Velocity, Channel::Acceleration]
            .into_iter()
            .filter(|c| self.has(*c))
            .collect()
    }

    /// Fully qualified name of one component variable
    pub fn variable_name(&self, suffix: &str) -> String {
        format!("{}.{}", self.group, suffix)
    }

    /// Every variable to subscribe to, in channel order
    pub fn variables(&self) -> Vec<LogVariable> {
        self.active_channels()
            .into_iter()
            .flat_map(|c| c.suffixes())
            .map(|suffix| LogVariable {
                name: self.variable_name(suffix),
                var_type: self.var_type,
            })
            .collect()
    }

    /// Size of one telemetry frame on the wire
    pub fn payload_bytes(&self) -> usize {
        self.variables().iter().map(|v| v.var_type.size_bytes()).sum()
    }

    /// Build a sample from one pushed frame
    ///
    /// Returns `None` if any variable of an active channel is missing from
    /// the frame.
    pub fn decode(&self, timestamp: u64, values: &HashMap<String, f64>) -> Option<TelemetrySample> {
        let position = self.decode_channel(Channel::Position, values)?;
        let mut sample = TelemetrySample::new(timestamp, position);
        if self.has(Channel::Velocity) {
            sample = sample.with_velocity(self.decode_channel(Channel::Velocity, values)?);
        }
        if self.has(Channel::Acceleration) {
            sample = sample.with_acceleration(self.decode_channel(Channel::Acceleration, values)?);
        }
        Some(sample)
    }

    fn decode_channel(&self, channel: Channel, values: &HashMap<String, f64>) -> Option<Vec3> {
        let [x, y, z] = channel.suffixes();
        Some(Vec3::new(
            *values.get(&self.variable_name(x))?,
            *values.get(&self.variable_name(y))?,
            *values.get(&self.variable_name(z))?,
        ))
    }

    /// Encode a sample back into a frame (used by simulated links)
    pub fn encode(&self, sample: &TelemetrySample) -> HashMap<String, f64> {
        let mut values = HashMap::new();
        let mut put = |channel: Channel, v: Vec3| {
            let [x, y, z] = channel.suffixes();
            values.insert(self.variable_name(x), v.x);
            values.insert(self.variable_name(y), v.y);
            values.insert(self.variable_name(z), v.z);
        };
        put(Channel::Position, sample.position());
        if self.has(Channel::Velocity) {
            put(Channel::Velocity, sample.velocity().unwrap_or_default());
        }
        if self.has(Channel::Acceleration) {
            put(Channel::Acceleration, sample.acceleration().unwrap_or_default());
        }
        values
    }
}
