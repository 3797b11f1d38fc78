//! Simulated Vehicle Link for Testing
//!
//! This module provides a vehicle link that runs entirely in-process, so the
//! record/replay engine can be exercised without a radio or a vehicle.
//!
//! # Behaviour
//!
//! - **Telemetry**: each subscription gets its own thread that pushes frames at
//!   the configured sampling period, like a real link's I/O thread would
//! - **Free flight**: until the first motion command, the vehicle follows a
//!   [`SimPattern`] (stand-in for the operator flying it by hand)
//! - **Commanded flight**: motion commands move the vehicle along straight
//!   segments at the commanded speed
//! - **Faults**: connections can be refused, a chosen command can be rejected,
//!   and targets outside the envelope are refused
//! - **Parameters**: an in-memory parameter table whose update callbacks are
//!   delivered on a separate thread, in order
//!
//! # Enabling
//!
//! The simulated link is only available when the `sim-link` feature is enabled
//! (it is part of the default feature set).

use crate::error::{CommandError, ReplayError, Result};
use crate::types::{ChannelConfig, TelemetrySample, Vec3};
use crossbeam_channel::{unbounded, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{MotionControl, ParameterHandler, SubscriptionId, TelemetryHandler, VehicleLink};

/// URI prefixes the simulated connector answers to
pub const SIM_URI_SCHEMES: &[&str] = &["sim://", "radio://"];

/// Vertical speed used for take-off and landing
const VERTICAL_SPEED_MPS: f64 = 0.3;

/// Free-flight pattern followed before the first motion command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimPattern {
    /// Stay in place
    Hover(Vec3),
    /// Horizontal circle around `center`
    Circle {
        center: Vec3,
        radius: f64,
        period_s: f64,
    },
    /// Constant-velocity drift from `origin`
    Line { origin: Vec3, velocity: Vec3 },
}

impl Default for SimPattern {
    fn default() -> Self {
        SimPattern::Circle {
            center: Vec3::new(0.0, 0.0, 0.5),
            radius: 0.5,
            period_s: 8.0,
        }
    }
}

impl SimPattern {
    /// Position, velocity and acceleration `t` seconds into the pattern
    pub fn kinematics(&self, t: f64) -> (Vec3, Vec3, Vec3) {
        match *self {
            SimPattern::Hover(at) => (at, Vec3::ZERO, Vec3::ZERO),
            SimPattern::Circle {
                center,
                radius,
                period_s,
            } => {
                let w = 2.0 * std::f64::consts::PI / period_s.max(f64::EPSILON);
                let (s, c) = (w * t).sin_cos();
                let position = center + Vec3::new(radius * c, radius * s, 0.0);
                let velocity = Vec3::new(-radius * w * s, radius * w * c, 0.0);
                let acceleration = Vec3::new(-radius * w * w * c, -radius * w * w * s, 0.0);
                (position, velocity, acceleration)
            }
            SimPattern::Line { origin, velocity } => {
                (origin + velocity.scale(t), velocity, Vec3::ZERO)
            }
        }
    }
}

/// Behaviour of the simulated vehicle
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Free-flight pattern
    pub pattern: SimPattern,
    /// Uniform position noise amplitude in metres (0.0 = none)
    pub noise_amplitude: f64,
    /// How long each motion command blocks before it is accepted
    pub command_latency: Duration,
    /// Largest absolute coordinate a command may target, in metres
    pub envelope_m: f64,
    /// Reject the n-th `move_by`/`go_to` command (1-based)
    pub reject_command: Option<usize>,
    /// Refuse every connection attempt
    pub refuse_connection: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pattern: SimPattern::default(),
            noise_amplitude: 0.0,
            command_latency: Duration::from_millis(2),
            envelope_m: 5.0,
            reject_command: None,
            refuse_connection: false,
        }
    }
}

impl SimConfig {
    pub fn with_pattern(mut self, pattern: SimPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    pub fn with_command_latency(mut self, latency: Duration) -> Self {
        self.command_latency = latency;
        self
    }

    pub fn rejecting_command(mut self, n: usize) -> Self {
        self.reject_command = Some(n);
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connection = true;
        self
    }
}

/// A motion command as received by the simulated vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCommand {
    MoveBy { displacement: Vec3, speed: f64 },
    GoTo { target: Vec3, speed: f64 },
    TakeOff { height: f64 },
    Land,
}

/// What the simulated vehicles of one connector have seen
#[derive(Debug, Clone, Default)]
pub struct SimLog {
    pub connects: usize,
    pub disconnects: usize,
    /// Commands the vehicle accepted, in order
    pub commands: Vec<SimCommand>,
    pub parameters: HashMap<String, f64>,
}

type SharedLog = Arc<Mutex<SimLog>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Opens [`SimulatedVehicle`] links
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    config: SimConfig,
    log: SharedLog,
}

impl SimulatedConnector {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            log: SharedLog::default(),
        }
    }

    /// Snapshot of everything the vehicles opened by this connector saw
    pub fn log(&self) -> SimLog {
        lock(&self.log).clone()
    }
}

impl super::LinkConnector for SimulatedConnector {
    fn connect(&self, uri: &str) -> Result<Box<dyn VehicleLink>> {
        if self.config.refuse_connection || !SIM_URI_SCHEMES.iter().any(|s| uri.starts_with(s)) {
            return Err(ReplayError::Connection(format!(
                "no simulated vehicle answers at {}",
                uri
            )));
        }
        lock(&self.log).connects += 1;
        Ok(Box::new(SimulatedVehicle::open(uri, self.config.clone(), self.log.clone())))
    }
}

/// A straight commanded segment
#[derive(Debug, Clone, Copy)]
struct Segment {
    from: Vec3,
    to: Vec3,
    started: Instant,
    duration: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Motion {
    Pattern { started: Instant },
    Segment(Segment),
}

/// Xorshift noise, deterministic per vehicle
#[derive(Debug)]
struct Noise(u64);

impl Noise {
    fn next_unit(&mut self) -> f64 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        (s as f64) / (u64::MAX as f64)
    }

    fn jitter(&mut self, amplitude: f64) -> Vec3 {
        if amplitude <= 0.0 {
            return Vec3::ZERO;
        }
        let mut component = || (self.next_unit() - 0.5) * 2.0 * amplitude;
        Vec3::new(component(), component(), component())
    }
}

/// Longest a single simulated move may take
const MAX_MOVE_TIME: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct Dynamics {
    pattern: SimPattern,
    motion: Motion,
    noise: Noise,
    noise_amplitude: f64,
}

impl Dynamics {
    fn kinematics(&self, now: Instant) -> (Vec3, Vec3, Vec3) {
        match self.motion {
            Motion::Pattern { started } => {
                self.pattern
                    .kinematics(now.saturating_duration_since(started).as_secs_f64())
            }
            Motion::Segment(seg) => {
                let elapsed = now.saturating_duration_since(seg.started);
                if seg.duration.is_zero() || elapsed >= seg.duration {
                    return (seg.to, Vec3::ZERO, Vec3::ZERO);
                }
                let secs = seg.duration.as_secs_f64();
                let frac = elapsed.as_secs_f64() / secs;
                let delta = seg.to - seg.from;
                (seg.from + delta.scale(frac), delta.scale(1.0 / secs), Vec3::ZERO)
            }
        }
    }

    fn sample(&mut self, timestamp: u64, now: Instant) -> TelemetrySample {
        let (position, velocity, acceleration) = self.kinematics(now);
        let jitter = self.noise.jitter(self.noise_amplitude);
        TelemetrySample::new(timestamp, position + jitter)
            .with_velocity(velocity)
            .with_acceleration(acceleration)
    }

    fn command(&mut self, target: Vec3, speed: f64, now: Instant) {
        let (from, _, _) = self.kinematics(now);
        let distance = (target - from).norm();
        let duration = if speed > 0.0 && speed.is_finite() {
            Duration::try_from_secs_f64(distance / speed)
                .unwrap_or(MAX_MOVE_TIME)
                .min(MAX_MOVE_TIME)
        } else {
            Duration::ZERO
        };
        self.motion = Motion::Segment(Segment {
            from,
            to: target,
            started: now,
            duration,
        });
    }
}

struct Subscription {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Subscription {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Simulated telemetry thread panicked");
            }
        }
    }
}

/// In-process stand-in for a vehicle reached over a link
pub struct SimulatedVehicle {
    uri: String,
    config: SimConfig,
    connected: bool,
    started: Instant,
    dynamics: Arc<Mutex<Dynamics>>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    next_subscription: u32,
    motion_commands: usize,
    parameter_callbacks: Arc<Mutex<HashMap<String, Vec<ParameterHandler>>>>,
    parameter_tx: Option<Sender<(String, f64)>>,
    parameter_thread: Option<JoinHandle<()>>,
    log: SharedLog,
}

impl SimulatedVehicle {
    fn open(uri: &str, config: SimConfig, log: SharedLog) -> Self {
        let started = Instant::now();
        let dynamics = Dynamics {
            pattern: config.pattern,
            motion: Motion::Pattern { started },
            noise: Noise(0x9E37_79B9_7F4A_7C15),
            noise_amplitude: config.noise_amplitude,
        };

        let parameter_callbacks: Arc<Mutex<HashMap<String, Vec<ParameterHandler>>>> =
            Arc::default();
        let (parameter_tx, parameter_rx) = unbounded::<(String, f64)>();
        let callbacks = parameter_callbacks.clone();
        let parameter_thread = std::thread::Builder::new()
            .name("sim-params".to_string())
            .spawn(move || {
                for (name, value) in parameter_rx {
                    let mut callbacks = lock(&callbacks);
                    if let Some(handlers) = callbacks.get_mut(&name) {
                        for handler in handlers.iter_mut() {
                            handler(&name, value);
                        }
                    }
                }
            })
            .map_err(|e| tracing::error!("Failed to spawn parameter thread: {}", e))
            .ok();

        tracing::info!("Simulated vehicle connected at {}", uri);
        Self {
            uri: uri.to_string(),
            config,
            connected: true,
            started,
            dynamics: Arc::new(Mutex::new(dynamics)),
            subscriptions: HashMap::new(),
            next_subscription: 1,
            motion_commands: 0,
            parameter_callbacks,
            parameter_tx: Some(parameter_tx),
            parameter_thread,
            log,
        }
    }

    fn check_connected(&self) -> std::result::Result<(), CommandError> {
        if self.connected {
            Ok(())
        } else {
            Err(CommandError::LinkDown)
        }
    }

    fn check_envelope(&self, target: Vec3) -> std::result::Result<(), CommandError> {
        let limit = self.config.envelope_m;
        if !target.is_finite()
            || target.x.abs() > limit
            || target.y.abs() > limit
            || target.z.abs() > limit
        {
            return Err(CommandError::OutOfEnvelope(format!(
                "target {} outside ±{} m",
                target, limit
            )));
        }
        Ok(())
    }

    fn current_position(&self) -> Vec3 {
        lock(&self.dynamics).kinematics(Instant::now()).0
    }

    fn fly_to(
        &mut self,
        target: Vec3,
        speed: f64,
        command: SimCommand,
    ) -> std::result::Result<(), CommandError> {
        self.check_connected()?;
        self.check_envelope(target)?;
        lock(&self.dynamics).command(target, speed, Instant::now());
        if !self.config.command_latency.is_zero() {
            std::thread::sleep(self.config.command_latency);
        }
        lock(&self.log).commands.push(command);
        Ok(())
    }

    /// Counts `move_by`/`go_to` and applies the configured rejection
    fn next_motion_command(&mut self) -> std::result::Result<(), CommandError> {
        self.check_connected()?;
        self.motion_commands += 1;
        if self.config.reject_command == Some(self.motion_commands) {
            return Err(CommandError::Rejected(format!(
                "simulated rejection of command {}",
                self.motion_commands
            )));
        }
        Ok(())
    }
}

impl MotionControl for SimulatedVehicle {
    fn move_by(
        &mut self,
        dx: f64,
        dy: f64,
        dz: f64,
        speed: f64,
    ) -> std::result::Result<(), CommandError> {
        self.next_motion_command()?;
        let displacement = Vec3::new(dx, dy, dz);
        let target = self.current_position() + displacement;
        self.fly_to(target, speed, SimCommand::MoveBy { displacement, speed })
    }

    fn go_to(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        speed: f64,
    ) -> std::result::Result<(), CommandError> {
        self.next_motion_command()?;
        let target = Vec3::new(x, y, z);
        self.fly_to(target, speed, SimCommand::GoTo { target, speed })
    }

    fn take_off(&mut self, height: f64) -> std::result::Result<(), CommandError> {
        let here = self.current_position();
        self.fly_to(
            Vec3::new(here.x, here.y, height),
            VERTICAL_SPEED_MPS,
            SimCommand::TakeOff { height },
        )
    }

    fn land(&mut self) -> std::result::Result<(), CommandError> {
        let here = self.current_position();
        self.fly_to(Vec3::new(here.x, here.y, 0.0), VERTICAL_SPEED_MPS, SimCommand::Land)
    }
}

impl VehicleLink for SimulatedVehicle {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe(
        &mut self,
        channels: &ChannelConfig,
        mut handler: TelemetryHandler,
    ) -> Result<SubscriptionId> {
        if !self.connected {
            return Err(ReplayError::Connection(format!("{} is closed", self.uri)));
        }

        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let running = Arc::new(AtomicBool::new(true));
        let period = Duration::from_millis(u64::from(channels.sample_period_ms.max(1)));
        let channels = channels.clone();
        let dynamics = self.dynamics.clone();
        let started = self.started;
        let thread_running = running.clone();

        let thread = std::thread::Builder::new()
            .name(format!("sim-telemetry-{}", id.0))
            .spawn(move || {
                let mut next_tick = Instant::now();
                while thread_running.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    let timestamp = now.saturating_duration_since(started).as_millis() as u64;
                    let sample = lock(&dynamics).sample(timestamp, now);
                    handler(timestamp, &channels.encode(&sample));

                    next_tick += period;
                    let now = Instant::now();
                    if next_tick > now {
                        std::thread::sleep(next_tick - now);
                    } else {
                        next_tick = now;
                    }
                }
            })?;

        tracing::debug!("Simulated subscription {} started ({:?} period)", id.0, period);
        self.subscriptions.insert(
            id,
            Subscription {
                running,
                thread: Some(thread),
            },
        );
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Some(mut subscription) = self.subscriptions.remove(&id) {
            subscription.stop();
            tracing::debug!("Simulated subscription {} stopped", id.0);
        }
    }

    fn set_parameter(&mut self, group: &str, name: &str, value: f64) -> Result<()> {
        let full_name = format!("{}.{}", group, name);
        let Some(ref tx) = self.parameter_tx else {
            return Err(ReplayError::Connection(format!("{} is closed", self.uri)));
        };
        lock(&self.log).parameters.insert(full_name.clone(), value);
        tx.send((full_name, value))
            .map_err(|e| ReplayError::Connection(format!("parameter channel closed: {}", e)))
    }

    fn add_parameter_callback(
        &mut self,
        group: &str,
        name: &str,
        handler: ParameterHandler,
    ) -> Result<()> {
        if !self.connected {
            return Err(ReplayError::Connection(format!("{} is closed", self.uri)));
        }
        lock(&self.parameter_callbacks)
            .entry(format!("{}.{}", group, name))
            .or_default()
            .push(handler);
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        for (_, mut subscription) in self.subscriptions.drain() {
            subscription.stop();
        }
        // Closing the channel ends the parameter thread once it has drained
        self.parameter_tx = None;
        if let Some(thread) = self.parameter_thread.take() {
            let _ = thread.join();
        }
        self.connected = false;
        lock(&self.log).disconnects += 1;
        tracing::info!("Simulated vehicle at {} disconnected", self.uri);
    }
}

impl Drop for SimulatedVehicle {
    fn drop(&mut self) {
        self.disconnect();
    }
}
