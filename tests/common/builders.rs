//! Test data builders for creating test objects

use kinreplay::trajectory::TrajectoryBuffer;
use kinreplay::{TelemetrySample, Vec3};

/// Builder for creating test samples
pub struct SampleBuilder {
    timestamp: u64,
    position: Vec3,
    velocity: Option<Vec3>,
    acceleration: Option<Vec3>,
}

impl SampleBuilder {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            position: Vec3::ZERO,
            velocity: None,
            acceleration: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64, z: f64) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn velocity(mut self, x: f64, y: f64, z: f64) -> Self {
        self.velocity = Some(Vec3::new(x, y, z));
        self
    }

    pub fn acceleration(mut self, x: f64, y: f64, z: f64) -> Self {
        self.acceleration = Some(Vec3::new(x, y, z));
        self
    }

    pub fn build(self) -> TelemetrySample {
        let mut sample = TelemetrySample::new(self.timestamp, self.position);
        if let Some(v) = self.velocity {
            sample = sample.with_velocity(v);
        }
        if let Some(a) = self.acceleration {
            sample = sample.with_acceleration(a);
        }
        sample
    }
}

/// Builder for frozen trajectories
pub struct TrajectoryBuilder {
    samples: Vec<TelemetrySample>,
}

impl TrajectoryBuilder {
    pub fn new() -> Self {
        Self { samples: Vec::new() }
    }

    /// Append a position-only sample
    pub fn point(mut self, t: u64, x: f64, y: f64, z: f64) -> Self {
        self.samples.push(SampleBuilder::new(t).at(x, y, z).build());
        self
    }

    pub fn sample(mut self, sample: TelemetrySample) -> Self {
        self.samples.push(sample);
        self
    }

    /// `n` samples `period_ms` apart moving along x at `speed` m/s
    pub fn straight_line(mut self, n: usize, period_ms: u64, speed: f64) -> Self {
        for i in 0..n as u64 {
            let t = i * period_ms;
            let x = speed * t as f64 / 1000.0;
            self.samples.push(SampleBuilder::new(t).at(x, 0.0, 0.5).build());
        }
        self
    }

    pub fn samples(self) -> Vec<TelemetrySample> {
        self.samples
    }

    pub fn build(self) -> TrajectoryBuffer {
        TrajectoryBuffer::frozen_from(self.samples)
    }
}

impl Default for TrajectoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_builder() {
        let sample = SampleBuilder::new(42).at(1.0, 2.0, 3.0).velocity(0.1, 0.0, 0.0).build();
        assert_eq!(sample.timestamp(), 42);
        assert_eq!(sample.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(sample.velocity().is_some());
        assert!(sample.acceleration().is_none());
    }
}
