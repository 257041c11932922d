//! Runtime tunables for the fusion task

use sensorhub_core::constants::NS_PER_MS;
use sensorhub_core::Rate;

/// Fusion task configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FusionConfig {
    /// Slowest rate the gyroscope is run at; integration error grows fast below it
    pub gyro_min_rate: Rate,
    /// Fastest rate the magnetometer is run at
    pub mag_max_rate: Rate,
    /// Rate raw sensors are first requested at, before any output sets a rate
    pub default_raw_rate: Rate,
    /// Latency raw sensors are first requested with (ns)
    pub default_raw_latency: u64,
    /// A raw gap longer than this many resample periods is a discontinuity
    pub discontinuity_factor: u32,
    /// Fraction of the tilt error removed per accelerometer sample
    pub accel_gain: f32,
    /// Fraction of the heading error removed per magnetometer sample
    pub mag_gain: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gyro_min_rate: Rate::hz(100),
            mag_max_rate: Rate::hz(50),
            default_raw_rate: Rate::hz(50),
            default_raw_latency: 100 * NS_PER_MS,
            discontinuity_factor: 10,
            accel_gain: 0.02,
            mag_gain: 0.01,
        }
    }
}

impl FusionConfig {
    /// Set the gyroscope rate floor
    pub fn with_gyro_min_rate(mut self, rate: Rate) -> Self {
        self.gyro_min_rate = rate;
        self
    }

    /// Set the magnetometer rate ceiling
    pub fn with_mag_max_rate(mut self, rate: Rate) -> Self {
        self.mag_max_rate = rate;
        self
    }

    /// Set the initial raw request
    pub fn with_default_raw(mut self, rate: Rate, latency: u64) -> Self {
        self.default_raw_rate = rate;
        self.default_raw_latency = latency;
        self
    }

    /// Set the discontinuity threshold, in resample periods
    pub fn with_discontinuity_factor(mut self, factor: u32) -> Self {
        self.discontinuity_factor = factor.max(1);
        self
    }

    /// Set the attitude correction gains (clamped to `0.0..=1.0`)
    pub fn with_gains(mut self, accel: f32, mag: f32) -> Self {
        self.accel_gain = accel.clamp(0.0, 1.0);
        self.mag_gain = mag.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_raw_limits() {
        let config = FusionConfig::default();
        assert_eq!(config.gyro_min_rate, Rate::hz(100));
        assert_eq!(config.mag_max_rate, Rate::hz(50));
        assert_eq!(config.discontinuity_factor, 10);
    }

    #[test]
    fn builder_clamps() {
        let config = FusionConfig::default()
            .with_gains(2.0, -1.0)
            .with_discontinuity_factor(0);
        assert_eq!(config.accel_gain, 1.0);
        assert_eq!(config.mag_gain, 0.0);
        assert_eq!(config.discontinuity_factor, 1);
    }
}
