//! Sampling rates and the per-sensor power/rate state
//!
//! ## Fixed-Point Rates
//!
//! Rates are stored as unsigned fixed point with ten fractional bits, so a
//! raw value of `1024` is 1 Hz. This keeps sub-hertz rates (one sample every
//! five minutes is raw `3`) representable without floats.
//!
//! The sampling period in nanoseconds is therefore
//!
//! ```text
//! period_ns = NS_PER_SECOND * 1024 / raw
//! ```
//!
//! ## Sentinels
//!
//! Two raw values are reserved: on-change and on-demand. They are not
//! frequencies and never take part in numeric comparison; [`SensorRate`]
//! makes that explicit so a sentinel can't be mistaken for a very fast rate.
//!
//! ## State
//!
//! A sensor's "current rate" doubles as its power state in the descriptor
//! table. [`SensorState`] separates the four transitional states from the
//! active rate.

use core::fmt;

use crate::constants::{NS_PER_SECOND, RATE_FIXED_POINT_SCALE, RATE_FIXED_POINT_SHIFT};

/// Raw encoding of the on-change sentinel rate.
pub const SENSOR_RATE_ONCHANGE: u32 = 0xFFFF_FF01;

/// Raw encoding of the on-demand sentinel rate.
pub const SENSOR_RATE_ONDEMAND: u32 = 0xFFFF_FF02;

/// Numeric sampling frequency, Hz × 1024
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rate(u32);

impl Rate {
    /// Wrap a raw fixed-point value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Whole-hertz rate
    pub const fn hz(hz: u32) -> Self {
        Self(hz << RATE_FIXED_POINT_SHIFT)
    }

    /// Fractional rate, rounded to the nearest raw step
    pub fn from_hz_f32(hz: f32) -> Self {
        if hz <= 0.0 {
            return Self(0);
        }
        Self((hz * RATE_FIXED_POINT_SCALE as f32 + 0.5) as u32)
    }

    /// Raw fixed-point value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Rate in hertz
    pub fn as_hz_f32(self) -> f32 {
        self.0 as f32 / RATE_FIXED_POINT_SCALE as f32
    }

    /// Sampling period in nanoseconds (`u64::MAX` for a zero rate)
    pub const fn period_ns(self) -> u64 {
        if self.0 == 0 {
            return u64::MAX;
        }
        NS_PER_SECOND * RATE_FIXED_POINT_SCALE as u64 / self.0 as u64
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 >> RATE_FIXED_POINT_SHIFT;
        let frac = (self.0 & (RATE_FIXED_POINT_SCALE - 1)) * 1000 / RATE_FIXED_POINT_SCALE;
        write!(f, "{}.{:03}Hz", whole, frac)
    }
}

/// A rate a client may request or a sensor may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorRate {
    /// Periodic sampling at a fixed frequency
    Hz(Rate),
    /// Deliver only when the value changes
    OnChange,
    /// Deliver only when explicitly triggered
    OnDemand,
}

impl SensorRate {
    /// Whole-hertz periodic rate
    pub const fn hz(hz: u32) -> Self {
        Self::Hz(Rate::hz(hz))
    }

    /// Decode a raw value, recognising the two sentinels
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            SENSOR_RATE_ONCHANGE => Self::OnChange,
            SENSOR_RATE_ONDEMAND => Self::OnDemand,
            _ => Self::Hz(Rate::from_raw(raw)),
        }
    }

    /// Raw encoding, as carried in completion signals
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Hz(rate) => rate.raw(),
            Self::OnChange => SENSOR_RATE_ONCHANGE,
            Self::OnDemand => SENSOR_RATE_ONDEMAND,
        }
    }

    /// Numeric part, `None` for sentinels
    pub const fn numeric(self) -> Option<Rate> {
        match self {
            Self::Hz(rate) => Some(rate),
            _ => None,
        }
    }

    /// True for on-change and on-demand
    pub const fn is_sentinel(self) -> bool {
        !matches!(self, Self::Hz(_))
    }

    /// Lower bound on batching latency for a client at this rate
    ///
    /// One sampling period; zero for sentinels, which have no period.
    pub const fn latency_floor_ns(self) -> u64 {
        match self {
            Self::Hz(rate) => rate.period_ns(),
            _ => 0,
        }
    }
}

impl fmt::Display for SensorRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hz(rate) => rate.fmt(f),
            Self::OnChange => f.write_str("on-change"),
            Self::OnDemand => f.write_str("on-demand"),
        }
    }
}

/// Power/rate state of a registered sensor
///
/// Any comparison against a target rate must go through [`SensorState::is_at`]
/// so the transitional states are never read as rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorState {
    /// Powered down
    #[default]
    Off,
    /// Power-on requested, completion pending
    PoweringOn,
    /// Power-off requested, completion pending
    PoweringOff,
    /// Powered, firmware upload pending
    FirmwareUploading,
    /// Sampling at the given rate
    Active(SensorRate),
}

impl SensorState {
    /// True while a power or firmware transition is in flight
    pub const fn is_transitional(self) -> bool {
        matches!(self, Self::PoweringOn | Self::PoweringOff | Self::FirmwareUploading)
    }

    /// Rate the sensor is sampling at, if any
    pub const fn active_rate(self) -> Option<SensorRate> {
        match self {
            Self::Active(rate) => Some(rate),
            _ => None,
        }
    }

    /// Whether the state already matches an arbiter target (`None` = off)
    pub fn is_at(self, target: Option<SensorRate>) -> bool {
        match (self, target) {
            (Self::Off, None) => true,
            (Self::Active(current), Some(wanted)) => current == wanted,
            _ => false,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Off => defmt::write!(fmt, "off"),
            Self::PoweringOn => defmt::write!(fmt, "powering-on"),
            Self::PoweringOff => defmt::write!(fmt, "powering-off"),
            Self::FirmwareUploading => defmt::write!(fmt, "fw-uploading"),
            Self::Active(rate) => defmt::write!(fmt, "active({=u32})", rate.to_raw()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_hz_is_fixed_point() {
        assert_eq!(Rate::hz(1).raw(), 1024);
        assert_eq!(Rate::hz(50).raw(), 50 * 1024);
        assert_eq!(Rate::from_hz_f32(25.0 / 8.0).raw(), 3200);
    }

    #[test]
    fn period_matches_shifted_division() {
        // 1e9 * 1024 / raw == (1e9 / hz) << 10 / 1024 for whole rates
        assert_eq!(Rate::hz(1).period_ns(), 1_000_000_000);
        assert_eq!(Rate::hz(50).period_ns(), 20_000_000);
        assert_eq!(Rate::hz(200).period_ns(), 5_000_000);
        assert_eq!(Rate::from_raw(0).period_ns(), u64::MAX);
    }

    #[test]
    fn sentinels_round_trip_through_raw() {
        assert_eq!(SensorRate::from_raw(SENSOR_RATE_ONCHANGE), SensorRate::OnChange);
        assert_eq!(SensorRate::OnDemand.to_raw(), SENSOR_RATE_ONDEMAND);
        assert_eq!(SensorRate::from_raw(5 * 1024), SensorRate::hz(5));
        assert_eq!(SensorRate::OnChange.latency_floor_ns(), 0);
    }

    #[test]
    fn state_matching_ignores_transitions() {
        assert!(SensorState::Off.is_at(None));
        assert!(!SensorState::PoweringOff.is_at(None));
        assert!(SensorState::Active(SensorRate::hz(5)).is_at(Some(SensorRate::hz(5))));
        assert!(!SensorState::FirmwareUploading.is_at(Some(SensorRate::hz(5))));
        assert!(SensorState::PoweringOn.is_transitional());
        assert!(!SensorState::Active(SensorRate::OnChange).is_transitional());
    }
}
