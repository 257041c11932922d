//! Time-Related Constants
//!
//! Timestamps and latencies are nanoseconds. Rates are unsigned fixed point
//! with ten fractional bits, so `1 Hz == 1024`.

// ===== TIME UNIT CONVERSIONS =====

/// Nanoseconds per second.
pub const NS_PER_SECOND: u64 = 1_000_000_000;

/// Nanoseconds per millisecond.
pub const NS_PER_MS: u64 = 1_000_000;

// ===== RATE FIXED POINT =====

/// Fractional bits in a raw rate value.
pub const RATE_FIXED_POINT_SHIFT: u32 = 10;

/// Raw rate value of 1 Hz.
///
/// Sub-hertz rates (e.g. one sample every five minutes) stay representable:
/// `1/300 Hz` is raw value 3.
pub const RATE_FIXED_POINT_SCALE: u32 = 1 << RATE_FIXED_POINT_SHIFT;
