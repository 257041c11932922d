//! Fusion Buffer Sizes and Physical Constants
//!
//! Every buffer the fusion task owns is fixed-size; these values decide how
//! much raw data can queue up before the oldest grid points are dropped.

// ===== BATCHES =====

/// Largest number of samples in one batch, raw or derived.
pub const MAX_NUM_COMMS_EVENT_SAMPLES: usize = 15;

/// Number of full batches each raw grid buffer must absorb.
pub const NUM_COMMS_EVENTS_IN_FIFO: usize = 2;

/// Grid points needed to hold that many batches.
pub const FIFO_DEPTH: usize = NUM_COMMS_EVENTS_IN_FIFO * MAX_NUM_COMMS_EVENT_SAMPLES;

/// Slack for bursts while raw rates are being changed.
pub const FIFO_MARGIN: usize = 10;

/// Capacity of each raw grid buffer.
pub const MAX_NUM_SAMPLES: usize = FIFO_DEPTH + FIFO_MARGIN;

/// Output batches in flight at once, across all derived sensors.
///
/// Two per derived sensor: one filling, one waiting for delivery.
pub const OUTPUT_SLAB_SIZE: usize = 12;

// ===== PHYSICS =====

/// Standard gravity (m/s²), used to scale the gravity output.
pub const STANDARD_GRAVITY: f32 = 9.806_65;

/// Radians to degrees.
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Nanoseconds to seconds.
pub const NS_TO_S: f32 = 1e-9;
