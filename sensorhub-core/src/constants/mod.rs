//! Constants for Sensorhub Core
//!
//! Centralised, documented constants used by the registry and its clients.
//!
//! ## Organization
//!
//! - **Buffers**: fixed capacities of every table, slab and queue
//! - **Time**: unit conversions and the fixed-point rate scale
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. Keep capacities small: every table is statically sized
//! 3. Use descriptive names that include units

/// Capacities of the sensor table, request matrix and internal event slab.
pub mod buffers;

/// Time unit conversions and rate fixed-point scale.
pub mod time;

pub use buffers::{
    MAX_REGISTERED_SENSORS, MAX_CLI_SENS_MATRIX_SZ, MAX_INTERNAL_EVENTS,
    MAX_CFG_DATA_LEN, TASK_TID_BITS, HANDLE_COUNTER_MASK,
};

pub use time::{NS_PER_SECOND, NS_PER_MS, RATE_FIXED_POINT_SHIFT, RATE_FIXED_POINT_SCALE};
