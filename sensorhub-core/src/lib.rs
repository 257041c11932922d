//! Sensor registry and scheduler for a context-hub coprocessor
//!
//! Multiplexes many application clients onto a small set of sensors:
//! handles are allocated from a fixed table, client requests are collected
//! in a bounded matrix, and an arbiter reduces them to one hardware rate and
//! latency per sensor. A power/rate state machine drives each sensor towards
//! that target through asynchronous driver completions.
//!
//! Key constraints:
//! - Every table, slab and queue is statically sized
//! - Capacity exhaustion is an error value, never a panic
//! - Nothing blocks; completions are queued and processed later
//!
//! ```rust
//! use sensorhub_core::{SensorHub, SensorInfo, SensorRate, SensorState, SensorType, NumAxis, Interrupt};
//! use sensorhub_core::events::InternalEvent;
//!
//! static RATES: [SensorRate; 3] = [SensorRate::hz(1), SensorRate::hz(5), SensorRate::OnChange];
//! static ALS: SensorInfo = SensorInfo {
//!     name: "als",
//!     supported_rates: &RATES,
//!     sensor_type: SensorType::Als,
//!     num_axis: NumAxis::One,
//!     interrupt: Interrupt::NonWake,
//!     min_samples: 1,
//! };
//!
//! let mut hub = SensorHub::new();
//! let als = hub.register_as_app(&ALS, 2, 0, true).unwrap();
//! hub.request(als, 9, SensorRate::hz(1), 0).unwrap();
//! assert_eq!(hub.cur_rate(als), SensorState::PoweringOn);
//!
//! // The owning task reports that power-up finished
//! hub.signal_internal_evt(InternalEvent::power_state_changed(als, true)).unwrap();
//! hub.run_deferred();
//! assert_eq!(hub.cur_rate(als), SensorState::FirmwareUploading);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

mod macros;

pub mod arbiter;
pub mod bitset;
pub mod constants;
mod dispatch;
pub mod errors;
pub mod events;
mod power;
pub mod rate;
pub mod registry;
pub mod requests;
pub mod sensor;
pub mod slab;
pub mod time;

// Public API
pub use errors::{HubError, HubResult};
pub use events::{AppEvent, InternalEvent, InternalEventKind, SensorCommand};
pub use rate::{Rate, SensorRate, SensorState};
pub use registry::SensorHub;
pub use sensor::{
    ClientId, DriverLink, Interrupt, NumAxis, Owner, SensorHandle, SensorInfo, SensorOps, SensorType,
    TaskId,
};
pub use slab::SlabPool;
pub use time::Timestamp;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
