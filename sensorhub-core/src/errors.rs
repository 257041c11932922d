//! Error Types for Registry and Dispatch Failures
//!
//! ## Design Philosophy
//!
//! Every failure the hub can report is a normal, recoverable outcome. Nothing
//! here is fatal and nothing is retried by the core itself:
//!
//! 1. **Small Size**: variants carry at most a `&'static str`, so the enum is
//!    `Copy` and cheap to return from hot paths.
//!
//! 2. **No Heap Allocation**: messages are static, keeping memory usage
//!    deterministic on the coprocessor.
//!
//! 3. **Atomic Failure**: an operation returning `Err` has not mutated the
//!    registry, the request matrix or the internal event slab.
//!
//! ## Error Categories
//!
//! ### Capacity Exhaustion
//! - `SensorTableFull`: every descriptor slot is taken
//! - `RequestMatrixFull`: the client request slab is exhausted
//! - `EventSlabFull`: no internal event could be allocated for a remote call
//!   or a completion signal
//!
//! ### Policy Rejection
//! - `RateImpossible`: the sensor cannot run at any rate satisfying the request
//! - `Unsupported`: the sensor lacks the capability (on-demand, calibration...)
//! - `AlreadyRequested` / `NoRequest`: the (sensor, client) pair is in the
//!   wrong state for the call
//! - `NotReady`: the sensor has not finished initialising
//!
//! ### Transient Failure
//! - `DriverRefused`: the implementation declined to start the operation; the
//!   sensor keeps its previous state and the next reconfig retries
//!
//! Stale completions are never errors: the state machine drops them.

use thiserror_no_std::Error;

/// Result type for hub operations
pub type HubResult<T> = Result<T, HubError>;

/// Hub errors - kept small for embedded use
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// Handle does not name a registered sensor
    #[error("Unknown sensor handle")]
    UnknownSensor,

    /// Sensor descriptor table has no free slot
    #[error("Sensor table full")]
    SensorTableFull,

    /// Client request matrix has no free entry
    #[error("Client request matrix full")]
    RequestMatrixFull,

    /// Internal event slab (or its queue) has no room
    #[error("Internal event slab full")]
    EventSlabFull,

    /// No supported rate satisfies the combined requests
    #[error("Requested rate impossible for this sensor")]
    RateImpossible,

    /// The client already holds a request on this sensor
    #[error("Client already holds a request on this sensor")]
    AlreadyRequested,

    /// The client holds no request on this sensor
    #[error("Client holds no request on this sensor")]
    NoRequest,

    /// Sensor has not completed initialisation
    #[error("Sensor not ready")]
    NotReady,

    /// Operation not offered by this sensor
    #[error("Unsupported: {reason}")]
    Unsupported {
        /// Which capability is missing
        reason: &'static str,
    },

    /// Implementation declined to start the operation
    #[error("Driver refused operation")]
    DriverRefused,

    /// Configuration payload larger than a remote call can carry
    #[error("Payload too large: {len} bytes, max {max}")]
    PayloadTooLarge {
        /// Size of the rejected payload
        len: usize,
        /// Largest payload accepted
        max: usize,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for HubError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::UnknownSensor => defmt::write!(fmt, "Unknown sensor"),
            Self::SensorTableFull => defmt::write!(fmt, "Sensor table full"),
            Self::RequestMatrixFull => defmt::write!(fmt, "Request matrix full"),
            Self::EventSlabFull => defmt::write!(fmt, "Event slab full"),
            Self::RateImpossible => defmt::write!(fmt, "Rate impossible"),
            Self::AlreadyRequested => defmt::write!(fmt, "Already requested"),
            Self::NoRequest => defmt::write!(fmt, "No request"),
            Self::NotReady => defmt::write!(fmt, "Not ready"),
            Self::Unsupported { reason } => defmt::write!(fmt, "Unsupported: {}", reason),
            Self::DriverRefused => defmt::write!(fmt, "Driver refused"),
            Self::PayloadTooLarge { len, max } =>
                defmt::write!(fmt, "Payload {} > {}", len, max),
        }
    }
}
