//! Accelerometer, gyroscope and magnetometer fusion for the sensor hub
//!
//! Raw streams arrive in batches with irregular timestamps. Each stream is
//! resampled onto its own fixed-period grid, the grids are merged in time
//! order into two attitude filters, and six derived sensors are published
//! back through the registry:
//!
//! - orientation, gravity and linear acceleration
//! - rotation vector, game rotation vector and geomagnetic rotation vector
//!
//! The fusion task is an ordinary remote owner: the registry reaches it
//! through queued [`AppEvent`](sensorhub_core::AppEvent)s and it requests
//! raw sensors with the same API as any other client.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod macros;

pub mod config;
pub mod constants;
pub mod filter;
pub mod math;
pub mod output;
pub mod resampler;
pub mod sample;
pub mod task;

pub use config::FusionConfig;
pub use filter::AttitudeFilter;
pub use math::{Quaternion, Vec3};
pub use output::OutputQueue;
pub use resampler::{GridSample, Resampler};
pub use sample::{SensorEvent, TripleAxisBatch, TripleAxisSample};
pub use task::{FusionOutput, FusionTask, RawSensor};
