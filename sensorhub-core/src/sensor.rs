//! Sensor descriptors and the driver contract
//!
//! A registered sensor has a static half ([`SensorInfo`], usually a `static`
//! table in the driver) and a dynamic half kept by the registry: its
//! power/rate state, the owner of its implementation and its callback data.

use alloc::boxed::Box;
use core::fmt;
use core::num::NonZeroU32;

use crate::constants::{HANDLE_COUNTER_MASK, TASK_TID_BITS};
use crate::events::{CfgPayload, EventBus, InternalEvent, InternalEventKind};
use crate::errors::HubResult;
use crate::rate::{SensorRate, SensorState};

/// Identifier of a cooperative task; clients are tasks too
pub type TaskId = u16;

/// Identifier of a client holding sensor requests
pub type ClientId = TaskId;

/// Base of the per-sensor-type event numbers
pub const EVT_NO_FIRST_SENSOR_EVENT: u32 = 0x0000_0200;

/// Event type bit marking an event that may be dropped under memory pressure
pub const EVENT_TYPE_BIT_DISCARDABLE: u32 = 0x8000_0000;

/// Opaque, never-zero identifier of a registered sensor
///
/// The owning task id sits in the top bits, a rolling counter in the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorHandle(NonZeroU32);

impl SensorHandle {
    /// Wrap a raw handle; zero is not a handle
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Compose a handle from its owner and counter
    pub(crate) const fn compose(tid: TaskId, counter: u32) -> Option<Self> {
        Self::from_raw(((tid as u32) << (32 - TASK_TID_BITS)) | (counter & HANDLE_COUNTER_MASK))
    }

    /// Raw 32-bit value
    pub const fn raw(self) -> u32 {
        self.0.get()
    }

    /// Task owning the sensor's implementation
    pub const fn task_id(self) -> TaskId {
        (self.0.get() >> (32 - TASK_TID_BITS)) as TaskId
    }
}

impl fmt::Display for SensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0.get())
    }
}

/// Sensor type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorType {
    /// Accelerometer
    Accel,
    /// Any-motion detector
    AnyMotion,
    /// No-motion detector
    NoMotion,
    /// Significant motion
    SigMotion,
    /// Device lying flat
    Flat,
    /// Gyroscope
    Gyro,
    /// Gyroscope without bias correction
    GyroUncal,
    /// Magnetometer
    Mag,
    /// Magnetometer without hard-iron correction
    MagUncal,
    /// Barometer
    Baro,
    /// Temperature
    Temp,
    /// Ambient light
    Als,
    /// Proximity
    Prox,
    /// Fused orientation (azimuth, pitch, roll)
    Orientation,
    /// Fused gravity vector
    Gravity,
    /// Acceleration with gravity removed
    LinearAccel,
    /// Attitude from accel, gyro and mag
    RotationVector,
    /// Attitude from accel and mag
    GeomagRotationVector,
    /// Attitude from accel and gyro
    GameRotationVector,
    /// Step counter
    StepCount,
    /// Step detector
    StepDetect,
    /// Double tap
    DoubleTap,
    /// Vendor-specific type code
    Other(u8),
}

impl SensorType {
    /// Numeric type code
    pub const fn code(&self) -> u32 {
        match self {
            SensorType::Accel => 1,
            SensorType::AnyMotion => 2,
            SensorType::NoMotion => 3,
            SensorType::SigMotion => 4,
            SensorType::Flat => 5,
            SensorType::Gyro => 6,
            SensorType::GyroUncal => 7,
            SensorType::Mag => 8,
            SensorType::MagUncal => 9,
            SensorType::Baro => 10,
            SensorType::Temp => 11,
            SensorType::Als => 12,
            SensorType::Prox => 13,
            SensorType::Orientation => 14,
            SensorType::Gravity => 17,
            SensorType::LinearAccel => 18,
            SensorType::RotationVector => 19,
            SensorType::GeomagRotationVector => 20,
            SensorType::GameRotationVector => 21,
            SensorType::StepCount => 22,
            SensorType::StepDetect => 23,
            SensorType::DoubleTap => 27,
            SensorType::Other(code) => *code as u32,
        }
    }

    /// Event number samples of this type are broadcast under
    pub const fn event_type(&self) -> u32 {
        EVT_NO_FIRST_SENSOR_EVENT + self.code()
    }
}

/// Shape of the samples a sensor produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NumAxis {
    /// Sample carries its own payload format
    Embedded,
    /// Single value per sample
    One,
    /// x/y/z per sample
    Three,
}

/// Interrupt classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Interrupt {
    /// Samples may wait for the host to wake
    NonWake,
    /// Samples wake the host
    Wake,
}

/// Immutable part of a sensor descriptor
#[derive(Debug, Clone, Copy)]
pub struct SensorInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Supported rates, ascending; may include the two sentinels
    pub supported_rates: &'static [SensorRate],
    /// Type tag
    pub sensor_type: SensorType,
    /// Sample shape
    pub num_axis: NumAxis,
    /// Wake classification
    pub interrupt: Interrupt,
    /// Smallest batch worth delivering
    pub min_samples: u16,
}

impl SensorInfo {
    /// Whether the rate table advertises on-change delivery
    pub fn supports_onchange(&self) -> bool {
        self.supported_rates.contains(&SensorRate::OnChange)
    }

    /// Whether the rate table advertises on-demand delivery
    pub fn supports_ondemand(&self) -> bool {
        self.supported_rates.contains(&SensorRate::OnDemand)
    }
}

/// Context handed to a local implementation for the duration of one call
pub struct DriverLink<'a> {
    pub(crate) handle: SensorHandle,
    pub(crate) cookie: usize,
    pub(crate) current: TaskId,
    pub(crate) caller: TaskId,
    pub(crate) bus: &'a mut EventBus,
}

impl DriverLink<'_> {
    /// Sensor being driven
    pub fn handle(&self) -> SensorHandle {
        self.handle
    }

    /// Callback data supplied at registration
    pub fn cookie(&self) -> usize {
        self.cookie
    }

    /// Task the registry runs the call as: the sensor's owner
    pub fn current_task(&self) -> TaskId {
        self.current
    }

    /// Task that was current before the registry switched identity
    pub fn caller(&self) -> TaskId {
        self.caller
    }

    /// Report a completed transition; processed on the next `run_deferred`
    pub fn signal(&mut self, kind: InternalEventKind, value1: u32, value2: u64) -> HubResult<()> {
        self.bus.signal(InternalEvent {
            handle: self.handle,
            kind,
            value1,
            value2,
        })
    }
}

/// Driver contract for a sensor implementation living in the caller's task
///
/// Every call returns whether the operation was started. Completion of
/// power, firmware and rate transitions is reported later through
/// [`DriverLink::signal`]. Optional operations default to refusing.
pub trait SensorOps {
    /// Begin powering the sensor on or off
    fn power(&mut self, on: bool, link: &mut DriverLink<'_>) -> bool;

    /// Begin uploading firmware
    fn firmware_upload(&mut self, link: &mut DriverLink<'_>) -> bool;

    /// Begin sampling at a new rate and latency
    fn set_rate(&mut self, rate: SensorRate, latency: Option<u64>, link: &mut DriverLink<'_>) -> bool;

    /// Deliver batched samples now
    fn flush(&mut self, link: &mut DriverLink<'_>) -> bool;

    /// Push the last cached value to `requester`; false if nothing is cached
    fn send_one_direct_evt(&mut self, requester: ClientId, link: &mut DriverLink<'_>) -> bool;

    /// Produce one on-demand sample
    fn trigger_ondemand(&mut self, _link: &mut DriverLink<'_>) -> bool {
        false
    }

    /// Run calibration
    fn calibrate(&mut self, _link: &mut DriverLink<'_>) -> bool {
        false
    }

    /// Apply a configuration blob
    fn cfg_data(&mut self, _data: &CfgPayload, _link: &mut DriverLink<'_>) -> bool {
        false
    }

    /// Rewrite an event's payload into the form the host expects
    fn marshall_data(&mut self, _evt_type: u32, _data: &mut [u8], _link: &mut DriverLink<'_>) -> bool {
        false
    }
}

/// Where a sensor's implementation runs
pub enum Owner {
    /// Called directly, in the caller's context
    Local(Box<dyn SensorOps>),
    /// Reached by posting an [`AppEvent`](crate::events::AppEvent) to this task
    Remote(TaskId),
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Local(_) => f.write_str("Local"),
            Owner::Remote(tid) => write!(f, "Remote({})", tid),
        }
    }
}

/// Registry-side descriptor of a live sensor
#[derive(Debug)]
pub(crate) struct Sensor {
    pub(crate) info: &'static SensorInfo,
    pub(crate) handle: SensorHandle,
    pub(crate) state: SensorState,
    pub(crate) latency: Option<u64>,
    pub(crate) owner: Owner,
    pub(crate) cookie: usize,
    pub(crate) init_complete: bool,
    pub(crate) has_onchange: bool,
    pub(crate) has_ondemand: bool,
}
