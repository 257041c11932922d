//! Fusion Task
//!
//! ## Overview
//!
//! The fusion task owns six derived sensors and is itself a client of the
//! raw accelerometer, gyroscope and magnetometer. The registry reaches it
//! only through queued calls, so the host routes every [`AppEvent`]
//! addressed to the task's id into [`FusionTask::handle_command`]:
//!
//! ```text
//!   client ──request──▶ SensorHub ──AppEvent──▶ FusionTask ──request──▶ raw sensors
//!                           ▲                       │
//!                           └──── completions ──────┘
//! ```
//!
//! Raw batches go to [`FusionTask::handle_sensor_data`]. Each stream is
//! resampled onto its own grid, the grids are merged in time order into the
//! attitude filters, and derived batches queue up for
//! [`FusionTask::poll_output`].
//!
//! ## Raw Rates
//!
//! All active outputs share the raw streams, so each stream runs at the
//! fastest rate any active output asks for, with two adjustments:
//!
//! | Source | Rate                         |
//! |--------|------------------------------|
//! | accel  | max output rate              |
//! | gyro   | at least `gyro_min_rate`     |
//! | mag    | at most `mag_max_rate`       |
//!
//! Raw latency is capped so two full batches of the fastest stream still fit
//! in its grid buffer.

use core::convert::Infallible;

use sensorhub_core::events::InternalEvent;
use sensorhub_core::{
    AppEvent, HubError, HubResult, Interrupt, NumAxis, Rate, SensorCommand, SensorHandle, SensorHub,
    SensorInfo, SensorRate, SensorType, TaskId,
};

use crate::config::FusionConfig;
use crate::constants::{FIFO_DEPTH, NS_TO_S};
use crate::filter::AttitudeFilter;
use crate::macros::{fusion_debug, fusion_warn};
use crate::math::Vec3;
use crate::output::{OutputQueue, PendingBatch};
use crate::resampler::Resampler;
use crate::sample::{SensorEvent, TripleAxisBatch};

/// Raw input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RawSensor {
    /// Accelerometer
    Accel,
    /// Gyroscope
    Gyro,
    /// Magnetometer
    Mag,
}

impl RawSensor {
    /// All raw inputs, in storage order
    pub const ALL: [RawSensor; 3] = [RawSensor::Accel, RawSensor::Gyro, RawSensor::Mag];

    /// Registry type searched for this input
    pub const fn sensor_type(self) -> SensorType {
        match self {
            RawSensor::Accel => SensorType::Accel,
            RawSensor::Gyro => SensorType::Gyro,
            RawSensor::Mag => SensorType::Mag,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Derived sensor published by the fusion task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FusionOutput {
    /// Azimuth, pitch and roll in degrees
    Orientation,
    /// Gravity in the device frame
    Gravity,
    /// Acceleration with gravity removed
    LinearAccel,
    /// Attitude from accel and mag
    GeomagRotationVector,
    /// Attitude from accel and gyro
    GameRotationVector,
    /// Attitude from all three
    RotationVector,
}

static OUTPUT_RATES: [SensorRate; 5] = [
    SensorRate::from_raw(12_800),
    SensorRate::hz(25),
    SensorRate::hz(50),
    SensorRate::hz(100),
    SensorRate::hz(200),
];

const fn output_info(name: &'static str, sensor_type: SensorType, rates: &'static [SensorRate]) -> SensorInfo {
    SensorInfo {
        name,
        supported_rates: rates,
        sensor_type,
        num_axis: NumAxis::Three,
        interrupt: Interrupt::NonWake,
        min_samples: 20,
    }
}

static ORIENTATION: SensorInfo = output_info("Orientation", SensorType::Orientation, &OUTPUT_RATES);
static GRAVITY: SensorInfo = output_info("Gravity", SensorType::Gravity, &OUTPUT_RATES);
static LINEAR_ACCEL: SensorInfo = output_info("Linear Acceleration", SensorType::LinearAccel, &OUTPUT_RATES);
static GEOMAG_ROTATION: SensorInfo = output_info("Geomagnetic Rotation Vector", SensorType::GeomagRotationVector, &OUTPUT_RATES);
static GAME_ROTATION: SensorInfo = output_info("Game Rotation Vector", SensorType::GameRotationVector, &OUTPUT_RATES);
static ROTATION: SensorInfo = output_info("Rotation Vector", SensorType::RotationVector, &OUTPUT_RATES);

impl FusionOutput {
    /// All outputs, in registration order
    pub const ALL: [FusionOutput; 6] = [
        FusionOutput::Orientation,
        FusionOutput::Gravity,
        FusionOutput::LinearAccel,
        FusionOutput::GeomagRotationVector,
        FusionOutput::GameRotationVector,
        FusionOutput::RotationVector,
    ];

    /// Static descriptor registered for this output
    pub fn info(self) -> &'static SensorInfo {
        match self {
            FusionOutput::Orientation => &ORIENTATION,
            FusionOutput::Gravity => &GRAVITY,
            FusionOutput::LinearAccel => &LINEAR_ACCEL,
            FusionOutput::GeomagRotationVector => &GEOMAG_ROTATION,
            FusionOutput::GameRotationVector => &GAME_ROTATION,
            FusionOutput::RotationVector => &ROTATION,
        }
    }

    /// Whether the output needs the gyroscope
    pub const fn use_gyro(self) -> bool {
        !matches!(self, FusionOutput::GeomagRotationVector)
    }

    /// Whether the output needs the magnetometer
    pub const fn use_mag(self) -> bool {
        matches!(
            self,
            FusionOutput::Orientation | FusionOutput::GeomagRotationVector | FusionOutput::RotationVector
        )
    }

    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug)]
struct DerivedOutput {
    kind: FusionOutput,
    handle: SensorHandle,
    active: bool,
    rate: Option<Rate>,
    latency: Option<u64>,
    pending: PendingBatch,
}

#[derive(Debug)]
struct RawSource {
    handle: Option<SensorHandle>,
    clients: u8,
    rate: Rate,
    resampler: Resampler,
}

impl RawSource {
    fn live(&self) -> bool {
        self.clients > 0 && self.handle.is_some()
    }
}

/// Sensor fusion engine and owner of the derived sensors
pub struct FusionTask {
    tid: TaskId,
    config: FusionConfig,
    outputs: [DerivedOutput; 6],
    raw: [RawSource; 3],
    full: AttitudeFilter,
    game: AttitudeFilter,
    queue: OutputQueue,
}

impl FusionTask {
    /// Register the derived sensors with `hub`, owned by task `tid`
    ///
    /// Nothing stays registered if any registration fails.
    pub fn new(hub: &mut SensorHub, tid: TaskId, config: FusionConfig) -> HubResult<Self> {
        let mut outputs: heapless::Vec<DerivedOutput, 6> = heapless::Vec::new();
        for kind in FusionOutput::ALL {
            let registered = hub
                .register_as_app(kind.info(), tid, kind.index(), true)
                .and_then(|handle| {
                    outputs
                        .push(DerivedOutput {
                            kind,
                            handle,
                            active: false,
                            rate: None,
                            latency: None,
                            pending: PendingBatch::default(),
                        })
                        .map_err(|_| HubError::SensorTableFull)
                });
            if let Err(e) = registered {
                for output in outputs.iter() {
                    let _ = hub.unregister(output.handle);
                }
                return Err(e);
            }
        }
        let outputs = outputs.into_array().map_err(|_| HubError::SensorTableFull)?;

        let raw = RawSensor::ALL.map(|_| RawSource {
            handle: None,
            clients: 0,
            rate: config.default_raw_rate,
            resampler: Resampler::new(config.default_raw_rate.period_ns(), config.discontinuity_factor),
        });

        Ok(Self {
            tid,
            config,
            outputs,
            raw,
            full: AttitudeFilter::new(true, config.accel_gain, config.mag_gain),
            game: AttitudeFilter::new(false, config.accel_gain, config.mag_gain),
            queue: OutputQueue::new(),
        })
    }

    /// Task id the derived sensors are registered under
    pub fn tid(&self) -> TaskId {
        self.tid
    }

    /// Handle of a derived sensor
    pub fn output_handle(&self, kind: FusionOutput) -> SensorHandle {
        self.outputs[kind.index()].handle
    }

    /// Whether a derived sensor is powered
    pub fn is_active(&self, kind: FusionOutput) -> bool {
        self.outputs[kind.index()].active
    }

    /// Raw handle in use for a source, while it has clients
    pub fn raw_handle(&self, source: RawSensor) -> Option<SensorHandle> {
        self.raw[source.index()].handle
    }

    /// Rate currently asked of a raw source
    pub fn raw_rate(&self, source: RawSensor) -> Rate {
        self.raw[source.index()].rate
    }

    /// Raw source a handle belongs to
    pub fn raw_source_of(&self, handle: SensorHandle) -> Option<RawSensor> {
        RawSensor::ALL
            .into_iter()
            .find(|source| self.raw[source.index()].handle == Some(handle))
    }

    // ===== REGISTRY CALLS =====

    /// Serve one queued call addressed to this task
    ///
    /// The hub runs as this task for the duration of the call.
    pub fn handle_command(&mut self, hub: &mut SensorHub, evt: AppEvent) -> HubResult<()> {
        let idx = self
            .outputs
            .iter()
            .position(|o| o.handle == evt.handle)
            .ok_or(HubError::UnknownSensor)?;
        debug_assert_eq!(idx, evt.cookie);

        let caller = hub.current_task();
        hub.set_current_task(self.tid);
        let result = self.dispatch(hub, idx, evt.command);
        hub.set_current_task(caller);
        result
    }

    fn dispatch(&mut self, hub: &mut SensorHub, idx: usize, command: SensorCommand) -> HubResult<()> {
        let handle = self.outputs[idx].handle;
        match command {
            SensorCommand::Power { on } => {
                if on {
                    self.power_on(hub, idx);
                } else {
                    self.power_off(hub, idx);
                }
                hub.signal_internal_evt(InternalEvent::power_state_changed(handle, on))
            }
            SensorCommand::FirmwareUpload => {
                hub.signal_internal_evt(InternalEvent::firmware_state_changed(handle, true))
            }
            SensorCommand::SetRate { rate, latency } => {
                let output = &mut self.outputs[idx];
                output.rate = rate.numeric();
                output.latency = latency;
                self.retune(hub);
                hub.signal_internal_evt(InternalEvent::rate_changed(handle, rate, latency))
            }
            SensorCommand::Flush => {
                self.drain_samples();
                let sensor_type = self.outputs[idx].kind.info().sensor_type;
                self.queue.push_flush_marker(handle, sensor_type);
                Ok(())
            }
            _other => {
                fusion_debug!("{:?} ignored for {}", _other, handle);
                Ok(())
            }
        }
    }

    fn power_on(&mut self, hub: &mut SensorHub, idx: usize) {
        let kind = self.outputs[idx].kind;
        if self.outputs[idx].active {
            return;
        }
        if !self.outputs.iter().any(|o| o.active) {
            self.full.reset(true);
            self.game.reset(false);
        }
        self.outputs[idx].active = true;
        fusion_debug!("{:?} on", kind);

        let (tid, rate, latency) = (self.tid, self.config.default_raw_rate, self.config.default_raw_latency);
        for source in RawSensor::ALL {
            if !Self::depends_on(kind, source) {
                continue;
            }
            let raw = &mut self.raw[source.index()];
            raw.clients += 1;
            if raw.clients > 1 {
                continue;
            }

            match hub.find(source.sensor_type(), 0) {
                Some((raw_handle, _)) => {
                    raw.rate = rate;
                    raw.resampler.set_period(rate.period_ns());
                    match hub.request(raw_handle, tid, SensorRate::Hz(rate), latency) {
                        Ok(()) => raw.handle = Some(raw_handle),
                        Err(_e) => fusion_warn!("{:?} request failed: {}", source, _e),
                    }
                }
                None => fusion_warn!("no {:?} sensor registered", source),
            }
        }
    }

    fn power_off(&mut self, hub: &mut SensorHub, idx: usize) {
        let kind = self.outputs[idx].kind;
        if !self.outputs[idx].active {
            return;
        }
        let output = &mut self.outputs[idx];
        output.active = false;
        output.rate = None;
        output.latency = None;
        self.queue.flush(&mut output.pending);
        fusion_debug!("{:?} off", kind);

        let tid = self.tid;
        for source in RawSensor::ALL {
            if !Self::depends_on(kind, source) {
                continue;
            }
            let raw = &mut self.raw[source.index()];
            raw.clients = raw.clients.saturating_sub(1);
            if raw.clients > 0 {
                continue;
            }
            if let Some(raw_handle) = raw.handle.take() {
                if let Err(_e) = hub.release(raw_handle, tid) {
                    fusion_warn!("{:?} release failed: {}", source, _e);
                }
            }
            raw.resampler.reset();
        }

        self.retune(hub);
    }

    const fn depends_on(kind: FusionOutput, source: RawSensor) -> bool {
        match source {
            RawSensor::Accel => true,
            RawSensor::Gyro => kind.use_gyro(),
            RawSensor::Mag => kind.use_mag(),
        }
    }

    /// Fastest rate asked of the active outputs that read `source`
    fn demanded_rate(&self, source: RawSensor) -> Option<Rate> {
        self.outputs
            .iter()
            .filter(|o| o.active && Self::depends_on(o.kind, source))
            .filter_map(|o| o.rate)
            .filter(|rate| rate.raw() != 0)
            .max()
    }

    /// Recompute raw rates and latency from the active outputs
    ///
    /// Each raw source runs at the fastest rate among the outputs reading it,
    /// with the gyro held at or above its floor and the mag at or below its
    /// ceiling.
    fn retune(&mut self, hub: &mut SensorHub) {
        let mut tuned = false;
        for source in RawSensor::ALL {
            let Some(demanded) = self.demanded_rate(source) else {
                continue;
            };
            self.raw[source.index()].rate = match source {
                RawSensor::Accel => demanded,
                RawSensor::Gyro => demanded.max(self.config.gyro_min_rate),
                RawSensor::Mag => demanded.min(self.config.mag_max_rate),
            };
            tuned = true;
        }
        if !tuned {
            return;
        }

        let mut min_period = u64::MAX;
        for raw in self.raw.iter_mut() {
            let period = raw.rate.period_ns();
            raw.resampler.set_period(period);
            if raw.live() {
                min_period = min_period.min(period);
            }
        }

        // Two full batches of the fastest stream must fit in its grid buffer
        let mut latency = min_period.saturating_mul(FIFO_DEPTH as u64 - 1);
        for output in self.outputs.iter().filter(|o| o.active) {
            if let Some(l) = output.latency {
                latency = latency.min(l);
            }
        }

        let tid = self.tid;
        for source in RawSensor::ALL {
            let raw = &self.raw[source.index()];
            let Some(raw_handle) = raw.handle.filter(|_| raw.live()) else {
                continue;
            };
            if let Err(_e) = hub.request_rate_change(raw_handle, tid, SensorRate::Hz(raw.rate), latency) {
                fusion_warn!("{:?} rate change to {} failed: {}", source, raw.rate, _e);
            }
        }
    }

    // ===== DATA PATH =====

    /// Resample one raw batch and run every grid point that is now ready
    ///
    /// Batches for a source nobody currently needs are ignored.
    pub fn handle_sensor_data(&mut self, source: RawSensor, batch: &TripleAxisBatch) {
        let raw = &mut self.raw[source.index()];
        if !raw.live() {
            fusion_debug!("{:?} batch with no active output dropped", source);
            return;
        }
        raw.resampler.fill(batch);
        self.drain_samples();
    }

    /// Merge the grids in time order into the filters
    ///
    /// Stops as soon as a stream some active output needs runs dry, then
    /// hands every partial output batch to the delivery queue.
    pub fn drain_samples(&mut self) {
        let need_gyro = self.raw[RawSensor::Gyro.index()].live();
        let need_mag = self.raw[RawSensor::Mag.index()].live();

        loop {
            let Some(a) = self.next_time(RawSensor::Accel, true) else { break };
            let Some(g) = self.next_time(RawSensor::Gyro, need_gyro) else { break };
            let Some(m) = self.next_time(RawSensor::Mag, need_mag) else { break };

            let source = earliest_source(a, g, m);

            let raw = &mut self.raw[source.index()];
            let dt = raw.resampler.period_ns() as f32 * NS_TO_S;
            let Some(sample) = raw.resampler.pop() else { break };

            match source {
                RawSensor::Accel => {
                    self.full.handle_acc(sample.v, dt);
                    self.game.handle_acc(sample.v, dt);
                    self.update_output(sample.time, sample.v);
                }
                RawSensor::Gyro => {
                    self.full.handle_gyro(sample.v, dt);
                    self.game.handle_gyro(sample.v, dt);
                }
                RawSensor::Mag => self.full.handle_mag(sample.v, dt),
            }
        }

        for output in self.outputs.iter_mut() {
            self.queue.flush(&mut output.pending);
        }
    }

    /// Time of a stream's next grid point; `u64::MAX` for a stream not needed
    fn next_time(&self, source: RawSensor, needed: bool) -> Option<u64> {
        if !needed {
            return Some(u64::MAX);
        }
        self.raw[source.index()].resampler.peek().map(|s| s.time)
    }

    fn update_output(&mut self, time: u64, accel: Vec3) {
        for output in self.outputs.iter_mut().filter(|o| o.active) {
            let filter = if output.kind.use_mag() { &self.full } else { &self.game };
            if !filter.has_estimate() {
                continue;
            }
            let v = match output.kind {
                FusionOutput::Orientation => filter.orientation(),
                FusionOutput::Gravity => filter.gravity(),
                FusionOutput::LinearAccel => filter.linear_acceleration(accel),
                FusionOutput::GeomagRotationVector
                | FusionOutput::GameRotationVector
                | FusionOutput::RotationVector => filter.rotation_vector(),
            };
            let sensor_type = output.kind.info().sensor_type;
            self.queue.add_sample(&mut output.pending, output.handle, sensor_type, time, v);
        }
    }

    /// Take the oldest finished output batch
    pub fn poll_output(&mut self) -> nb::Result<SensorEvent, Infallible> {
        self.queue.poll()
    }

    /// Output batches waiting for delivery
    pub fn pending_outputs(&self) -> usize {
        self.queue.ready()
    }
}

/// Stream holding the earliest grid point; ties go gyro, then accel, then mag
fn earliest_source(accel: u64, gyro: u64, mag: u64) -> RawSensor {
    if gyro <= accel && gyro <= mag {
        RawSensor::Gyro
    } else if accel <= mag {
        RawSensor::Accel
    } else {
        RawSensor::Mag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_flags() {
        assert!(FusionOutput::Orientation.use_gyro() && FusionOutput::Orientation.use_mag());
        assert!(FusionOutput::Gravity.use_gyro() && !FusionOutput::Gravity.use_mag());
        assert!(!FusionOutput::GeomagRotationVector.use_gyro());
        assert!(FusionOutput::GeomagRotationVector.use_mag());
        assert!(!FusionOutput::GameRotationVector.use_mag());
    }

    #[test]
    fn equal_times_drain_gyro_then_accel_then_mag() {
        assert_eq!(earliest_source(10, 10, 10), RawSensor::Gyro);
        assert_eq!(earliest_source(10, 20, 10), RawSensor::Accel);
        assert_eq!(earliest_source(20, 20, 10), RawSensor::Mag);
        assert_eq!(earliest_source(10, u64::MAX, u64::MAX), RawSensor::Accel);
    }

    #[test]
    fn merge_consumes_grids_in_time_order() {
        // Accel and gyro on a 10 tick grid, mag on a 20 tick grid
        let mut grids = [
            heapless::Deque::<u64, 8>::new(),
            heapless::Deque::<u64, 8>::new(),
            heapless::Deque::<u64, 8>::new(),
        ];
        for t in [0, 10, 20] {
            grids[0].push_back(t).unwrap();
            grids[1].push_back(t).unwrap();
        }
        for t in [0, 20] {
            grids[2].push_back(t).unwrap();
        }

        let mut order = heapless::Vec::<(RawSensor, u64), 8>::new();
        loop {
            let next = |i: usize| grids[i].front().copied().unwrap_or(u64::MAX);
            let (a, g, m) = (next(0), next(1), next(2));
            if a == u64::MAX && g == u64::MAX && m == u64::MAX {
                break;
            }
            let source = earliest_source(a, g, m);
            let idx = match source {
                RawSensor::Accel => 0,
                RawSensor::Gyro => 1,
                RawSensor::Mag => 2,
            };
            let t = grids[idx].pop_front().unwrap();
            order.push((source, t)).unwrap();
        }

        use RawSensor::{Accel, Gyro, Mag};
        assert_eq!(
            order.as_slice(),
            &[
                (Gyro, 0),
                (Accel, 0),
                (Mag, 0),
                (Gyro, 10),
                (Accel, 10),
                (Gyro, 20),
                (Accel, 20),
                (Mag, 20),
            ]
        );
    }

    #[test]
    fn registers_six_remote_outputs() {
        let mut hub = SensorHub::new();
        let task = FusionTask::new(&mut hub, 7, FusionConfig::default()).unwrap();
        assert_eq!(hub.registered(), 6);
        for kind in FusionOutput::ALL {
            let handle = task.output_handle(kind);
            assert_eq!(handle.task_id(), 7);
            assert_eq!(hub.sensor_info(handle).unwrap().sensor_type, kind.info().sensor_type);
            assert!(!task.is_active(kind));
        }
    }

    #[test]
    fn lowest_output_rate_is_twelve_and_a_half_hz() {
        assert_eq!(OUTPUT_RATES[0].numeric().unwrap().as_hz_f32(), 12.5);
    }
}
