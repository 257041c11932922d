//! Shared fixtures for the fusion integration tests
//!
//! Provides:
//! - Local accel/gyro/mag drivers that complete every transition at once
//! - A rig holding the hub and the fusion task, with a host loop that routes
//!   queued calls to the task and runs deferred completions
//! - Float comparison helper

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use sensorhub_core::events::{latency_to_raw, InternalEventKind};
use sensorhub_core::{
    ClientId, DriverLink, Interrupt, NumAxis, SensorHandle, SensorHub, SensorInfo, SensorOps, SensorRate,
    SensorType, TaskId,
};
use sensorhub_fusion::{FusionConfig, FusionTask, RawSensor, SensorEvent, TripleAxisBatch, Vec3};

/// Assert two floats are within `tol` of each other
macro_rules! assert_within_tolerance {
    ($actual:expr, $expected:expr, $tol:expr) => {{
        let (actual, expected, tol) = ($actual as f32, $expected as f32, $tol as f32);
        assert!(
            (actual - expected).abs() <= tol,
            "{} not within {} of {}",
            actual,
            tol,
            expected
        );
    }};
}

pub const DRIVER_TID: TaskId = 2;
pub const FUSION_TID: TaskId = 5;
pub const APP: ClientId = 40;
pub const OTHER_APP: ClientId = 41;

pub const MS: u64 = 1_000_000;

pub static RAW_RATES: [SensorRate; 6] = [
    SensorRate::from_raw(12_800),
    SensorRate::hz(25),
    SensorRate::hz(50),
    SensorRate::hz(100),
    SensorRate::hz(200),
    SensorRate::hz(400),
];

const fn raw_info(name: &'static str, sensor_type: SensorType, rates: &'static [SensorRate]) -> SensorInfo {
    SensorInfo {
        name,
        supported_rates: rates,
        sensor_type,
        num_axis: NumAxis::Three,
        interrupt: Interrupt::NonWake,
        min_samples: 1,
    }
}

pub static ACCEL: SensorInfo = raw_info("accel", SensorType::Accel, &RAW_RATES);
pub static GYRO: SensorInfo = raw_info("gyro", SensorType::Gyro, &RAW_RATES);
pub static MAG: SensorInfo = raw_info("mag", SensorType::Mag, &RAW_RATES);

/// Power and rate calls seen by the raw drivers
#[derive(Debug, Clone, PartialEq)]
pub enum RawCall {
    Power(SensorType, bool),
    SetRate(SensorType, SensorRate),
}

pub type RawLog = Rc<RefCell<Vec<RawCall>>>;

/// Raw IMU driver completing every transition from inside the call
pub struct RawDriver {
    sensor_type: SensorType,
    log: RawLog,
}

impl SensorOps for RawDriver {
    fn power(&mut self, on: bool, link: &mut DriverLink<'_>) -> bool {
        self.log.borrow_mut().push(RawCall::Power(self.sensor_type, on));
        let _ = link.signal(InternalEventKind::PowerStateChanged, on as u32, 0);
        true
    }

    fn firmware_upload(&mut self, link: &mut DriverLink<'_>) -> bool {
        let _ = link.signal(InternalEventKind::FirmwareStateChanged, 1, 0);
        true
    }

    fn set_rate(&mut self, rate: SensorRate, latency: Option<u64>, link: &mut DriverLink<'_>) -> bool {
        self.log.borrow_mut().push(RawCall::SetRate(self.sensor_type, rate));
        let _ = link.signal(InternalEventKind::RateChanged, rate.to_raw(), latency_to_raw(latency));
        true
    }

    fn flush(&mut self, _link: &mut DriverLink<'_>) -> bool {
        true
    }

    fn send_one_direct_evt(&mut self, _requester: ClientId, _link: &mut DriverLink<'_>) -> bool {
        false
    }
}

/// Hub, fusion task and raw sensors wired together
pub struct Rig {
    pub hub: SensorHub,
    pub fusion: FusionTask,
    pub accel: SensorHandle,
    pub gyro: SensorHandle,
    pub mag: SensorHandle,
    pub log: RawLog,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(FusionConfig::default())
    }

    pub fn with_config(config: FusionConfig) -> Self {
        let mut hub = SensorHub::new();
        let log = RawLog::default();

        hub.set_current_task(DRIVER_TID);
        let mut register = |info: &'static SensorInfo| {
            let driver = RawDriver {
                sensor_type: info.sensor_type,
                log: log.clone(),
            };
            hub.register(info, Box::new(driver), 0, true).unwrap()
        };
        let accel = register(&ACCEL);
        let gyro = register(&GYRO);
        let mag = register(&MAG);

        let fusion = FusionTask::new(&mut hub, FUSION_TID, config).unwrap();
        hub.set_current_task(APP);

        Self {
            hub,
            fusion,
            accel,
            gyro,
            mag,
            log,
        }
    }

    /// Route queued calls to the fusion task and run completions until quiet
    pub fn pump(&mut self) {
        for _ in 0..64 {
            let mut work = 0;
            while let Ok(evt) = self.hub.poll_app_event() {
                assert_eq!(evt.to, FUSION_TID);
                self.fusion.handle_command(&mut self.hub, evt).unwrap();
                work += 1;
            }
            work += self.hub.run_deferred();
            if work == 0 {
                return;
            }
        }
        panic!("rig did not settle");
    }

    /// Deliver raw samples spaced `step` apart, starting at `start`
    pub fn feed(&mut self, source: RawSensor, start: u64, step: u64, count: usize, v: Vec3) {
        let points: Vec<_> = (0..count as u64).map(|i| (start + i * step, v)).collect();
        for chunk in points.chunks(15) {
            let batch = TripleAxisBatch::from_timed(chunk).unwrap();
            self.fusion.handle_sensor_data(source, &batch);
        }
    }

    /// Every output batch ready so far
    pub fn outputs(&mut self) -> Vec<SensorEvent> {
        std::iter::from_fn(|| self.fusion.poll_output().ok()).collect()
    }

    pub fn raw_calls(&self) -> Vec<RawCall> {
        self.log.borrow().clone()
    }
}
