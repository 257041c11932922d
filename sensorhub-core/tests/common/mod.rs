//! Shared fixtures for the registry integration tests
//!
//! Provides:
//! - A scriptable local driver that records every call it receives
//! - Static descriptors used across test files
//! - A helper that runs deferred completions until the hub is quiet

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use sensorhub_core::events::{latency_to_raw, CfgPayload, InternalEventKind};
use sensorhub_core::{
    ClientId, DriverLink, Interrupt, NumAxis, SensorHub, SensorInfo, SensorOps, SensorRate, SensorType,
    TaskId,
};

/// {1Hz, 4Hz, 5Hz, on-change}
pub static ALS_RATES: [SensorRate; 4] = [
    SensorRate::hz(1),
    SensorRate::hz(4),
    SensorRate::hz(5),
    SensorRate::OnChange,
];

pub static ALS: SensorInfo = SensorInfo {
    name: "als",
    supported_rates: &ALS_RATES,
    sensor_type: SensorType::Als,
    num_axis: NumAxis::One,
    interrupt: Interrupt::NonWake,
    min_samples: 1,
};

pub static PROX_RATES: [SensorRate; 2] = [SensorRate::OnChange, SensorRate::OnDemand];

pub static PROX: SensorInfo = SensorInfo {
    name: "prox",
    supported_rates: &PROX_RATES,
    sensor_type: SensorType::Prox,
    num_axis: NumAxis::One,
    interrupt: Interrupt::Wake,
    min_samples: 1,
};

/// One call observed by [`MockDriver`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Power(bool),
    FirmwareUpload,
    SetRate(SensorRate, Option<u64>),
    Flush,
    TriggerOndemand,
    Calibrate,
    CfgData(Vec<u8>),
    SendOneDirectEvt(ClientId),
    Marshall(u32),
}

/// One recorded call with the identities the driver saw
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub call: Call,
    /// Task the hub ran the call as
    pub current: TaskId,
    /// Task that made the call
    pub caller: TaskId,
}

/// Calls seen by a driver
pub type CallLog = Rc<RefCell<Vec<Seen>>>;

/// Local driver that completes every transition immediately
///
/// Completions go through the deferred queue like a real driver's would, so
/// the hub only observes them on `run_deferred`.
pub struct MockDriver {
    pub log: CallLog,
    /// Signal completions from inside each call
    pub auto_complete: bool,
    /// Whether a last value is cached for on-change replay
    pub has_cached_value: bool,
    /// Firmware upload outcome reported on completion
    pub firmware_ok: bool,
    /// Number of upcoming power calls to refuse
    pub refuse_power: Rc<Cell<usize>>,
}

impl MockDriver {
    pub fn new() -> (Self, CallLog) {
        let log = CallLog::default();
        (
            Self {
                log: log.clone(),
                auto_complete: true,
                has_cached_value: false,
                firmware_ok: true,
                refuse_power: Rc::default(),
            },
            log,
        )
    }

    pub fn manual() -> (Self, CallLog) {
        let (mut driver, log) = Self::new();
        driver.auto_complete = false;
        (driver, log)
    }

    fn record(&self, call: Call, link: &DriverLink<'_>) {
        self.log.borrow_mut().push(Seen {
            call,
            current: link.current_task(),
            caller: link.caller(),
        });
    }
}

impl SensorOps for MockDriver {
    fn power(&mut self, on: bool, link: &mut DriverLink<'_>) -> bool {
        self.record(Call::Power(on), link);
        let refusals = self.refuse_power.get();
        if refusals > 0 {
            self.refuse_power.set(refusals - 1);
            return false;
        }
        if self.auto_complete {
            let _ = link.signal(InternalEventKind::PowerStateChanged, on as u32, 0);
        }
        true
    }

    fn firmware_upload(&mut self, link: &mut DriverLink<'_>) -> bool {
        self.record(Call::FirmwareUpload, link);
        if self.auto_complete {
            let _ = link.signal(InternalEventKind::FirmwareStateChanged, self.firmware_ok as u32, 0);
        }
        true
    }

    fn set_rate(&mut self, rate: SensorRate, latency: Option<u64>, link: &mut DriverLink<'_>) -> bool {
        self.record(Call::SetRate(rate, latency), link);
        if self.auto_complete {
            let _ = link.signal(InternalEventKind::RateChanged, rate.to_raw(), latency_to_raw(latency));
        }
        true
    }

    fn flush(&mut self, link: &mut DriverLink<'_>) -> bool {
        self.record(Call::Flush, link);
        true
    }

    fn send_one_direct_evt(&mut self, requester: ClientId, link: &mut DriverLink<'_>) -> bool {
        self.record(Call::SendOneDirectEvt(requester), link);
        self.has_cached_value
    }

    fn trigger_ondemand(&mut self, link: &mut DriverLink<'_>) -> bool {
        self.record(Call::TriggerOndemand, link);
        true
    }

    fn cfg_data(&mut self, data: &CfgPayload, link: &mut DriverLink<'_>) -> bool {
        self.record(Call::CfgData(data.to_vec()), link);
        true
    }

    fn marshall_data(&mut self, evt_type: u32, data: &mut [u8], link: &mut DriverLink<'_>) -> bool {
        self.record(Call::Marshall(evt_type), link);
        data.reverse();
        true
    }
}

/// Run deferred completions until none are left, returning how many ran
pub fn settle(hub: &mut SensorHub) -> usize {
    let mut total = 0;
    for _ in 0..64 {
        let handled = hub.run_deferred();
        if handled == 0 {
            return total;
        }
        total += handled;
    }
    panic!("hub did not settle");
}

/// Calls recorded so far, without the task ids
pub fn calls(log: &CallLog) -> Vec<Call> {
    log.borrow().iter().map(|seen| seen.call.clone()).collect()
}
