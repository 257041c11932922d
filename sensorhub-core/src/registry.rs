//! Sensor Registry
//!
//! ## Overview
//!
//! [`SensorHub`] owns every piece of shared state in the core:
//!
//! ```text
//! ┌──────────────────────────── SensorHub ────────────────────────────┐
//! │ sensors: [Option<Sensor>; 32]   used: SlotBitset                  │
//! │ requests: RequestMatrix         bus: EventBus (completions+calls) │
//! │ current_tid                     next_handle                       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Clients register sensors, request rates on them and release them again.
//! Each change re-runs the arbiter and hands the result to the power/rate
//! state machine, which issues the smallest driver call that converges the
//! sensor on the new target.
//!
//! ## Concurrency
//!
//! The hub is a plain owned value and every mutating call takes `&mut self`.
//! Cross-task calls are queued messages, never direct calls into another
//! task's data. A host running real threads wraps the hub in a mutex or gives
//! it to one owning task.
//!
//! ## Example
//!
//! ```rust
//! use sensorhub_core::{SensorHub, SensorInfo, SensorRate, SensorType, NumAxis, Interrupt};
//!
//! static RATES: [SensorRate; 2] = [SensorRate::hz(10), SensorRate::hz(50)];
//! static BARO: SensorInfo = SensorInfo {
//!     name: "baro",
//!     supported_rates: &RATES,
//!     sensor_type: SensorType::Baro,
//!     num_axis: NumAxis::One,
//!     interrupt: Interrupt::NonWake,
//!     min_samples: 1,
//! };
//!
//! let mut hub = SensorHub::new();
//! let handle = hub.register_as_app(&BARO, 3, 0, true).unwrap();
//! hub.request(handle, 7, SensorRate::hz(20), 0).unwrap();
//!
//! // The owning task is asked to power the sensor up
//! let call = hub.poll_app_event().unwrap();
//! assert_eq!(call.to, 3);
//! ```

use alloc::boxed::Box;
use core::convert::Infallible;

use crate::arbiter::{compute_hw_latency, compute_hw_rate, RateCaps};
use crate::bitset::SlotBitset;
use crate::constants::{MAX_CFG_DATA_LEN, MAX_REGISTERED_SENSORS};
use crate::errors::{HubError, HubResult};
use crate::events::{AppEvent, CfgPayload, EventBus, InternalEvent, SensorCommand};
use crate::macros::{hub_debug, hub_info, hub_warn};
use crate::rate::{SensorRate, SensorState};
use crate::requests::RequestMatrix;
use crate::sensor::{ClientId, Owner, Sensor, SensorHandle, SensorInfo, SensorOps, SensorType, TaskId};

/// Central registry and scheduler
pub struct SensorHub {
    pub(crate) sensors: [Option<Sensor>; MAX_REGISTERED_SENSORS],
    pub(crate) used: SlotBitset,
    pub(crate) requests: RequestMatrix,
    pub(crate) bus: EventBus,
    pub(crate) current_tid: TaskId,
    pub(crate) next_handle: u32,
}

impl SensorHub {
    /// Empty hub; the current task id starts at zero
    pub fn new() -> Self {
        Self {
            sensors: core::array::from_fn(|_| None),
            used: SlotBitset::new(MAX_REGISTERED_SENSORS),
            requests: RequestMatrix::new(),
            bus: EventBus::new(),
            current_tid: 0,
            next_handle: 0,
        }
    }

    /// Set the identity of the task now running
    pub fn set_current_task(&mut self, tid: TaskId) {
        self.current_tid = tid;
    }

    /// Identity of the task now running
    pub fn current_task(&self) -> TaskId {
        self.current_tid
    }

    // ===== REGISTRATION =====

    /// Register a sensor implemented in the current task
    pub fn register(
        &mut self,
        info: &'static SensorInfo,
        ops: Box<dyn SensorOps>,
        cookie: usize,
        init_complete: bool,
    ) -> HubResult<SensorHandle> {
        let tid = self.current_tid;
        self.install(info, Owner::Local(ops), tid, cookie, init_complete)
    }

    /// Register a sensor implemented by task `tid`, reached through queued calls
    pub fn register_as_app(
        &mut self,
        info: &'static SensorInfo,
        tid: TaskId,
        cookie: usize,
        init_complete: bool,
    ) -> HubResult<SensorHandle> {
        self.install(info, Owner::Remote(tid), tid, cookie, init_complete)
    }

    fn install(
        &mut self,
        info: &'static SensorInfo,
        owner: Owner,
        tid: TaskId,
        cookie: usize,
        init_complete: bool,
    ) -> HubResult<SensorHandle> {
        let slot = self.used.find_clear_and_set().ok_or(HubError::SensorTableFull)?;
        let handle = self.allocate_handle(tid);

        // The slot only becomes visible once the descriptor is complete
        self.sensors[slot] = Some(Sensor {
            info,
            handle,
            state: SensorState::Off,
            latency: None,
            owner,
            cookie,
            init_complete,
            has_onchange: info.supports_onchange(),
            has_ondemand: info.supports_ondemand(),
        });

        hub_info!("registered {} as {} in slot {}", info.name, handle, slot);
        Ok(handle)
    }

    fn allocate_handle(&mut self, tid: TaskId) -> SensorHandle {
        // At most MAX_REGISTERED_SENSORS handles are live, so a free counter
        // value is always found within that many steps past the zero gap
        loop {
            self.next_handle = self.next_handle.wrapping_add(1);
            if let Some(handle) = SensorHandle::compose(tid, self.next_handle) {
                if self.slot_of(handle).is_none() {
                    return handle;
                }
            }
        }
    }

    /// Remove a sensor and every request made on it
    ///
    /// A second call for the same handle fails with `UnknownSensor` and
    /// changes nothing.
    pub fn unregister(&mut self, handle: SensorHandle) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        self.sensors[slot] = None;
        self.used.clear(slot);

        let _purged = self.requests.remove_sensor(handle);
        hub_info!("unregistered {} ({} requests dropped)", handle, _purged);
        Ok(())
    }

    /// Remove every sensor owned by task `tid`, returning how many went
    ///
    /// Used when a task ends; requests on its sensors are purged with them.
    pub fn unregister_all(&mut self, tid: TaskId) -> usize {
        let mut removed = 0;
        while let Some(handle) = self
            .sensors
            .iter()
            .flatten()
            .map(|s| s.handle)
            .find(|h| h.task_id() == tid)
        {
            if self.unregister(handle).is_err() {
                break;
            }
            removed += 1;
        }
        removed
    }

    /// Flag a sensor as ready to accept requests
    pub fn mark_init_complete(&mut self, handle: SensorHandle) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        if let Some(sensor) = self.sensors[slot].as_mut() {
            sensor.init_complete = true;
        }
        Ok(())
    }

    // ===== CLIENT REQUESTS =====

    /// Start receiving `handle` at `rate` on behalf of `client`
    ///
    /// `latency` is raised to at least one sampling period. Sensors that
    /// deliver on change are asked to send their last value to the new client
    /// straight away; having nothing cached yet is not an error.
    pub fn request(
        &mut self,
        handle: SensorHandle,
        client: ClientId,
        rate: SensorRate,
        latency: u64,
    ) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        let has_onchange = {
            let sensor = self.slot(slot)?;
            if !sensor.init_complete {
                return Err(HubError::NotReady);
            }
            sensor.has_onchange
        };
        if self.requests.find(handle, client).is_some() {
            return Err(HubError::AlreadyRequested);
        }

        let target = self.arbitrate(slot, Some(rate), None)?;
        let latency = latency.max(rate.latency_floor_ns());
        self.requests.add(handle, client, rate, latency)?;
        hub_debug!("client {} requested {} at {}", client, handle, rate);

        let hw_latency = compute_hw_latency(handle, &self.requests);
        self.reconfig(slot, target, hw_latency);

        if has_onchange {
            if let Err(_e) = self.dispatch(slot, SensorCommand::SendOneDirectEvt { requester: client }) {
                hub_debug!("no last value sent to {} for {}: {}", client, handle, _e);
            }
        }
        Ok(())
    }

    /// Change the rate and latency of an existing request
    pub fn request_rate_change(
        &mut self,
        handle: SensorHandle,
        client: ClientId,
        rate: SensorRate,
        latency: u64,
    ) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        let old = self.requests.find(handle, client).ok_or(HubError::NoRequest)?.rate;

        let target = self.arbitrate(slot, Some(rate), Some(old))?;
        let latency = latency.max(rate.latency_floor_ns());
        self.requests.amend(handle, client, rate, latency)?;
        hub_debug!("client {} moved {} from {} to {}", client, handle, old, rate);

        let hw_latency = compute_hw_latency(handle, &self.requests);
        self.reconfig(slot, target, hw_latency);
        Ok(())
    }

    /// Drop a client's request; the sensor powers down once nobody is left
    pub fn release(&mut self, handle: SensorHandle, client: ClientId) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        self.requests.remove(handle, client)?;
        hub_debug!("client {} released {}", client, handle);
        self.rearbitrate(slot);
        Ok(())
    }

    /// Drop every request `client` holds, returning how many were released
    pub fn release_all(&mut self, client: ClientId) -> usize {
        let mut released = 0;
        while let Some(handle) = self.requests.first_for_client(client) {
            if self.requests.remove(handle, client).is_err() {
                break;
            }
            released += 1;
            if let Some(slot) = self.slot_of(handle) {
                self.rearbitrate(slot);
            }
        }
        released
    }

    // ===== FORWARDED OPERATIONS =====

    /// Ask the sensor to deliver batched samples now
    pub fn flush(&mut self, handle: SensorHandle) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        self.dispatch(slot, SensorCommand::Flush)
    }

    /// Run the sensor's calibration routine
    pub fn calibrate(&mut self, handle: SensorHandle) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        self.dispatch(slot, SensorCommand::Calibrate)
    }

    /// Hand a configuration blob to the sensor
    pub fn cfg_data(&mut self, handle: SensorHandle, data: &[u8]) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        let payload = CfgPayload::from_slice(data).map_err(|_| HubError::PayloadTooLarge {
            len: data.len(),
            max: MAX_CFG_DATA_LEN,
        })?;
        self.dispatch(slot, SensorCommand::CfgData(payload))
    }

    /// Produce one sample now
    ///
    /// Only clients holding a request may trigger, and only sensors that
    /// advertise on-demand delivery accept it.
    pub fn trigger_ondemand(&mut self, handle: SensorHandle, client: ClientId) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        if !self.slot(slot)?.has_ondemand {
            return Err(HubError::Unsupported { reason: "on-demand" });
        }
        if self.requests.find(handle, client).is_none() {
            return Err(HubError::NoRequest);
        }
        self.dispatch(slot, SensorCommand::TriggerOndemand)
    }

    /// Push the sensor's last value to `requester`
    pub fn send_one_direct_evt(&mut self, handle: SensorHandle, requester: ClientId) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        self.dispatch(slot, SensorCommand::SendOneDirectEvt { requester })
    }

    /// Let the sensor rewrite an event payload into host form
    pub fn marshall_event(&mut self, handle: SensorHandle, evt_type: u32, data: &mut [u8]) -> HubResult<()> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        self.dispatch_marshall(slot, evt_type, data)
    }

    // ===== MESSAGES =====

    /// Queue a completion reported by a remote owner
    pub fn signal_internal_evt(&mut self, evt: InternalEvent) -> HubResult<()> {
        self.bus.signal(evt)
    }

    /// Take the next call addressed to a remote owner
    pub fn poll_app_event(&mut self) -> nb::Result<AppEvent, Infallible> {
        self.bus.next_app_event().ok_or(nb::Error::WouldBlock)
    }

    /// Remote calls waiting for delivery
    pub fn pending_app_events(&self) -> usize {
        self.bus.pending_app_events()
    }

    /// Completions waiting for [`run_deferred`](Self::run_deferred)
    pub fn pending_completions(&self) -> usize {
        self.bus.pending_completions()
    }

    // ===== LOOKUPS =====

    /// Power/rate state; `Off` for an unknown handle
    pub fn cur_rate(&self, handle: SensorHandle) -> SensorState {
        self.sensor(handle).map(|s| s.state).unwrap_or_default()
    }

    /// Latency in effect; `None` if invalid or the handle is unknown
    pub fn cur_latency(&self, handle: SensorHandle) -> Option<u64> {
        self.sensor(handle).and_then(|s| s.latency)
    }

    /// Whether the sensor accepts requests; `false` for an unknown handle
    pub fn init_complete(&self, handle: SensorHandle) -> bool {
        self.sensor(handle).is_some_and(|s| s.init_complete)
    }

    /// The `idx`-th registered sensor of a given type
    pub fn find(&self, sensor_type: SensorType, idx: usize) -> Option<(SensorHandle, &'static SensorInfo)> {
        self.sensors
            .iter()
            .flatten()
            .filter(|s| s.info.sensor_type == sensor_type)
            .nth(idx)
            .map(|s| (s.handle, s.info))
    }

    /// Static descriptor of a registered sensor
    pub fn sensor_info(&self, handle: SensorHandle) -> Option<&'static SensorInfo> {
        self.sensor(handle).map(|s| s.info)
    }

    /// Rate a client holds on a sensor
    pub fn req_rate(&self, handle: SensorHandle, client: ClientId) -> Option<SensorRate> {
        self.requests.find(handle, client).map(|req| req.rate)
    }

    /// Latency a client holds on a sensor, after flooring
    pub fn req_latency(&self, handle: SensorHandle, client: ClientId) -> Option<u64> {
        self.requests.find(handle, client).map(|req| req.latency)
    }

    /// Rate the arbiter currently wants for the sensor, `None` meaning off
    pub fn hw_rate(&self, handle: SensorHandle) -> HubResult<Option<SensorRate>> {
        let slot = self.slot_of(handle).ok_or(HubError::UnknownSensor)?;
        self.arbitrate(slot, None, None)
    }

    /// Latency the arbiter currently wants for the sensor
    pub fn hw_latency(&self, handle: SensorHandle) -> Option<u64> {
        compute_hw_latency(handle, &self.requests)
    }

    /// Number of registered sensors
    pub fn registered(&self) -> usize {
        self.used.count()
    }

    /// Number of live client requests
    pub fn live_requests(&self) -> usize {
        self.requests.len()
    }

    // ===== INTERNALS =====

    pub(crate) fn slot_of(&self, handle: SensorHandle) -> Option<usize> {
        self.sensors
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.handle == handle))
    }

    pub(crate) fn slot(&self, slot: usize) -> HubResult<&Sensor> {
        self.sensors
            .get(slot)
            .filter(|_| self.used.is_set(slot))
            .and_then(Option::as_ref)
            .ok_or(HubError::UnknownSensor)
    }

    fn sensor(&self, handle: SensorHandle) -> Option<&Sensor> {
        self.slot_of(handle).and_then(|slot| self.sensors[slot].as_ref())
    }

    pub(crate) fn arbitrate(
        &self,
        slot: usize,
        extra: Option<SensorRate>,
        excluded: Option<SensorRate>,
    ) -> HubResult<Option<SensorRate>> {
        let sensor = self.slot(slot)?;
        let caps = RateCaps {
            rates: sensor.info.supported_rates,
            has_onchange: sensor.has_onchange,
            has_ondemand: sensor.has_ondemand,
        };
        compute_hw_rate(caps, sensor.handle, &self.requests, extra, excluded)
    }

    /// Recompute the target from the live requests and converge on it
    pub(crate) fn rearbitrate(&mut self, slot: usize) {
        let Ok(handle) = self.slot(slot).map(|s| s.handle) else {
            return;
        };
        match self.arbitrate(slot, None, None) {
            Ok(target) => {
                let latency = compute_hw_latency(handle, &self.requests);
                self.reconfig(slot, target, latency);
            }
            Err(_e) => hub_warn!("no usable rate for {}: {}", handle, _e),
        }
    }
}

impl Default for SensorHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static RATES: [SensorRate; 4] = [
        SensorRate::hz(1),
        SensorRate::hz(4),
        SensorRate::hz(5),
        SensorRate::OnChange,
    ];

    static ALS: SensorInfo = SensorInfo {
        name: "als",
        supported_rates: &RATES,
        sensor_type: SensorType::Als,
        num_axis: crate::sensor::NumAxis::One,
        interrupt: crate::sensor::Interrupt::NonWake,
        min_samples: 1,
    };

    #[test]
    fn handles_carry_owner_and_stay_unique() {
        let mut hub = SensorHub::new();
        let a = hub.register_as_app(&ALS, 4, 0, true).unwrap();
        let b = hub.register_as_app(&ALS, 4, 0, true).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.task_id(), 4);
        assert_eq!(hub.registered(), 2);
    }

    #[test]
    fn table_full() {
        let mut hub = SensorHub::new();
        for _ in 0..MAX_REGISTERED_SENSORS {
            hub.register_as_app(&ALS, 1, 0, true).unwrap();
        }
        assert_eq!(hub.register_as_app(&ALS, 1, 0, true), Err(HubError::SensorTableFull));
    }

    #[test]
    fn lookups_default_for_unknown_handle() {
        let mut hub = SensorHub::new();
        let handle = hub.register_as_app(&ALS, 1, 0, false).unwrap();
        hub.unregister(handle).unwrap();

        assert_eq!(hub.cur_rate(handle), SensorState::Off);
        assert_eq!(hub.cur_latency(handle), None);
        assert!(!hub.init_complete(handle));
        assert_eq!(hub.unregister(handle), Err(HubError::UnknownSensor));
    }

    #[test]
    fn unregister_all_drops_only_the_tasks_sensors() {
        let mut hub = SensorHub::new();
        let a = hub.register_as_app(&ALS, 4, 0, true).unwrap();
        let other = hub.register_as_app(&ALS, 6, 0, true).unwrap();
        let b = hub.register_as_app(&ALS, 4, 0, true).unwrap();
        hub.request(a, 9, SensorRate::hz(1), 0).unwrap();
        hub.request(other, 9, SensorRate::hz(1), 0).unwrap();

        assert_eq!(hub.unregister_all(4), 2);
        assert_eq!(hub.registered(), 1);
        assert_eq!(hub.unregister(a), Err(HubError::UnknownSensor));
        assert_eq!(hub.unregister(b), Err(HubError::UnknownSensor));
        assert_eq!(hub.req_rate(a, 9), None);
        assert_eq!(hub.req_rate(other, 9), Some(SensorRate::hz(1)));
        assert_eq!(hub.live_requests(), 1);

        // Freed slots are usable again
        assert!(hub.register_as_app(&ALS, 4, 0, true).is_ok());
        assert_eq!(hub.unregister_all(4), 1);
        assert_eq!(hub.unregister_all(4), 0);
    }

    #[test]
    fn request_requires_init_complete() {
        let mut hub = SensorHub::new();
        let handle = hub.register_as_app(&ALS, 1, 0, false).unwrap();
        assert_eq!(hub.request(handle, 9, SensorRate::hz(1), 0), Err(HubError::NotReady));

        hub.mark_init_complete(handle).unwrap();
        hub.mark_init_complete(handle).unwrap();
        assert!(hub.request(handle, 9, SensorRate::hz(1), 0).is_ok());
    }

    #[test]
    fn latency_floored_to_one_period() {
        let mut hub = SensorHub::new();
        let handle = hub.register_as_app(&ALS, 1, 0, true).unwrap();
        hub.request(handle, 9, SensorRate::hz(4), 0).unwrap();
        assert_eq!(hub.req_latency(handle, 9), Some(250_000_000));
        assert_eq!(hub.hw_latency(handle), Some(250_000_000));

        hub.request(handle, 10, SensorRate::OnChange, 0).unwrap();
        assert_eq!(hub.hw_latency(handle), Some(0));
    }

    #[test]
    fn find_by_type() {
        let mut hub = SensorHub::new();
        let handle = hub.register_as_app(&ALS, 1, 0, true).unwrap();
        assert_eq!(hub.find(SensorType::Als, 0).map(|(h, _)| h), Some(handle));
        assert!(hub.find(SensorType::Als, 1).is_none());
        assert!(hub.find(SensorType::Accel, 0).is_none());
    }

    #[test]
    fn oversized_cfg_rejected() {
        let mut hub = SensorHub::new();
        let handle = hub.register_as_app(&ALS, 1, 0, true).unwrap();
        let blob = [0u8; 64];
        assert!(matches!(
            hub.cfg_data(handle, &blob),
            Err(HubError::PayloadTooLarge { len: 64, .. })
        ));
        assert_eq!(hub.pending_app_events(), 0);
    }
}
