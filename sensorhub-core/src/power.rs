//! Power/Rate State Machine
//!
//! ## States
//!
//! ```text
//!            power(true)            power done        firmware done
//!   Off ───────────────▶ PoweringOn ──────────▶ FwUploading ──────────▶ Active(rate)
//!    ▲                      ▲                                               │
//!    │  power-off done      │ new target while powering off                 │ no target
//!    └──────────────── PoweringOff ◀───────────────────────────────────────┘
//!                                              power(false)
//! ```
//!
//! [`SensorHub::reconfig`] compares the state with the arbiter's target and
//! issues at most one driver call. Completions arrive later through the
//! internal event queue and are handled by [`SensorHub::run_deferred`].
//!
//! ## Failure
//!
//! - A driver call that does not start leaves the state untouched; the next
//!   reconfig tries again.
//! - A refused power retry falls back to the settled state the sensor is
//!   really in (`Off` for power-on, `Active` at an unknown rate for
//!   power-off), so the next reconfig issues the command again.
//! - A failed firmware upload forces a power-off instead of leaving the
//!   sensor in an active-looking state.
//! - A completion that no longer matches the state is dropped. A rate
//!   completion that lands after the target moved on is applied and then
//!   checked against the arbiter again.

use crate::events::{latency_from_raw, InternalEvent, InternalEventKind, SensorCommand};
use crate::macros::{hub_debug, hub_warn};
use crate::rate::{SensorRate, SensorState};
use crate::registry::SensorHub;

/// Rate recorded for a sensor left on without a known rate; matches no target
const RATE_UNKNOWN: SensorRate = SensorRate::from_raw(0);

impl SensorHub {
    /// Converge the sensor in `slot` on `target` (`None` = off) and `latency`
    pub(crate) fn reconfig(&mut self, slot: usize, target: Option<SensorRate>, latency: Option<u64>) {
        let Ok(sensor) = self.slot(slot) else {
            return;
        };
        let (state, current_latency) = (sensor.state, sensor.latency);

        if state.is_at(target) && current_latency == latency {
            return;
        }

        match state {
            SensorState::Off => {
                if self.dispatch(slot, SensorCommand::Power { on: true }).is_ok() {
                    self.set_state(slot, SensorState::PoweringOn, None);
                }
            }
            SensorState::PoweringOff => {
                // Let the power-off finish; its completion turns into a retry
                if target.is_some() {
                    self.set_state(slot, SensorState::PoweringOn, None);
                }
            }
            SensorState::PoweringOn | SensorState::FirmwareUploading => {}
            SensorState::Active(_) => match target {
                Some(rate) => {
                    if let Err(_e) = self.dispatch(slot, SensorCommand::SetRate { rate, latency }) {
                        hub_warn!("set_rate({}) not started: {}", rate, _e);
                    }
                }
                None => {
                    if self.dispatch(slot, SensorCommand::Power { on: false }).is_ok() {
                        self.set_state(slot, SensorState::PoweringOff, None);
                    }
                }
            },
        }
    }

    /// Process the completions queued before this call
    ///
    /// Completions signalled while these are handled wait for the next call.
    /// Returns how many were processed.
    pub fn run_deferred(&mut self) -> usize {
        let pending = self.bus.pending_completions();
        let mut handled = 0;
        while handled < pending {
            let Some(evt) = self.bus.next_completion() else {
                break;
            };
            handled += 1;

            let Some(slot) = self.slot_of(evt.handle) else {
                hub_debug!("completion for unknown sensor {} dropped", evt.handle);
                continue;
            };
            match evt.kind {
                InternalEventKind::PowerStateChanged => self.on_power_state_changed(slot, evt),
                InternalEventKind::FirmwareStateChanged => self.on_firmware_state_changed(slot, evt),
                InternalEventKind::RateChanged => self.on_rate_changed(slot, evt),
            }
        }
        handled
    }

    fn on_power_state_changed(&mut self, slot: usize, evt: InternalEvent) {
        let on = evt.value1 != 0;
        let Ok(state) = self.slot(slot).map(|s| s.state) else {
            return;
        };

        match (state, on) {
            (SensorState::PoweringOn, true) => match self.dispatch(slot, SensorCommand::FirmwareUpload) {
                Ok(()) => self.set_state(slot, SensorState::FirmwareUploading, None),
                Err(_e) => {
                    hub_warn!("firmware upload for {} not started: {}", evt.handle, _e);
                    self.set_state(slot, SensorState::PoweringOff, None);
                    self.retry_power(slot, false, SensorState::Off);
                }
            },
            (SensorState::PoweringOff, true) => {
                // Still on: power-off failed or was overtaken
                self.retry_power(slot, false, SensorState::Active(RATE_UNKNOWN));
            }
            (SensorState::PoweringOn, false) => {
                // Still off: power-on failed or a power-off landed first
                self.retry_power(slot, true, SensorState::Off);
            }
            (SensorState::PoweringOff, false) => {
                self.set_state(slot, SensorState::Off, None);
            }
            _ => hub_debug!("stale power completion for {} in {:?}", evt.handle, state),
        }
    }

    fn on_firmware_state_changed(&mut self, slot: usize, evt: InternalEvent) {
        let Ok(state) = self.slot(slot).map(|s| s.state) else {
            return;
        };

        if evt.value1 == 0 {
            hub_warn!("firmware upload failed for {}, powering off", evt.handle);
            self.set_state(slot, SensorState::PoweringOff, None);
            self.retry_power(slot, false, SensorState::Off);
            return;
        }

        match state {
            SensorState::FirmwareUploading => {
                let rate = SensorRate::from_raw(evt.value1);
                self.set_state(slot, SensorState::Active(rate), latency_from_raw(evt.value2));
                // Requests may have changed while the firmware was loading
                self.rearbitrate(slot);
            }
            SensorState::PoweringOff => {
                self.retry_power(slot, false, SensorState::Active(RATE_UNKNOWN));
            }
            _ => hub_debug!("stale firmware completion for {} in {:?}", evt.handle, state),
        }
    }

    fn on_rate_changed(&mut self, slot: usize, evt: InternalEvent) {
        let Some(sensor) = self.sensors.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        if let SensorState::Active(_) = sensor.state {
            sensor.state = SensorState::Active(SensorRate::from_raw(evt.value1));
            sensor.latency = latency_from_raw(evt.value2);
            // Requests may have moved on while the call was in flight
            self.rearbitrate(slot);
        } else {
            hub_debug!("stale rate completion for {} in {:?}", evt.handle, sensor.state);
        }
    }

    /// Resend a power command, settling on `fallback` if the driver refuses
    fn retry_power(&mut self, slot: usize, on: bool, fallback: SensorState) {
        if let Err(_e) = self.dispatch(slot, SensorCommand::Power { on }) {
            hub_warn!("power({}) retry refused: {}, settling at {:?}", on, _e, fallback);
            self.set_state(slot, fallback, None);
        }
    }

    fn set_state(&mut self, slot: usize, state: SensorState, latency: Option<u64>) {
        if let Some(sensor) = self.sensors.get_mut(slot).and_then(Option::as_mut) {
            hub_debug!("{}: {:?} -> {:?}", sensor.handle, sensor.state, state);
            sensor.state = state;
            sensor.latency = latency;
        }
    }
}
