//! Dispatch Layer
//!
//! Every call into a sensor implementation goes through here. The owner
//! decides the path:
//!
//! - `Owner::Local`: called synchronously. For the duration of the call the
//!   hub's current task id is the sensor's owning task, then the caller's id
//!   is restored.
//! - `Owner::Remote(tid)`: the call becomes an [`AppEvent`] in the outbound
//!   mailbox, addressed to `tid`. If the internal slab has no room nothing is
//!   queued and the call fails.
//!
//! A call either starts or fails; there is no partially sent call.

use core::mem;

use crate::errors::{HubError, HubResult};
use crate::events::{AppEvent, SensorCommand};
use crate::macros::hub_error;
use crate::registry::SensorHub;
use crate::sensor::{DriverLink, Owner};

impl SensorHub {
    /// Forward `command` to the implementation of the sensor in `slot`
    pub(crate) fn dispatch(&mut self, slot: usize, command: SensorCommand) -> HubResult<()> {
        let Self {
            sensors,
            bus,
            current_tid,
            ..
        } = self;
        let sensor = sensors
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(HubError::UnknownSensor)?;
        let handle = sensor.handle;

        match &mut sensor.owner {
            Owner::Local(ops) => {
                let caller = mem::replace(current_tid, handle.task_id());
                let mut link = DriverLink {
                    handle,
                    cookie: sensor.cookie,
                    current: *current_tid,
                    caller,
                    bus,
                };
                let started = match command {
                    SensorCommand::Power { on } => ops.power(on, &mut link),
                    SensorCommand::FirmwareUpload => ops.firmware_upload(&mut link),
                    SensorCommand::SetRate { rate, latency } => ops.set_rate(rate, latency, &mut link),
                    SensorCommand::Flush => ops.flush(&mut link),
                    SensorCommand::TriggerOndemand => ops.trigger_ondemand(&mut link),
                    SensorCommand::Calibrate => ops.calibrate(&mut link),
                    SensorCommand::CfgData(data) => ops.cfg_data(&data, &mut link),
                    SensorCommand::SendOneDirectEvt { requester } => {
                        ops.send_one_direct_evt(requester, &mut link)
                    }
                };
                *current_tid = caller;

                if started {
                    Ok(())
                } else {
                    Err(HubError::DriverRefused)
                }
            }
            Owner::Remote(tid) => {
                let result = bus.post(AppEvent {
                    to: *tid,
                    handle,
                    cookie: sensor.cookie,
                    command,
                });
                if result.is_err() {
                    hub_error!("dispatch to task {} for {} dropped: event slab full", tid, handle);
                }
                result
            }
        }
    }

    /// Let a local implementation rewrite an event payload in place
    ///
    /// Marshalling happens synchronously on the caller's buffer, so it is
    /// only offered by local implementations.
    pub(crate) fn dispatch_marshall(&mut self, slot: usize, evt_type: u32, data: &mut [u8]) -> HubResult<()> {
        let Self {
            sensors,
            bus,
            current_tid,
            ..
        } = self;
        let sensor = sensors
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(HubError::UnknownSensor)?;
        let handle = sensor.handle;

        let Owner::Local(ops) = &mut sensor.owner else {
            return Err(HubError::Unsupported {
                reason: "marshalling by a remote owner",
            });
        };

        let caller = mem::replace(current_tid, handle.task_id());
        let mut link = DriverLink {
            handle,
            cookie: sensor.cookie,
            current: *current_tid,
            caller,
            bus,
        };
        let done = ops.marshall_data(evt_type, data, &mut link);
        *current_tid = caller;

        if done {
            Ok(())
        } else {
            Err(HubError::DriverRefused)
        }
    }
}
