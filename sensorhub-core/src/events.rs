//! Internal Events and Remote Calls
//!
//! ## Overview
//!
//! Two kinds of message flow through the hub, and both are allocated from
//! the same bounded slab:
//!
//! 1. **Completions** ([`InternalEvent`]): a driver reports that a power,
//!    firmware or rate transition finished. They are queued and processed
//!    later by [`SensorHub::run_deferred`](crate::SensorHub::run_deferred),
//!    never synchronously inside the driver call that produced them.
//! 2. **Remote calls** ([`AppEvent`]): a registry operation on a sensor whose
//!    implementation lives in another task. They wait in the outbound mailbox
//!    until the host delivers them to the owning task.
//!
//! ```text
//!   driver ──signal──▶ ┌──────────┐ ──run_deferred──▶ state machine
//!                      │   slab   │
//!   registry ──post──▶ └──────────┘ ──poll_app_event─▶ owning task
//! ```
//!
//! Consumers take each message by value, which frees its slab slot. A failed
//! enqueue frees the slot before returning, so a message is never half-sent.

use heapless::Deque;

use crate::constants::{MAX_CFG_DATA_LEN, MAX_INTERNAL_EVENTS};
use crate::errors::{HubError, HubResult};
use crate::rate::SensorRate;
use crate::sensor::{SensorHandle, TaskId};
use crate::slab::{SlabPool, SlotIndex};

/// Raw latency value meaning "no latency"
pub const SENSOR_LATENCY_INVALID: u64 = u64::MAX;

/// Decode a raw latency, mapping the invalid sentinel to `None`
pub const fn latency_from_raw(raw: u64) -> Option<u64> {
    if raw == SENSOR_LATENCY_INVALID {
        None
    } else {
        Some(raw)
    }
}

/// Encode a latency, mapping `None` to the invalid sentinel
pub const fn latency_to_raw(latency: Option<u64>) -> u64 {
    match latency {
        Some(ns) => ns,
        None => SENSOR_LATENCY_INVALID,
    }
}

/// Completion a driver reports back to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalEventKind {
    /// `value1`: non-zero if the sensor is now powered
    PowerStateChanged,
    /// `value1`: zero on failure, otherwise the raw rate now in effect;
    /// `value2`: raw latency
    FirmwareStateChanged,
    /// `value1`: raw rate now in effect; `value2`: raw latency
    RateChanged,
}

/// Completion signal carried through the deferred queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalEvent {
    /// Sensor the completion is about
    pub handle: SensorHandle,
    /// Which transition completed
    pub kind: InternalEventKind,
    /// Success flag or raw rate
    pub value1: u32,
    /// Raw latency or auxiliary value
    pub value2: u64,
}

impl InternalEvent {
    /// Sensor is now powered on (`true`) or off (`false`)
    pub const fn power_state_changed(handle: SensorHandle, on: bool) -> Self {
        Self {
            handle,
            kind: InternalEventKind::PowerStateChanged,
            value1: on as u32,
            value2: 0,
        }
    }

    /// Firmware upload finished
    pub const fn firmware_state_changed(handle: SensorHandle, ok: bool) -> Self {
        Self {
            handle,
            kind: InternalEventKind::FirmwareStateChanged,
            value1: ok as u32,
            value2: 0,
        }
    }

    /// Driver is now sampling at `rate` with `latency`
    pub const fn rate_changed(handle: SensorHandle, rate: SensorRate, latency: Option<u64>) -> Self {
        Self {
            handle,
            kind: InternalEventKind::RateChanged,
            value1: rate.to_raw(),
            value2: latency_to_raw(latency),
        }
    }
}

/// Configuration blob copied into a remote call
pub type CfgPayload = heapless::Vec<u8, MAX_CFG_DATA_LEN>;

/// Operation forwarded to a sensor implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorCommand {
    /// Power the sensor on or off
    Power {
        /// Target power state
        on: bool,
    },
    /// Upload firmware after power-on
    FirmwareUpload,
    /// Change sampling rate and batching latency
    SetRate {
        /// Target rate
        rate: SensorRate,
        /// Target latency, `None` if no client constrains it
        latency: Option<u64>,
    },
    /// Deliver any batched samples now
    Flush,
    /// Produce one on-demand sample
    TriggerOndemand,
    /// Run the sensor's calibration routine
    Calibrate,
    /// Apply a configuration blob
    CfgData(CfgPayload),
    /// Push the last cached value to one client
    SendOneDirectEvt {
        /// Client that should receive it
        requester: TaskId,
    },
}

/// Remote call addressed to the task owning a sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEvent {
    /// Owning task
    pub to: TaskId,
    /// Sensor the call is for
    pub handle: SensorHandle,
    /// Callback data registered with the sensor
    pub cookie: usize,
    /// Operation to perform
    pub command: SensorCommand,
}

enum Pending {
    Completion(InternalEvent),
    Call(AppEvent),
}

/// Bounded store of in-flight completions and remote calls
pub struct EventBus {
    slab: SlabPool<Pending, MAX_INTERNAL_EVENTS>,
    deferred: Deque<SlotIndex, MAX_INTERNAL_EVENTS>,
    outbox: Deque<SlotIndex, MAX_INTERNAL_EVENTS>,
}

impl EventBus {
    /// Empty bus
    pub fn new() -> Self {
        Self {
            slab: SlabPool::new(),
            deferred: Deque::new(),
            outbox: Deque::new(),
        }
    }

    /// Queue a completion for deferred processing
    pub fn signal(&mut self, evt: InternalEvent) -> HubResult<()> {
        let idx = self
            .slab
            .alloc(Pending::Completion(evt))
            .map_err(|_| HubError::EventSlabFull)?;
        if self.deferred.push_back(idx).is_err() {
            self.slab.free(idx);
            return Err(HubError::EventSlabFull);
        }
        Ok(())
    }

    /// Queue a remote call for its owning task
    pub fn post(&mut self, evt: AppEvent) -> HubResult<()> {
        let idx = self
            .slab
            .alloc(Pending::Call(evt))
            .map_err(|_| HubError::EventSlabFull)?;
        if self.outbox.push_back(idx).is_err() {
            self.slab.free(idx);
            return Err(HubError::EventSlabFull);
        }
        Ok(())
    }

    /// Take the oldest queued completion
    pub fn next_completion(&mut self) -> Option<InternalEvent> {
        while let Some(idx) = self.deferred.pop_front() {
            if let Some(Pending::Completion(evt)) = self.slab.free(idx) {
                return Some(evt);
            }
            debug_assert!(false, "deferred queue held a non-completion slot");
        }
        None
    }

    /// Take the oldest queued remote call
    pub fn next_app_event(&mut self) -> Option<AppEvent> {
        while let Some(idx) = self.outbox.pop_front() {
            if let Some(Pending::Call(evt)) = self.slab.free(idx) {
                return Some(evt);
            }
            debug_assert!(false, "outbox held a non-call slot");
        }
        None
    }

    /// Completions waiting for `run_deferred`
    pub fn pending_completions(&self) -> usize {
        self.deferred.len()
    }

    /// Remote calls waiting for delivery
    pub fn pending_app_events(&self) -> usize {
        self.outbox.len()
    }

    /// Slots currently in use
    pub fn in_use(&self) -> usize {
        self.slab.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> SensorHandle {
        SensorHandle::from_raw(0x0001_0001).unwrap()
    }

    #[test]
    fn completions_come_out_in_order() {
        let mut bus = EventBus::new();
        bus.signal(InternalEvent::power_state_changed(handle(), true)).unwrap();
        bus.signal(InternalEvent::firmware_state_changed(handle(), true)).unwrap();

        assert_eq!(bus.next_completion().unwrap().kind, InternalEventKind::PowerStateChanged);
        assert_eq!(bus.next_completion().unwrap().kind, InternalEventKind::FirmwareStateChanged);
        assert!(bus.next_completion().is_none());
        assert_eq!(bus.in_use(), 0);
    }

    #[test]
    fn calls_and_completions_share_the_slab() {
        let mut bus = EventBus::new();
        for _ in 0..MAX_INTERNAL_EVENTS - 1 {
            bus.signal(InternalEvent::power_state_changed(handle(), false)).unwrap();
        }
        bus.post(AppEvent {
            to: 1,
            handle: handle(),
            cookie: 0,
            command: SensorCommand::Flush,
        })
        .unwrap();

        let overflow = bus.signal(InternalEvent::power_state_changed(handle(), false));
        assert_eq!(overflow, Err(HubError::EventSlabFull));

        // Consuming a call frees room for a completion
        assert_eq!(bus.next_app_event().unwrap().command, SensorCommand::Flush);
        assert!(bus.signal(InternalEvent::power_state_changed(handle(), true)).is_ok());
    }

    #[test]
    fn rate_changed_encodes_latency() {
        let evt = InternalEvent::rate_changed(handle(), SensorRate::OnChange, None);
        assert_eq!(evt.value2, SENSOR_LATENCY_INVALID);
        assert_eq!(SensorRate::from_raw(evt.value1), SensorRate::OnChange);
        assert_eq!(latency_from_raw(evt.value2), None);
    }
}
