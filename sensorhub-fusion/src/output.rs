//! Derived sample batching
//!
//! Each derived output fills one batch at a time. A full batch, or any
//! partial batch at the end of a drain, moves to the ready queue where the
//! host picks it up with [`OutputQueue::poll`]. Batches live in a slab shared
//! by all outputs, so a host that stops polling runs the slab dry and new
//! samples are dropped rather than queued without bound.

use core::convert::Infallible;

use heapless::Deque;
use sensorhub_core::slab::SlotIndex;
use sensorhub_core::{SensorHandle, SensorType, SlabPool, Timestamp};

use crate::constants::{MAX_NUM_COMMS_EVENT_SAMPLES, OUTPUT_SLAB_SIZE};
use crate::macros::fusion_error;
use crate::math::Vec3;
use crate::sample::{SensorEvent, TripleAxisBatch, TripleAxisSample};

/// Batch being filled for one derived output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingBatch {
    slot: Option<SlotIndex>,
    prev_time: Timestamp,
}

impl PendingBatch {
    /// True while a batch is being filled
    pub fn is_open(&self) -> bool {
        self.slot.is_some()
    }
}

/// Slab of output batches plus the queue of those ready for delivery
pub struct OutputQueue {
    slab: SlabPool<SensorEvent, OUTPUT_SLAB_SIZE>,
    ready: Deque<SlotIndex, OUTPUT_SLAB_SIZE>,
}

impl OutputQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self {
            slab: SlabPool::new(),
            ready: Deque::new(),
        }
    }

    /// Append one derived sample, opening a batch if needed
    ///
    /// A batch reaching [`MAX_NUM_COMMS_EVENT_SAMPLES`] is queued as
    /// discardable. Returns false if the sample had to be dropped.
    pub fn add_sample(
        &mut self,
        pending: &mut PendingBatch,
        handle: SensorHandle,
        sensor_type: SensorType,
        time: Timestamp,
        v: Vec3,
    ) -> bool {
        let slot = match pending.slot {
            Some(slot) => slot,
            None => {
                let event = SensorEvent {
                    handle,
                    sensor_type,
                    discardable: false,
                    batch: TripleAxisBatch::new(time),
                };
                match self.slab.alloc(event) {
                    Ok(slot) => {
                        pending.slot = Some(slot);
                        pending.prev_time = time;
                        slot
                    }
                    Err(_) => {
                        fusion_error!("output slab exhausted, dropping {:?} sample", sensor_type);
                        return false;
                    }
                }
            }
        };

        let Some(event) = self.slab.get_mut(slot) else {
            pending.slot = None;
            return false;
        };
        let delta_time = u32::try_from(time.saturating_sub(pending.prev_time)).unwrap_or(u32::MAX);
        if event.batch.samples.push(TripleAxisSample { delta_time, v }).is_err() {
            return false;
        }
        pending.prev_time = time;

        if event.batch.len() == MAX_NUM_COMMS_EVENT_SAMPLES {
            event.discardable = true;
            self.enqueue(pending);
        }
        true
    }

    /// Queue whatever the batch holds, if anything
    pub fn flush(&mut self, pending: &mut PendingBatch) {
        self.enqueue(pending);
    }

    /// Queue an empty batch marking the end of a flush
    pub fn push_flush_marker(&mut self, handle: SensorHandle, sensor_type: SensorType) -> bool {
        let marker = SensorEvent {
            handle,
            sensor_type,
            discardable: false,
            batch: TripleAxisBatch::new(0),
        };
        let mut pending = match self.slab.alloc(marker) {
            Ok(slot) => PendingBatch { slot: Some(slot), prev_time: 0 },
            Err(_) => {
                fusion_error!("output slab exhausted, flush of {:?} not reported", sensor_type);
                return false;
            }
        };
        self.enqueue(&mut pending);
        true
    }

    fn enqueue(&mut self, pending: &mut PendingBatch) {
        let Some(slot) = pending.slot.take() else {
            return;
        };
        // The deque is as large as the slab, so every live slot fits
        if self.ready.push_back(slot).is_err() {
            debug_assert!(false, "ready queue smaller than slab");
            self.slab.free(slot);
        }
    }

    /// Take the oldest ready batch
    pub fn poll(&mut self) -> nb::Result<SensorEvent, Infallible> {
        while let Some(slot) = self.ready.pop_front() {
            if let Some(event) = self.slab.free(slot) {
                return Ok(event);
            }
        }
        Err(nb::Error::WouldBlock)
    }

    /// Drop an open batch without delivering it
    pub fn discard(&mut self, pending: &mut PendingBatch) {
        if let Some(slot) = pending.slot.take() {
            self.slab.free(slot);
        }
    }

    /// Batches waiting for delivery
    pub fn ready(&self) -> usize {
        self.ready.len()
    }

    /// Slab slots in use, open batches included
    pub fn in_use(&self) -> usize {
        self.slab.len()
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}
