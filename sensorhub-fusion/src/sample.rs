//! Batched three-axis samples
//!
//! Raw drivers and the fusion outputs use the same batch layout: a reference
//! time for the first sample, then per-sample deltas from the previous one.
//!
//! ```text
//! reference_time = 1_000_000
//! ┌──────────┬──────────┬──────────┐
//! │ dt=0     │ dt=20ms  │ dt=20ms  │
//! │ x, y, z  │ x, y, z  │ x, y, z  │
//! └──────────┴──────────┴──────────┘
//!   t=1.00ms   t=21.0ms   t=41.0ms
//! ```

use heapless::Vec;
use sensorhub_core::sensor::EVENT_TYPE_BIT_DISCARDABLE;
use sensorhub_core::{SensorHandle, SensorType, Timestamp};

use crate::constants::MAX_NUM_COMMS_EVENT_SAMPLES;
use crate::math::Vec3;

/// One sample in a batch
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TripleAxisSample {
    /// Nanoseconds since the previous sample in the batch (zero for the first)
    pub delta_time: u32,
    /// Reading
    pub v: Vec3,
}

/// Bounded batch of samples sharing one reference time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TripleAxisBatch {
    /// Time of the first sample
    pub reference_time: Timestamp,
    /// Samples in time order
    pub samples: Vec<TripleAxisSample, MAX_NUM_COMMS_EVENT_SAMPLES>,
}

impl TripleAxisBatch {
    /// Empty batch starting at `reference_time`
    pub fn new(reference_time: Timestamp) -> Self {
        Self {
            reference_time,
            samples: Vec::new(),
        }
    }

    /// Build a batch from absolute sample times
    ///
    /// Returns `None` if there are too many samples, the times are not
    /// ordered, or a gap does not fit the 32-bit delta.
    pub fn from_timed(points: &[(Timestamp, Vec3)]) -> Option<Self> {
        let (first, _) = *points.first()?;
        let mut batch = Self::new(first);
        let mut prev = first;
        for &(time, v) in points {
            let delta_time = u32::try_from(time.checked_sub(prev)?).ok()?;
            batch.samples.push(TripleAxisSample { delta_time, v }).ok()?;
            prev = time;
        }
        Some(batch)
    }

    /// Absolute time of every sample
    ///
    /// The first sample sits at the reference time whatever its delta says.
    pub fn timed(&self) -> impl Iterator<Item = (Timestamp, Vec3)> + '_ {
        self.samples.iter().enumerate().scan(self.reference_time, |time, (i, sample)| {
            if i > 0 {
                *time += sample.delta_time as u64;
            }
            Some((*time, sample.v))
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True without samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True once no more samples fit
    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }
}

/// Batch of derived samples ready for broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEvent {
    /// Derived sensor that produced the batch
    pub handle: SensorHandle,
    /// Its type, which selects the broadcast event number
    pub sensor_type: SensorType,
    /// May be dropped by the platform under memory pressure
    pub discardable: bool,
    /// The samples
    pub batch: TripleAxisBatch,
}

impl SensorEvent {
    /// Event number to broadcast under, including the discardable bit
    pub fn evt_type(&self) -> u32 {
        let evt = self.sensor_type.event_type();
        if self.discardable {
            evt | EVENT_TYPE_BIT_DISCARDABLE
        } else {
            evt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_round_trip() {
        let points = [
            (1_000, Vec3::new(1.0, 0.0, 0.0)),
            (21_000, Vec3::new(2.0, 0.0, 0.0)),
            (41_000, Vec3::new(3.0, 0.0, 0.0)),
        ];
        let batch = TripleAxisBatch::from_timed(&points).unwrap();
        assert_eq!(batch.reference_time, 1_000);
        assert_eq!(batch.samples[0].delta_time, 0);
        assert_eq!(batch.samples[2].delta_time, 20_000);

        let times: std::vec::Vec<_> = batch.timed().map(|(t, _)| t).collect();
        assert_eq!(times, [1_000, 21_000, 41_000]);
    }

    #[test]
    fn out_of_order_rejected() {
        let points = [(50, Vec3::ZERO), (40, Vec3::ZERO)];
        assert!(TripleAxisBatch::from_timed(&points).is_none());
    }

    #[test]
    fn discardable_sets_top_bit() {
        let event = SensorEvent {
            handle: SensorHandle::from_raw(1).unwrap(),
            sensor_type: SensorType::Gravity,
            discardable: true,
            batch: TripleAxisBatch::new(0),
        };
        assert_eq!(event.evt_type(), 0x8000_0000 | (0x200 + 17));
    }
}
