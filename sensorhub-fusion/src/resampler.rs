//! Fixed-Period Resampling of Irregular Raw Streams
//!
//! ## Overview
//!
//! Raw accelerometer, gyroscope and magnetometer samples arrive in batches
//! with jittery, unrelated timestamps. The attitude filter wants each stream
//! on its own regular grid so the three can be merged in time order. Each
//! [`Resampler`] turns one raw stream into grid points spaced exactly one
//! resample period apart.
//!
//! ## Algorithm
//!
//! A phase counter holds the distance from the current raw sample to the
//! next grid point. For each pair of consecutive raw samples:
//!
//! ```text
//!        curr                         next
//!         ●─────────────────────────────●        raw
//!         │←phase→×←──period──→×        │
//!                  grid points, linearly interpolated
//! ```
//!
//! - While the phase is inside the gap, interpolate one grid point at
//!   `curr + phase` and advance the phase by one period.
//! - Then move on to the next pair, taking the gap off the phase.
//! - A gap of zero (or a clock that went backwards) produces no point.
//! - A gap longer than `discontinuity_factor` periods is a glitch, usually a
//!   configuration change. Nothing is interpolated across it and the phase
//!   restarts at the far side.
//!
//! The last raw sample of a batch is carried over, so a grid point can fall
//! between two batches.
//!
//! ## Buffer
//!
//! Grid points queue in a ring of [`MAX_NUM_SAMPLES`]. When it is full the
//! oldest point is dropped to make room; the margin above two full batches
//! makes this rare.

use sensorhub_core::time::elapsed;
use sensorhub_core::Timestamp;

use crate::constants::MAX_NUM_SAMPLES;
use crate::macros::fusion_debug;
use crate::math::Vec3;
use crate::sample::TripleAxisBatch;

/// One point on the resample grid
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridSample {
    /// Grid time
    pub time: Timestamp,
    /// Interpolated reading
    pub v: Vec3,
}

/// Resampler and grid buffer for one raw stream
#[derive(Debug, Clone)]
pub struct Resampler {
    grid: [GridSample; MAX_NUM_SAMPLES],
    read: usize,
    count: usize,
    phase: u64,
    period_ns: u64,
    discontinuity_factor: u64,
    last: Option<(Timestamp, Vec3)>,
}

impl Resampler {
    /// Empty resampler with a grid of `period_ns`
    pub fn new(period_ns: u64, discontinuity_factor: u32) -> Self {
        Self {
            grid: [GridSample::default(); MAX_NUM_SAMPLES],
            read: 0,
            count: 0,
            phase: 0,
            period_ns,
            discontinuity_factor: discontinuity_factor as u64,
            last: None,
        }
    }

    /// Grid spacing (ns)
    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    /// Change the grid spacing; points already queued keep their times
    pub fn set_period(&mut self, period_ns: u64) {
        self.period_ns = period_ns;
    }

    /// Forget the stream: queued points, phase and carried sample
    pub fn reset(&mut self) {
        self.read = 0;
        self.count = 0;
        self.phase = 0;
        self.last = None;
    }

    /// Resample a raw batch onto the grid, returning how many points it added
    pub fn fill(&mut self, batch: &TripleAxisBatch) -> usize {
        if self.period_ns == 0 {
            return 0;
        }

        let mut raw = batch.timed();
        let (mut curr_time, mut curr) = match self.last {
            Some(last) => last,
            None => match raw.next() {
                Some(first) => first,
                None => return 0,
            },
        };

        let limit = self.period_ns.saturating_mul(self.discontinuity_factor);
        let mut phase = self.phase;
        let mut written = 0;

        for (next_time, next) in raw {
            let spacing = elapsed(curr_time, next_time);
            if spacing > limit {
                fusion_debug!("raw gap of {}ns skipped (limit {}ns)", spacing, limit);
                phase = 0;
            } else {
                while phase < spacing {
                    let weight = phase as f32 / spacing as f32;
                    self.push(GridSample {
                        time: curr_time + phase,
                        v: curr.lerp(next, weight),
                    });
                    written += 1;
                    phase += self.period_ns;
                }
                phase -= spacing;
            }
            curr_time = next_time;
            curr = next;
        }

        self.phase = phase;
        self.last = Some((curr_time, curr));
        written
    }

    fn push(&mut self, sample: GridSample) {
        let write = (self.read + self.count) % MAX_NUM_SAMPLES;
        self.grid[write] = sample;
        if self.count == MAX_NUM_SAMPLES {
            self.read = (self.read + 1) % MAX_NUM_SAMPLES;
        } else {
            self.count += 1;
        }
    }

    /// Oldest queued grid point
    pub fn peek(&self) -> Option<&GridSample> {
        if self.count == 0 {
            None
        } else {
            Some(&self.grid[self.read])
        }
    }

    /// Take the oldest queued grid point
    pub fn pop(&mut self) -> Option<GridSample> {
        if self.count == 0 {
            return None;
        }
        let sample = self.grid[self.read];
        self.read = (self.read + 1) % MAX_NUM_SAMPLES;
        self.count -= 1;
        Some(sample)
    }

    /// Queued grid points
    pub fn len(&self) -> usize {
        self.count
    }

    /// True with nothing queued
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
