//! Critical-section hold-time telemetry.
//!
//! Every edit holds the engine lock while the audio thread waits, so hold
//! times are the contention the audio thread sees. Samples go into a fixed
//! ring buffer; recording never allocates.

use std::time::Duration;

use serde::Serialize;

const HOLD_BUFFER_SIZE: usize = 256;

/// Default hold budget in microseconds.
pub const DEFAULT_LOCK_BUDGET_US: u32 = 1000;

/// Summary of recent hold times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockSummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    pub overruns: u64,
    pub acquisitions: u64,
}

pub struct LockTelemetry {
    hold_us: [u32; HOLD_BUFFER_SIZE],
    idx: usize,
    sample_count: usize,
    max_us: u32,
    overruns: u64,
    acquisitions: u64,
    budget_us: u32,
}

impl Default for LockTelemetry {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_BUDGET_US)
    }
}

impl LockTelemetry {
    pub fn new(budget_us: u32) -> Self {
        Self {
            hold_us: [0; HOLD_BUFFER_SIZE],
            idx: 0,
            sample_count: 0,
            max_us: 0,
            overruns: 0,
            acquisitions: 0,
            budget_us,
        }
    }

    pub fn budget_us(&self) -> u32 {
        self.budget_us
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    #[inline]
    pub fn record(&mut self, held: Duration) {
        let us = held.as_micros().min(u32::MAX as u128) as u32;
        self.hold_us[self.idx] = us;
        self.idx = (self.idx + 1) % HOLD_BUFFER_SIZE;
        if self.sample_count < HOLD_BUFFER_SIZE {
            self.sample_count += 1;
        }
        self.max_us = self.max_us.max(us);
        if us > self.budget_us {
            self.overruns += 1;
        }
        self.acquisitions += 1;
    }

    /// Summarize the window and reset the max. Overruns stay cumulative.
    pub fn take_summary(&mut self) -> LockSummary {
        if self.sample_count == 0 {
            return LockSummary::default();
        }
        let samples = &self.hold_us[..self.sample_count];
        let sum: u64 = samples.iter().map(|&x| x as u64).sum();
        let avg_us = (sum / self.sample_count as u64) as u32;

        let mut sorted = self.hold_us;
        sorted[..self.sample_count].sort_unstable();
        let p95_idx = (self.sample_count * 95 / 100).max(1) - 1;
        let p95_us = sorted[p95_idx.min(self.sample_count - 1)];

        let summary = LockSummary {
            avg_us,
            max_us: self.max_us,
            p95_us,
            overruns: self.overruns,
            acquisitions: self.acquisitions,
        };
        self.max_us = 0;
        summary
    }
}
