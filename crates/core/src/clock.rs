// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Default pacing interval of the runner thread.
pub const TIMER_INTERVAL_MS: u64 = 20;

/// Wall-clock to chip-tick conversion.
///
/// Each `delta` call advances time by one timer interval and returns the
/// ticks owed for it. The running total is recomputed from elapsed time, so
/// fractional ticks are carried forward instead of dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycles {
    pub cycles_per_second: u64,
    pub timer_interval_ms: u64,
    ticks_now: u64,
    cycles_emulated: u64,
}

impl Cycles {
    pub fn new(cycles_per_second: u64, timer_interval_ms: u64) -> Self {
        Self {
            cycles_per_second,
            timer_interval_ms,
            ticks_now: 0,
            cycles_emulated: 0,
        }
    }

    pub fn reset(&mut self) {
        self.ticks_now = 0;
        self.cycles_emulated = 0;
    }

    pub fn delta(&mut self) -> u64 {
        self.ticks_now += self.timer_interval_ms;
        let target = self.ticks_now * self.cycles_per_second / 1000;
        let diff = target - self.cycles_emulated;
        self.cycles_emulated = target;
        diff
    }

    pub fn cycles_emulated(&self) -> u64 {
        self.cycles_emulated
    }

    /// Scale the nominal rate; restarts the accounting.
    pub fn set_clock_speed(&mut self, nominal_cps: u64, factor: f64) {
        self.cycles_per_second = (nominal_cps as f64 * factor).max(0.0) as u64;
        self.reset();
    }
}
