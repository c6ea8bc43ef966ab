// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! FCON clock generator and the low-speed time base counter.

use super::RegionSet;
use crate::bus::{Mmu, Region};
use crate::family::{FamilyConfig, HardwareFamily};
use crate::{ClockDomain, SimResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Nominal low-speed oscillator frequency.
pub const LSCLK_HZ: u64 = 16384;

/// Which clocks fired on one chipset tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockTicks {
    pub lsclk: bool,
    pub hsclk: bool,
    pub sysclk: bool,
}

impl ClockTicks {
    pub const ALL: ClockTicks = ClockTicks {
        lsclk: true,
        hsclk: true,
        sysclk: true,
    };

    pub fn fired(&self, domain: ClockDomain) -> bool {
        match domain {
            ClockDomain::Always => true,
            ClockDomain::Lsclk => self.lsclk,
            ClockDomain::Hsclk => self.hsclk,
            ClockDomain::Sysclk => self.sysclk,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ClockState {
    fcon: u8,
    fcon1: u8,
    ltbr: u8,
    divider: u32,
    lsclk_mode: bool,
    hsclk_counter: u32,
    sysclk_counter: u32,
    lsclk_counter: u64,
    /// Set by an LTBR write: the next gate fires LSCLK.
    lsclk_forced: bool,
}

impl ClockState {
    fn reset(&mut self) {
        *self = ClockState {
            divider: 1,
            ..ClockState::default()
        };
    }
}

/// Divider from the OSCLK field: 2^(n-1), 1 for n = 0.
fn divider(osclk: u8) -> u32 {
    1 << osclk.saturating_sub(1)
}

/// Shared view the machine uses to gate peripheral and CPU ticks.
#[derive(Debug, Clone)]
pub struct ClockHandle {
    state: Arc<Mutex<ClockState>>,
    real_hardware: bool,
    lsclk_period: u64,
}

impl ClockHandle {
    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Advance the clock counters by one chipset tick. Emulated hardware
    /// fires every clock on every tick.
    pub fn gate(&self, stopped: bool) -> ClockTicks {
        if !self.real_hardware {
            return ClockTicks::ALL;
        }
        let mut st = self.lock();
        let mut ticks = ClockTicks::default();

        if !stopped {
            st.hsclk_counter += 1;
            if st.hsclk_counter >= st.divider {
                st.hsclk_counter = 0;
                ticks.hsclk = true;
                st.sysclk_counter += 1;
                if st.sysclk_counter >= 2 {
                    st.sysclk_counter = 0;
                    ticks.sysclk = true;
                }
            }
        }

        if st.lsclk_mode {
            st.lsclk_counter += 1;
            if st.lsclk_counter >= self.lsclk_period {
                st.lsclk_counter = 0;
                ticks.lsclk = true;
            }
        }
        if std::mem::take(&mut st.lsclk_forced) {
            ticks.lsclk = true;
        }
        if ticks.lsclk {
            st.ltbr = st.ltbr.wrapping_add(1);
        }
        ticks
    }

    pub fn divider(&self) -> u32 {
        self.lock().divider
    }

    pub fn lsclk_mode(&self) -> bool {
        self.lock().lsclk_mode
    }
}

#[derive(Debug)]
pub struct ClockGenerator {
    ti: bool,
    fcon_address: u32,
    ltbr_address: u32,
    handle: ClockHandle,
    regions: RegionSet,
}

impl ClockGenerator {
    pub fn new(config: &FamilyConfig) -> Self {
        let ti = config.family == HardwareFamily::Ti;
        let mut state = ClockState::default();
        state.reset();
        Self {
            ti,
            fcon_address: config.fcon_address(),
            ltbr_address: if ti { 0xF060 } else { 0xF00C },
            handle: ClockHandle {
                state: Arc::new(Mutex::new(state)),
                real_hardware: config.real_hardware,
                lsclk_period: (config.cycles_per_second / LSCLK_HZ).max(1),
            },
            regions: RegionSet::default(),
        }
    }

    pub fn handle(&self) -> ClockHandle {
        self.handle.clone()
    }
}

impl crate::Peripheral for ClockGenerator {
    fn name(&self) -> &str {
        "ClockGenerator"
    }

    fn attach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        let rd = self.handle.clone();
        let wr = self.handle.clone();
        let ti = self.ti;
        self.regions.register(
            mmu,
            Region::new(self.fcon_address, 1, "ClockGenerator/FCON")
                .on_read(move |_| rd.lock().fcon)
                .on_write(move |_, value| {
                    let mut st = wr.lock();
                    if ti {
                        st.fcon = value & 0x1F;
                        st.divider = divider(value & 0x07);
                    } else {
                        st.fcon = value & 0x73;
                        st.divider = divider((value & 0x70) >> 4);
                        st.lsclk_mode = st.fcon & 0x03 == 1;
                    }
                    st.hsclk_counter = 0;
                }),
        )?;

        if self.ti {
            let rd = self.handle.clone();
            let wr = self.handle.clone();
            self.regions.register(
                mmu,
                Region::new(self.fcon_address + 1, 1, "ClockGenerator/FCON1")
                    .on_read(move |_| rd.lock().fcon1)
                    .on_write(move |_, value| {
                        let mut st = wr.lock();
                        st.fcon1 = value & 0xD7;
                        st.lsclk_mode = st.fcon & 0x01 != 0;
                    }),
            )?;
        }

        let rd = self.handle.clone();
        let wr = self.handle.clone();
        self.regions.register(
            mmu,
            Region::new(self.ltbr_address, 1, "TimerBaseCounter/LTBR")
                .on_read(move |_| rd.lock().ltbr)
                .on_write(move |_, _| {
                    let mut st = wr.lock();
                    st.ltbr = 0;
                    st.lsclk_counter = 0;
                    st.lsclk_forced = true;
                }),
        )?;
        Ok(())
    }

    fn detach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        self.regions.release(mmu)
    }

    fn reset(&mut self) {
        self.handle.lock().reset();
    }

    fn clock(&self) -> ClockDomain {
        ClockDomain::Always
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&*self.handle.lock()).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let state: ClockState = serde_json::from_value(state)
            .map_err(|e| crate::SimulationError::Snapshot(e.to_string()))?;
        *self.handle.lock() = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hooks;
    use crate::{Bus, Peripheral};

    fn attached(family: HardwareFamily, real: bool) -> (Mmu, ClockGenerator) {
        let cfg = FamilyConfig::new(family, real);
        let mut mmu = Mmu::new(&cfg, Arc::from(Vec::new()), Arc::from(Vec::new()), Hooks::new());
        let mut clk = ClockGenerator::new(&cfg);
        clk.attach(&mut mmu).unwrap();
        (mmu, clk)
    }

    fn count_sysclk(handle: &ClockHandle, ticks: usize) -> usize {
        (0..ticks).filter(|_| handle.gate(false).sysclk).count()
    }

    #[test]
    fn test_emulated_fires_every_tick() {
        let (_mmu, clk) = attached(HardwareFamily::Classwiz, false);
        let handle = clk.handle();
        assert_eq!(handle.gate(false), ClockTicks::ALL);
        assert_eq!(handle.gate(true), ClockTicks::ALL);
    }

    #[test]
    fn test_real_sysclk_every_second_hsclk() {
        let (_mmu, clk) = attached(HardwareFamily::ClasswizII, true);
        let handle = clk.handle();
        assert_eq!(count_sysclk(&handle, 100), 50);
    }

    #[test]
    fn test_fcon_divider() {
        let (mut mmu, clk) = attached(HardwareFamily::Classwiz, true);
        let handle = clk.handle();
        // OSCLK = 3 divides HSCLK by 4
        mmu.write_data(0xF00A, 0x30);
        assert_eq!(mmu.read_data(0xF00A), 0x30);
        assert_eq!(handle.divider(), 4);
        assert_eq!(count_sysclk(&handle, 80), 10);

        mmu.write_data(0xF00A, 0xFF);
        assert_eq!(mmu.read_data(0xF00A), 0x73);
        assert!(!handle.lsclk_mode());
        mmu.write_data(0xF00A, 0x01);
        assert!(handle.lsclk_mode());
    }

    #[test]
    fn test_stop_freezes_hsclk() {
        let (_mmu, clk) = attached(HardwareFamily::ClasswizII, true);
        let handle = clk.handle();
        for _ in 0..10 {
            let ticks = handle.gate(true);
            assert!(!ticks.hsclk && !ticks.sysclk);
        }
    }

    #[test]
    fn test_lsclk_period_and_ltbr() {
        let (mut mmu, clk) = attached(HardwareFamily::EsPlus, true);
        let handle = clk.handle();
        mmu.write_data(0xF00A, 0x01);
        // 262144 / 16384 = 16 ticks per LSCLK
        let fired = (0..64).filter(|_| handle.gate(false).lsclk).count();
        assert_eq!(fired, 4);
        assert_eq!(mmu.read_data(0xF00C), 4);

        mmu.write_data(0xF00C, 0);
        assert_eq!(mmu.read_data(0xF00C), 0);
        assert!(handle.gate(false).lsclk);
    }

    #[test]
    fn test_ti_layout() {
        let (mut mmu, clk) = attached(HardwareFamily::Ti, true);
        let handle = clk.handle();
        mmu.write_data(0xF002, 0x03);
        assert_eq!(handle.divider(), 4);
        mmu.write_data(0xF002, 0x01);
        mmu.write_data(0xF003, 0xFF);
        assert_eq!(mmu.read_data(0xF003), 0xD7);
        assert!(handle.lsclk_mode());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (mut mmu, mut clk) = attached(HardwareFamily::Classwiz, true);
        mmu.write_data(0xF00A, 0x31);
        clk.reset();
        assert_eq!(mmu.read_data(0xF00A), 0);
        assert_eq!(clk.handle().divider(), 1);
        assert!(!clk.handle().lsclk_mode());
    }
}
