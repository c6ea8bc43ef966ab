// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::RegionSet;
use crate::bus::{Mmu, Region};
use crate::{ClockDomain, SimResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const STPACP: u32 = 0xF008;
pub const SBYCON: u32 = 0xF009;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    Run,
    /// CPU stopped, clocks running.
    Halt,
    /// CPU and high-speed clock stopped.
    Stop,
}

impl RunMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunMode::Halt,
            2 => RunMode::Stop,
            _ => RunMode::Run,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunMode::Run => 0,
            RunMode::Halt => 1,
            RunMode::Stop => 2,
        }
    }
}

/// Run mode shared between the machine and the standby SFRs.
#[derive(Debug, Clone, Default)]
pub struct RunState(Arc<AtomicU8>);

impl RunState {
    pub fn get(&self) -> RunMode {
        RunMode::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, mode: RunMode) {
        self.0.store(mode.as_u8(), Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.get() == RunMode::Run
    }
}

#[derive(Debug, Default)]
struct Unlock {
    /// 0x5x seen on STPACP.
    armed: AtomicBool,
    /// 0x5x then 0xAx seen: the next SBYCON stop request is honoured.
    open: AtomicBool,
}

/// STPACP/SBYCON standby control.
#[derive(Debug)]
pub struct StandbyControl {
    run: RunState,
    unlock: Arc<Unlock>,
    regions: RegionSet,
}

impl StandbyControl {
    pub fn new(run: RunState) -> Self {
        Self {
            run,
            unlock: Arc::new(Unlock::default()),
            regions: RegionSet::default(),
        }
    }
}

impl crate::Peripheral for StandbyControl {
    fn name(&self) -> &str {
        "StandbyControl"
    }

    fn attach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        let unlock = self.unlock.clone();
        self.regions.register(
            mmu,
            Region::new(STPACP, 1, "StandbyControl/STPACP")
                .on_read(|_| 0)
                .on_write(move |_, value| match value & 0xF0 {
                    0x50 => unlock.armed.store(true, Ordering::Relaxed),
                    0xA0 if unlock.armed.swap(false, Ordering::Relaxed) => {
                        unlock.open.store(true, Ordering::Relaxed)
                    }
                    _ => unlock.armed.store(false, Ordering::Relaxed),
                }),
        )?;

        let unlock = self.unlock.clone();
        let run = self.run.clone();
        self.regions.register(
            mmu,
            Region::new(SBYCON, 1, "StandbyControl/SBYCON")
                .on_read(|_| 0)
                .on_write(move |_, value| {
                    if value & 0x02 != 0 {
                        if unlock.open.swap(false, Ordering::Relaxed) {
                            debug!("STANDBY: stop");
                            run.set(RunMode::Stop);
                        }
                    } else if value & 0x01 != 0 {
                        debug!("STANDBY: halt");
                        run.set(RunMode::Halt);
                    }
                }),
        )?;
        Ok(())
    }

    fn detach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        self.regions.release(mmu)
    }

    fn reset(&mut self) {
        self.unlock.armed.store(false, Ordering::Relaxed);
        self.unlock.open.store(false, Ordering::Relaxed);
    }

    fn clock(&self) -> ClockDomain {
        ClockDomain::Always
    }
}
