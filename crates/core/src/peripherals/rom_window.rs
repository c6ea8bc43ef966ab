// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::RegionSet;
use crate::bus::{Mmu, Region};
use crate::family::RomMapping;
use crate::{ClockDomain, SimResult};
use tracing::{debug, warn};

/// Data-side views of the ROM image.
#[derive(Debug)]
pub struct RomWindow {
    windows: Vec<RomMapping>,
    strict: bool,
    regions: RegionSet,
}

impl RomWindow {
    pub fn new(windows: Vec<RomMapping>, strict: bool) -> Self {
        Self {
            windows,
            strict,
            regions: RegionSet::default(),
        }
    }

    pub fn windows(&self) -> &[RomMapping] {
        &self.windows
    }
}

impl crate::Peripheral for RomWindow {
    fn name(&self) -> &str {
        "RomWindow"
    }

    fn attach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        for window in &self.windows {
            let rom = mmu.rom().clone();
            let rom_offset = window.rom_offset as usize;
            let base = window.base;
            let strict = self.strict;
            let region = Region::new(window.base, window.size, format!("RomWindow/{:#07x}", base))
                .on_read(move |offset| rom.get(rom_offset + offset as usize).copied().unwrap_or(0))
                .on_write(move |offset, value| {
                    if strict {
                        warn!("ROM write {:#07x} <- {:#04x}", base + offset, value);
                    } else {
                        debug!("ROM write {:#07x} <- {:#04x}", base + offset, value);
                    }
                });
            self.regions.register(mmu, region)?;
        }
        Ok(())
    }

    fn detach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        self.regions.release(mmu)
    }

    fn clock(&self) -> ClockDomain {
        ClockDomain::Always
    }
}
