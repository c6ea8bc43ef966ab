// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod blkcon;
pub mod clock_generator;
pub mod interrupt_sfr;
pub mod misc;
pub mod ram;
pub mod rom_window;
pub mod standby;

use crate::bus::{Mmu, Region, RegionId};
use crate::SimResult;

/// MMU regions a peripheral holds while attached.
#[derive(Debug, Default)]
pub struct RegionSet {
    ids: Vec<RegionId>,
}

impl RegionSet {
    pub fn register(&mut self, mmu: &mut Mmu, region: Region) -> SimResult<()> {
        let id = mmu.register_region(region)?;
        self.ids.push(id);
        Ok(())
    }

    /// Release every region, newest first.
    pub fn release(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        while let Some(id) = self.ids.pop() {
            mmu.unregister_region(id)?;
        }
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        !self.ids.is_empty()
    }
}
