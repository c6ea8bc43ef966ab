// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::RegionSet;
use crate::bus::{Mmu, Region};
use crate::{ClockDomain, SimResult};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

pub const DSR_SFR: u32 = 0xF000;
pub const SEGMENT_ACCESS_SFR: u32 = 0xF004;

/// The DSR SFR and, on CLASSWIZ, the data segment access switch.
#[derive(Debug)]
pub struct Misc {
    latched_dsr: Arc<AtomicU8>,
    dsr_mask: u8,
    segment_access_sfr: bool,
    regions: RegionSet,
}

impl Misc {
    pub fn new(latched_dsr: Arc<AtomicU8>, dsr_mask: u8, segment_access_sfr: bool) -> Self {
        Self {
            latched_dsr,
            dsr_mask,
            segment_access_sfr,
            regions: RegionSet::default(),
        }
    }
}

impl crate::Peripheral for Misc {
    fn name(&self) -> &str {
        "Misc"
    }

    fn attach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        let rd = self.latched_dsr.clone();
        let wr = self.latched_dsr.clone();
        let mask = self.dsr_mask;
        self.regions.register(
            mmu,
            Region::new(DSR_SFR, 1, "Misc/DSR")
                .on_read(move |_| rd.load(Ordering::Relaxed))
                .on_write(move |_, value| wr.store(value & mask, Ordering::Relaxed)),
        )?;

        if self.segment_access_sfr {
            let rd = mmu.flags();
            let wr = mmu.flags();
            self.regions.register(
                mmu,
                Region::new(SEGMENT_ACCESS_SFR, 1, "Misc/DataSegAccess")
                    .on_read(move |_| rd.segment_access() as u8)
                    .on_write(move |_, value| wr.set_segment_access(value & 1 != 0)),
            )?;
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
