// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::RegionSet;
use crate::bus::{Mmu, Region};
use crate::interrupt::InterruptController;
use crate::{ClockDomain, SimResult};
use std::sync::Arc;

pub const INTERRUPT_SFR_BASE: u32 = 0xF010;

/// Interrupt enable (mask) and request (pending) SFRs.
#[derive(Debug)]
pub struct InterruptSfr {
    controller: Arc<InterruptController>,
    regions: RegionSet,
}

impl InterruptSfr {
    pub fn new(controller: Arc<InterruptController>) -> Self {
        Self {
            controller,
            regions: RegionSet::default(),
        }
    }
}

impl crate::Peripheral for InterruptSfr {
    fn name(&self) -> &str {
        "InterruptSfr"
    }

    fn attach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        let width = self.controller.sfr_width();
        let rd = self.controller.clone();
        let wr = self.controller.clone();
        self.regions.register(
            mmu,
            Region::new(INTERRUPT_SFR_BASE, width, "InterruptSfr/IE")
                .on_read(move |off| rd.read_sfr(off))
                .on_write(move |off, value| wr.write_sfr(off, value)),
        )?;

        let rd = self.controller.clone();
        let wr = self.controller.clone();
        self.regions.register(
            mmu,
            Region::new(INTERRUPT_SFR_BASE + width, width, "InterruptSfr/IRQ")
                .on_read(move |off| rd.read_sfr(width + off))
                .on_write(move |off, value| wr.write_sfr(width + off, value)),
        )
    }

    fn detach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        self.regions.release(mmu)
    }

    fn reset(&mut self) {
        self.controller.reset_sfr();
    }

    fn clock(&self) -> ClockDomain {
        ClockDomain::Always
    }
}
