// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::RegionSet;
use crate::bus::{Mmu, Region};
use crate::{ClockDomain, SimResult};
use std::sync::{Arc, Mutex, MutexGuard};

pub const BLKCON0: u32 = 0xF028;

#[derive(Debug, Default)]
struct BlockState {
    value: u8,
    changed: bool,
}

/// Shared view of BLKCON0 for the machine, which owns the peripherals the
/// block bits gate.
#[derive(Debug, Clone, Default)]
pub struct BlockHandle(Arc<Mutex<BlockState>>);

impl BlockHandle {
    fn lock(&self) -> MutexGuard<'_, BlockState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn value(&self) -> u8 {
        self.lock().value
    }

    /// The register value if it was written since the last call.
    pub fn take_changed(&self) -> Option<u8> {
        let mut st = self.lock();
        std::mem::take(&mut st.changed).then_some(st.value)
    }
}

/// BLKCON0: one bit per gateable peripheral, set to power the block down.
#[derive(Debug)]
pub struct BlockControl {
    mask: u8,
    handle: BlockHandle,
    regions: RegionSet,
}

impl BlockControl {
    pub fn new(mask: u8) -> Self {
        Self {
            mask,
            handle: BlockHandle::default(),
            regions: RegionSet::default(),
        }
    }

    pub fn handle(&self) -> BlockHandle {
        self.handle.clone()
    }
}

impl crate::Peripheral for BlockControl {
    fn name(&self) -> &str {
        "BlockControl"
    }

    fn attach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        let rd = self.handle.clone();
        let wr = self.handle.clone();
        let mask = self.mask;
        self.regions.register(
            mmu,
            Region::new(BLKCON0, 1, "BlockControl/BLKCON0")
                .on_read(move |_| rd.value())
                .on_write(move |_, value| {
                    let mut st = wr.lock();
                    st.value = value & mask;
                    st.changed = true;
                }),
        )
    }

    fn detach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        self.regions.release(mmu)
    }

    fn reset(&mut self) {
        let mut st = self.handle.lock();
        st.value = 0;
        st.changed = false;
    }

    fn clock(&self) -> ClockDomain {
        ClockDomain::Always
    }
}
