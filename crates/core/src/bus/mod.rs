// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod region;

pub use region::{Region, RegionId, RegionInfo};

use crate::family::{FamilyConfig, HardwareFamily};
use crate::hooks::Hooks;
use crate::memory::le_word;
use crate::{Bus, SimResult, SimulationError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const SEGMENT_COUNT: usize = 0x100;
const SEGMENT_SIZE: usize = 0x10000;

/// Code-fetch switches that SFR regions flip at runtime.
#[derive(Debug, Default)]
pub struct MmuFlags {
    remap: AtomicBool,
    segment_access: AtomicBool,
}

impl MmuFlags {
    pub fn remap(&self) -> bool {
        self.remap.load(Ordering::Relaxed)
    }

    pub fn set_remap(&self, on: bool) {
        self.remap.store(on, Ordering::Relaxed);
    }

    /// CLASSWIZ data segment 5 aliasing onto code segment 0.
    pub fn segment_access(&self) -> bool {
        self.segment_access.load(Ordering::Relaxed)
    }

    pub fn set_segment_access(&self, on: bool) {
        self.segment_access.store(on, Ordering::Relaxed);
    }
}

/// Where a CLASSWIZ_II real-hardware data read actually lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RealOffset {
    Mapped(u32),
    /// Reads 0 and corrupts the DSR.
    DsrFault,
    Zero,
    Ones,
}

fn real_offset(addr: u32) -> RealOffset {
    let segment = addr >> 16;
    if segment < 0x10 {
        return RealOffset::Mapped(addr);
    }
    if segment == 0xF0 || segment == 0x98 {
        return RealOffset::DsrFault;
    }
    if (segment & 0x07) > 5 {
        if addr & 0x02 != 0 || addr & 0xFF == 0 {
            return RealOffset::Zero;
        }
        return RealOffset::Ones;
    }
    RealOffset::Mapped(addr & 0x0F_FFFF)
}

/// Segmented 24-bit address space with per-byte region dispatch.
pub struct Mmu {
    family: HardwareFamily,
    real_hardware: bool,
    /// Per segment, per byte: region slot + 1, 0 when unbound.
    segments: Vec<Option<Box<[u32]>>>,
    regions: Vec<Option<Region>>,
    rom: Arc<[u8]>,
    flash: Arc<[u8]>,
    flags: Arc<MmuFlags>,
    hooks: Hooks,
    dsr_fault: Option<u8>,
}

impl std::fmt::Debug for Mmu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mmu")
            .field("family", &self.family)
            .field("real_hardware", &self.real_hardware)
            .field("regions", &self.regions.iter().flatten().count())
            .field("rom_len", &self.rom.len())
            .finish()
    }
}

impl Mmu {
    pub fn new(config: &FamilyConfig, rom: Arc<[u8]>, flash: Arc<[u8]>, hooks: Hooks) -> Self {
        let mut mmu = Self {
            family: config.family,
            real_hardware: config.real_hardware,
            segments: (0..SEGMENT_COUNT).map(|_| None).collect(),
            regions: Vec::new(),
            rom,
            flash,
            flags: Arc::new(MmuFlags::default()),
            hooks,
            dsr_fault: None,
        };
        mmu.flags.set_remap(config.remap);
        for &segment in &config.segments {
            mmu.generate_segment(segment);
        }
        mmu
    }

    /// Allocate the dispatch table for a segment. Idempotent.
    pub fn generate_segment(&mut self, segment: u8) {
        let slot = &mut self.segments[segment as usize];
        if slot.is_none() {
            *slot = Some(vec![0u32; SEGMENT_SIZE].into_boxed_slice());
        }
    }

    pub fn has_segment(&self, segment: u8) -> bool {
        self.segments[segment as usize].is_some()
    }

    pub fn family(&self) -> HardwareFamily {
        self.family
    }

    pub fn flags(&self) -> Arc<MmuFlags> {
        self.flags.clone()
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn rom(&self) -> &Arc<[u8]> {
        &self.rom
    }

    pub fn flash(&self) -> &Arc<[u8]> {
        &self.flash
    }

    fn slot(&self, addr: u32) -> Option<u32> {
        let segment = self.segments.get((addr >> 16) as usize)?.as_ref()?;
        Some(segment[(addr & 0xFFFF) as usize])
    }

    /// Bind every byte of `region`. Nothing is marked when any byte is
    /// already bound or lies in a segment without a dispatch table.
    pub fn register_region(&mut self, region: Region) -> SimResult<RegionId> {
        for addr in region.base..region.end() {
            match self.slot(addr) {
                None => return Err(SimulationError::SegmentMissing((addr >> 16) as u8)),
                Some(0) => {}
                Some(_) => return Err(SimulationError::RegionOverlap(addr)),
            }
        }

        let index = match self.regions.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.regions.push(None);
                self.regions.len() - 1
            }
        };
        let tag = index as u32 + 1;
        for addr in region.base..region.end() {
            if let Some(segment) = self.segments[(addr >> 16) as usize].as_mut() {
                segment[(addr & 0xFFFF) as usize] = tag;
            }
        }
        debug!(
            "MMU: registered {} at {:#07x}+{:#x}",
            region.description, region.base, region.size
        );
        self.regions[index] = Some(region);
        Ok(RegionId(index))
    }

    /// Release a region ("kill"). Every byte it covers must still be bound to it.
    pub fn unregister_region(&mut self, id: RegionId) -> SimResult<Region> {
        let (base, end) = match self.regions.get(id.0).and_then(Option::as_ref) {
            Some(region) => (region.base, region.end()),
            None => return Err(SimulationError::RegionHole(0)),
        };
        let tag = id.0 as u32 + 1;
        for addr in base..end {
            if self.slot(addr) != Some(tag) {
                return Err(SimulationError::RegionHole(addr));
            }
        }
        for addr in base..end {
            if let Some(segment) = self.segments[(addr >> 16) as usize].as_mut() {
                segment[(addr & 0xFFFF) as usize] = 0;
            }
        }
        self.regions[id.0]
            .take()
            .ok_or(SimulationError::RegionHole(base))
    }

    pub fn regions(&self) -> Vec<RegionInfo> {
        let mut list: Vec<_> = self.regions.iter().flatten().map(Region::info).collect();
        list.sort_by_key(|r| r.base);
        list
    }

    fn rom_word(&self, addr: u32) -> u16 {
        le_word(&self.rom, addr as usize)
    }

    /// Code fetch. Never has side effects.
    pub fn fetch(&self, addr: u32) -> u16 {
        let addr = addr & 0xF_FFFE;
        let mut segment = addr >> 16;
        let offset = addr & 0xFFFF;

        match self.family {
            HardwareFamily::EsPlus => self.rom_word(addr),
            HardwareFamily::Classwiz | HardwareFamily::Ti => {
                if self.flags.segment_access() && segment == 5 {
                    segment = 0;
                }
                if segment < 4 {
                    self.remapped_word(segment, offset)
                } else {
                    0
                }
            }
            HardwareFamily::ClasswizII => {
                if segment == 8 {
                    return self.rom_word(addr & 0x7_FFFF);
                }
                segment &= 7;
                match segment {
                    7 if offset >= 0x2000 => 0xFFFF,
                    7 => self.rom_word(0x5_E000 + offset),
                    6 => 0xFFFF,
                    5 if offset >= 0xE000 => 0xFFFF,
                    _ => self.remapped_word(segment, offset),
                }
            }
            HardwareFamily::Fx5800p => {
                if segment < 2 {
                    self.rom_word(addr)
                } else if segment >= 8 {
                    le_word(&self.flash, (addr & 0x7_FFFF) as usize)
                } else {
                    0xFFFF
                }
            }
            HardwareFamily::SolarII => 0,
        }
    }

    /// With remap on, the first 0x200 bytes of segment 0 fetch from the top
    /// of the segment; with it off, that top window reads as erased.
    fn remapped_word(&self, segment: u32, offset: u32) -> u16 {
        let addr = segment << 16 | offset;
        if self.flags.remap() {
            if segment == 0 && offset < 0x200 {
                return self.rom_word(addr + 0xFE00);
            }
            self.rom_word(addr)
        } else if segment == 0 && offset >= 0xFE00 {
            0xFFFF
        } else {
            self.rom_word(addr)
        }
    }

    fn dispatch_read(&mut self, addr: u32, software: bool) -> u8 {
        let mut addr = addr & 0xFF_FFFF;
        if self.family == HardwareFamily::ClasswizII && self.real_hardware {
            match real_offset(addr) {
                RealOffset::Mapped(real) => addr = real,
                RealOffset::DsrFault => {
                    if software {
                        self.dsr_fault = Some((addr >> 16) as u8);
                    }
                    return 0;
                }
                RealOffset::Zero => return 0,
                RealOffset::Ones => return 0xFF,
            }
        }
        if self.family == HardwareFamily::Fx5800p && addr == 0x10_0000 {
            return 0xFF;
        }

        let Some(tag) = self.slot(addr).filter(|&t| t != 0) else {
            return 0;
        };
        let Some(region) = self.regions[(tag - 1) as usize].as_mut() else {
            return 0;
        };
        let base = region.base;
        match region.read.as_mut() {
            Some(read) => read(addr - base),
            None => 0,
        }
    }

    fn dispatch_write(&mut self, addr: u32, value: u8) {
        let addr = addr & 0xFF_FFFF;
        let region = match self.slot(addr).filter(|&t| t != 0) {
            Some(tag) => self.regions[(tag - 1) as usize].as_mut(),
            None => None,
        };
        let Some(region) = region else {
            warn!("MMU: unmapped write {:#08x} <- {:#04x}", addr, value);
            return;
        };
        let base = region.base;
        if let Some(write) = region.write.as_mut() {
            write(addr - base, value);
        }
    }

    /// Debugger read that bypasses memory hooks and sentinel side effects.
    pub fn peek(&mut self, addr: u32) -> u8 {
        self.dispatch_read(addr, false)
    }

    /// Debugger write that bypasses memory hooks.
    pub fn poke(&mut self, addr: u32, value: u8) {
        self.dispatch_write(addr, value);
    }
}

impl Bus for Mmu {
    fn read_code(&self, addr: u32) -> u16 {
        self.fetch(addr)
    }

    fn read_data(&mut self, addr: u32) -> u8 {
        if let Some(value) = self.hooks.memory_read(addr) {
            return value;
        }
        self.dispatch_read(addr, true)
    }

    fn write_data(&mut self, addr: u32, value: u8) {
        if self.hooks.memory_write(addr, value) {
            return;
        }
        self.dispatch_write(addr, value);
    }

    fn peek_data(&mut self, addr: u32) -> u8 {
        self.peek(addr)
    }

    fn take_dsr_fault(&mut self) -> Option<u8> {
        self.dsr_fault.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::FamilyConfig;
    use std::sync::Mutex;

    fn mmu(family: HardwareFamily, real: bool, rom: Vec<u8>) -> Mmu {
        let cfg = FamilyConfig::new(family, real);
        Mmu::new(&cfg, rom.into(), Arc::from(Vec::new()), Hooks::new())
    }

    fn rom_with_words(len: usize, words: &[(usize, u16)]) -> Vec<u8> {
        let mut rom = vec![0u8; len];
        for &(addr, w) in words {
            rom[addr..addr + 2].copy_from_slice(&w.to_le_bytes());
        }
        rom
    }

    #[test]
    fn test_region_dispatch_relative_offset() {
        let mut mmu = mmu(HardwareFamily::ClasswizII, false, vec![]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        mmu.register_region(
            Region::new(0x8000, 0x10, "test")
                .on_read(|off| off as u8 + 0x40)
                .on_write(move |off, v| log.lock().unwrap().push((off, v))),
        )
        .unwrap();

        assert_eq!(mmu.read_data(0x8003), 0x43);
        mmu.write_data(0x800F, 7);
        assert_eq!(*seen.lock().unwrap(), vec![(0xF, 7)]);

        // Unmapped: reads 0, writes dropped, idempotent
        assert_eq!(mmu.read_data(0x8010), 0);
        mmu.write_data(0x8010, 1);
        assert_eq!(mmu.read_data(0x8010), 0);
        assert_eq!(mmu.read_data(0x8010), 0);
    }

    #[test]
    fn test_overlap_rejected_before_marking() {
        let mut mmu = mmu(HardwareFamily::Classwiz, false, vec![]);
        mmu.register_region(Region::new(0xD000, 0x100, "ram").on_read(|_| 1))
            .unwrap();
        let err = mmu
            .register_region(Region::new(0xCF00, 0x200, "late").on_read(|_| 2))
            .unwrap_err();
        assert!(matches!(err, SimulationError::RegionOverlap(0xD000)));
        // The non-overlapping prefix was not bound
        assert_eq!(mmu.read_data(0xCF00), 0);
    }

    #[test]
    fn test_missing_segment_rejected() {
        let mut mmu = mmu(HardwareFamily::EsPlus, false, vec![]);
        let err = mmu
            .register_region(Region::new(0x2_0000, 0x10, "nowhere"))
            .unwrap_err();
        assert!(matches!(err, SimulationError::SegmentMissing(2)));
    }

    #[test]
    fn test_unregister_frees_range() {
        let mut mmu = mmu(HardwareFamily::Classwiz, false, vec![]);
        let id = mmu
            .register_region(Region::new(0xF000, 4, "sfr").on_read(|_| 0xAA))
            .unwrap();
        assert_eq!(mmu.regions().len(), 1);
        let region = mmu.unregister_region(id).unwrap();
        assert_eq!(region.description, "sfr");
        assert_eq!(mmu.read_data(0xF000), 0);
        assert!(mmu.regions().is_empty());
        assert!(matches!(
            mmu.unregister_region(id),
            Err(SimulationError::RegionHole(_))
        ));
        // Slot is reusable
        mmu.register_region(Region::new(0xF000, 4, "again")).unwrap();
    }

    #[test]
    fn test_es_plus_linear_fetch() {
        let rom = rom_with_words(0x20000, &[(0x0, 0x1234), (0x1_0002, 0xBEEF)]);
        let mmu = mmu(HardwareFamily::EsPlus, false, rom);
        assert_eq!(mmu.read_code(0), 0x1234);
        assert_eq!(mmu.read_code(0x1_0002), 0xBEEF);
        assert_eq!(mmu.read_code(0x3_0000), 0);
    }

    #[test]
    fn test_classwiz_remap_window() {
        let rom = rom_with_words(0x40000, &[(0x10, 0x1111), (0xFE10, 0x2222)]);
        let mmu = mmu(HardwareFamily::Classwiz, false, rom);

        assert_eq!(mmu.read_code(0x10), 0x1111);
        assert_eq!(mmu.read_code(0xFE10), 0xFFFF);
        mmu.flags().set_remap(true);
        assert_eq!(mmu.read_code(0x10), 0x2222);
        assert_eq!(mmu.read_code(0xFE10), 0x2222);
        assert_eq!(mmu.read_code(0x4_0000), 0);
    }

    #[test]
    fn test_classwiz_segment_access_alias() {
        let rom = rom_with_words(0x40000, &[(0x20, 0x5A5A)]);
        let mmu = mmu(HardwareFamily::Classwiz, false, rom);
        assert_eq!(mmu.read_code(0x5_0020), 0);
        mmu.flags().set_segment_access(true);
        assert_eq!(mmu.read_code(0x5_0020), 0x5A5A);
    }

    #[test]
    fn test_classwiz_ii_fetch_windows() {
        let rom = rom_with_words(0x60000, &[(0x5_E004, 0xCAFE), (0x4_0000, 0x7777)]);
        let mmu = mmu(HardwareFamily::ClasswizII, true, rom);
        assert_eq!(mmu.read_code(0x7_0004), 0xCAFE);
        assert_eq!(mmu.read_code(0x7_2000), 0xFFFF);
        assert_eq!(mmu.read_code(0x6_0000), 0xFFFF);
        assert_eq!(mmu.read_code(0x5_E000), 0xFFFF);
        assert_eq!(mmu.read_code(0x8_0004), 0x0000);
        assert_eq!(mmu.read_code(0xC_0000), 0x7777);
    }

    #[test]
    fn test_classwiz_ii_real_offset_sentinels() {
        let mut mmu = mmu(HardwareFamily::ClasswizII, true, vec![]);
        mmu.register_region(Region::new(0x9000, 0x10, "ram").on_read(|_| 0x42))
            .unwrap();

        assert_eq!(mmu.read_data(0x10_9000), 0x42);
        assert_eq!(mmu.take_dsr_fault(), None);

        assert_eq!(mmu.read_data(0xF0_1234), 0);
        assert_eq!(mmu.take_dsr_fault(), Some(0xF0));
        assert_eq!(mmu.take_dsr_fault(), None);

        assert_eq!(mmu.read_data(0x16_0101), 0xFF);
        assert_eq!(mmu.read_data(0x16_0102), 0);
        assert_eq!(mmu.read_data(0x17_0100), 0);

        // Debugger reads never corrupt the DSR
        assert_eq!(mmu.peek(0x98_0000), 0);
        assert_eq!(mmu.take_dsr_fault(), None);
    }

    #[test]
    fn test_fx5800p_fetch_and_sentinel() {
        let rom = rom_with_words(0x20000, &[(0x1_0000, 0x0102)]);
        let cfg = FamilyConfig::new(HardwareFamily::Fx5800p, false);
        let flash = crate::memory::prepare_fx5800p_flash(vec![0x34, 0x12]);
        let mut mmu = Mmu::new(&cfg, rom.into(), flash.into(), Hooks::new());
        assert_eq!(mmu.read_code(0x1_0000), 0x0102);
        assert_eq!(mmu.read_code(0x8_0000), 0x1234);
        assert_eq!(mmu.read_code(0x4_0000), 0xFFFF);
        assert_eq!(mmu.read_data(0x10_0000), 0xFF);
    }
}
