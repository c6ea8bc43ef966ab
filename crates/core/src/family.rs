// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Per-family constants, resolved once when a machine is built.

use serde::{Deserialize, Serialize};

/// Cycles per second used for every emulated (non real-hardware) model.
pub const EMULATED_CYCLES_PER_SECOND: u64 = 8 * 1024 * 1024;

/// Size of the extra RAM window that emulated models expose.
pub const EMULATOR_RAM_WINDOW: u32 = 0x100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareFamily {
    EsPlus,
    Classwiz,
    ClasswizII,
    Fx5800p,
    Ti,
    SolarII,
}

impl HardwareFamily {
    pub fn id(self) -> u8 {
        match self {
            HardwareFamily::EsPlus => 3,
            HardwareFamily::Classwiz => 4,
            HardwareFamily::ClasswizII => 5,
            HardwareFamily::Fx5800p => 6,
            HardwareFamily::Ti => 7,
            HardwareFamily::SolarII => 8,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            3 => Some(HardwareFamily::EsPlus),
            4 => Some(HardwareFamily::Classwiz),
            5 => Some(HardwareFamily::ClasswizII),
            6 => Some(HardwareFamily::Fx5800p),
            7 => Some(HardwareFamily::Ti),
            8 => Some(HardwareFamily::SolarII),
            _ => None,
        }
    }
}

impl From<nxu8_config::Hardware> for HardwareFamily {
    fn from(hw: nxu8_config::Hardware) -> Self {
        match hw {
            nxu8_config::Hardware::EsPlus => HardwareFamily::EsPlus,
            nxu8_config::Hardware::Classwiz => HardwareFamily::Classwiz,
            nxu8_config::Hardware::ClasswizII => HardwareFamily::ClasswizII,
            nxu8_config::Hardware::Fx5800p => HardwareFamily::Fx5800p,
            nxu8_config::Hardware::Ti => HardwareFamily::Ti,
            nxu8_config::Hardware::SolarII => HardwareFamily::SolarII,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuModel {
    NxU8,
    NxU16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryModel {
    Small,
    #[default]
    Large,
}

impl From<nxu8_config::MemoryModel> for MemoryModel {
    fn from(m: nxu8_config::MemoryModel) -> Self {
        match m {
            nxu8_config::MemoryModel::Small => MemoryModel::Small,
            nxu8_config::MemoryModel::Large => MemoryModel::Large,
        }
    }
}

/// A data-side window onto the ROM image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomMapping {
    pub base: u32,
    pub size: u32,
    pub rom_offset: u32,
}

const fn window(base: u32, size: u32, rom_offset: u32) -> RomMapping {
    RomMapping {
        base,
        size,
        rom_offset,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyConfig {
    pub family: HardwareFamily,
    pub real_hardware: bool,
    pub cpu_model: CpuModel,
    pub memory_model: MemoryModel,
    pub segments: Vec<u8>,
    pub maskable_count: usize,
    pub cycles_per_second: u64,
    pub ram_base: u32,
    pub ram_size: u32,
    pub rom_size: usize,
    /// Initial state of the code remap window on CLASSWIZ-style fetches.
    pub remap: bool,
}

impl FamilyConfig {
    pub fn new(family: HardwareFamily, real_hardware: bool) -> Self {
        let (cpu_model, segments, maskable_count, real_cps, ram_base, ram_size, rom_size) =
            match family {
                HardwareFamily::EsPlus => (
                    CpuModel::NxU8,
                    vec![0, 1, 8],
                    12,
                    262_144,
                    0x8000,
                    0x0E00,
                    0x20000,
                ),
                HardwareFamily::Classwiz => (
                    CpuModel::NxU16,
                    (0..6).collect(),
                    17,
                    2_097_152,
                    0xD000,
                    0x2000,
                    0x40000,
                ),
                HardwareFamily::ClasswizII => (
                    CpuModel::NxU16,
                    (0..16).collect(),
                    21,
                    4_194_304,
                    0x9000,
                    0x6000,
                    0x60000,
                ),
                HardwareFamily::Fx5800p => (
                    CpuModel::NxU8,
                    (0..16).collect(),
                    21,
                    4_194_304,
                    0x8000,
                    0x7000,
                    0x20000,
                ),
                HardwareFamily::Ti => (
                    CpuModel::NxU16,
                    (0..16).collect(),
                    59,
                    4_194_304,
                    0xB000,
                    0x2000,
                    0x20000,
                ),
                HardwareFamily::SolarII => (
                    CpuModel::NxU8,
                    (0..16).collect(),
                    21,
                    4_194_304,
                    0x8000,
                    0x0E00,
                    0x20000,
                ),
            };

        Self {
            family,
            real_hardware,
            cpu_model,
            memory_model: MemoryModel::Large,
            segments,
            maskable_count,
            cycles_per_second: if real_hardware {
                real_cps
            } else {
                EMULATED_CYCLES_PER_SECOND
            },
            ram_base,
            ram_size,
            rom_size,
            remap: false,
        }
    }

    /// Base of the 0x100-byte RAM tail window that emulated models expose.
    pub fn emulator_ram_base(&self) -> Option<u32> {
        if self.real_hardware {
            return None;
        }
        Some(match self.family {
            HardwareFamily::EsPlus => 0x0_9800,
            HardwareFamily::Classwiz => 0x4_9800,
            _ => 0x8_9800,
        })
    }

    /// Additional RAM (FX-5800P program RAM in segment 4).
    pub fn extra_ram(&self) -> Option<(u32, u32)> {
        (self.family == HardwareFamily::Fx5800p).then_some((0x4_0000, 0x8000))
    }

    pub fn rom_windows(&self) -> Vec<RomMapping> {
        match self.family {
            HardwareFamily::EsPlus => vec![
                window(0x0_0000, 0x8000, 0),
                window(0x1_0000, 0x10000, 0x1_0000),
                window(0x8_0000, 0x10000, 0),
            ],
            HardwareFamily::Classwiz => vec![
                window(0x0_0000, 0xD000, 0),
                window(0x1_0000, 0x10000, 0x1_0000),
                window(0x2_0000, 0x10000, 0x2_0000),
                window(0x3_0000, 0x10000, 0x3_0000),
                window(0x5_0000, 0x10000, 0),
            ],
            HardwareFamily::ClasswizII => {
                let mut windows = vec![window(0x0_0000, 0x9000, 0)];
                for seg in 1..=5u32 {
                    windows.push(window(seg << 16, 0x10000, seg << 16));
                }
                if self.real_hardware {
                    windows.push(window(0x7_0000, 0x2000, 0x5_E000));
                    windows.push(window(0x8_0000, 0x10000, 0));
                } else {
                    windows.push(window(0x7_0000, 0x2000, 0x7_0000));
                }
                for seg in 9..=13u32 {
                    windows.push(window(seg << 16, 0x10000, (seg - 8) << 16));
                }
                windows.push(window(0xF_0000, 0x2000, 0x5_E000));
                windows
            }
            HardwareFamily::Fx5800p => vec![
                window(0x0_0000, 0x8000, 0),
                window(0x1_0000, 0x10000, 0x1_0000),
            ],
            HardwareFamily::Ti | HardwareFamily::SolarII => vec![
                window(0x0_0000, self.ram_base, 0),
                window(0x1_0000, 0x10000, 0x1_0000),
            ],
        }
    }

    /// Width in bytes of each of the interrupt mask/pending SFRs.
    pub fn interrupt_sfr_width(&self) -> u32 {
        if self.family == HardwareFamily::Ti {
            8
        } else {
            4
        }
    }

    /// Whether the watchdog line (bit 0 of the pending SFR) is writable.
    pub fn watchdog_interrupt(&self) -> bool {
        self.family == HardwareFamily::Ti
    }

    /// Vector index raised by each maskable source.
    pub fn maskable_vectors(&self) -> Vec<usize> {
        use crate::interrupt::INT_MASKABLE;
        if self.family != HardwareFamily::Ti {
            return (0..self.maskable_count).map(|i| i + INT_MASKABLE).collect();
        }
        (0..self.maskable_count)
            .map(|i| match i {
                7..=14 => INT_MASKABLE + 3 + (i - 7),
                55 => 56,
                56 => 57,
                57 => 58,
                _ => INT_MASKABLE,
            })
            .collect()
    }

    pub fn fcon_address(&self) -> u32 {
        if self.family == HardwareFamily::Ti {
            0xF002
        } else {
            0xF00A
        }
    }

    /// Writable bits of BLKCON0, or `None` when the family has no BLKCON0.
    pub fn blkcon_mask(&self) -> Option<u8> {
        match self.family {
            HardwareFamily::Ti => None,
            HardwareFamily::Classwiz => Some(0x1F),
            _ => Some(0xFF),
        }
    }

    /// CLASSWIZ exposes the code/data segment aliasing switch at 0xF004.
    pub fn has_segment_access_sfr(&self) -> bool {
        self.family == HardwareFamily::Classwiz
    }

    pub fn csr_mask(&self) -> u8 {
        match self.memory_model {
            MemoryModel::Large => 0x0F,
            MemoryModel::Small => 0x00,
        }
    }

    pub fn dsr_mask(&self) -> u8 {
        0xFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_ids_roundtrip() {
        for id in 3..=8 {
            let family = HardwareFamily::from_id(id).unwrap();
            assert_eq!(family.id(), id);
        }
        assert!(HardwareFamily::from_id(2).is_none());
    }

    #[test]
    fn test_emulated_models_run_at_fixed_rate() {
        let real = FamilyConfig::new(HardwareFamily::Classwiz, true);
        let emu = FamilyConfig::new(HardwareFamily::Classwiz, false);
        assert_eq!(real.cycles_per_second, 2_097_152);
        assert_eq!(emu.cycles_per_second, EMULATED_CYCLES_PER_SECOND);
        assert_eq!(real.emulator_ram_base(), None);
        assert_eq!(emu.emulator_ram_base(), Some(0x4_9800));
    }

    #[test]
    fn test_rom_windows_are_disjoint() {
        for family in [
            HardwareFamily::EsPlus,
            HardwareFamily::Classwiz,
            HardwareFamily::ClasswizII,
            HardwareFamily::Fx5800p,
            HardwareFamily::Ti,
            HardwareFamily::SolarII,
        ] {
            for real in [false, true] {
                let cfg = FamilyConfig::new(family, real);
                let mut windows = cfg.rom_windows();
                windows.sort_by_key(|w| w.base);
                for pair in windows.windows(2) {
                    assert!(
                        pair[0].base + pair[0].size <= pair[1].base,
                        "{:?} real={} overlaps at {:#x}",
                        family,
                        real,
                        pair[1].base
                    );
                }
                for w in &windows {
                    assert!(cfg.segments.contains(&((w.base >> 16) as u8)));
                }
            }
        }
    }

    #[test]
    fn test_ti_maskable_vector_layout() {
        let cfg = FamilyConfig::new(HardwareFamily::Ti, true);
        let vectors = cfg.maskable_vectors();
        assert_eq!(vectors.len(), 59);
        assert_eq!(vectors[0], 5);
        assert_eq!(vectors[7], 8);
        assert_eq!(vectors[14], 15);
        assert_eq!(vectors[57], 58);
        assert_eq!(cfg.interrupt_sfr_width(), 8);
        assert_eq!(cfg.blkcon_mask(), None);
    }

    #[test]
    fn test_small_model_masks_csr() {
        let mut cfg = FamilyConfig::new(HardwareFamily::EsPlus, false);
        assert_eq!(cfg.csr_mask(), 0x0F);
        cfg.memory_model = MemoryModel::Small;
        assert_eq!(cfg.csr_mask(), 0);
    }
}
