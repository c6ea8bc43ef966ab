// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// A simple flat memory storage
#[derive(Debug, Clone)]
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u32,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u32) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base_addr && ((addr - self.base_addr) as usize) < self.data.len()
    }

    pub fn read_u8(&self, addr: u32) -> Option<u8> {
        if self.contains(addr) {
            Some(self.data[(addr - self.base_addr) as usize])
        } else {
            None
        }
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> bool {
        if self.contains(addr) {
            self.data[(addr - self.base_addr) as usize] = value;
            true
        } else {
            false
        }
    }

    /// Copy `bytes` in at `addr`; fails without writing if they don't fit.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) -> bool {
        if addr < self.base_addr {
            return false;
        }
        let offset = (addr - self.base_addr) as usize;
        let Some(end) = offset.checked_add(bytes.len()) else {
            return false;
        };
        if end > self.data.len() {
            return false;
        }
        self.data[offset..end].copy_from_slice(bytes);
        true
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }
}

/// Little-endian word from an image; bytes past the end read as 0.
pub fn le_word(image: &[u8], offset: usize) -> u16 {
    let lo = image.get(offset).copied().unwrap_or(0);
    let hi = offset
        .checked_add(1)
        .and_then(|i| image.get(i))
        .copied()
        .unwrap_or(0);
    u16::from_le_bytes([lo, hi])
}

/// Zero-pad a ROM image up to the family's ROM size.
pub fn pad_rom(mut rom: Vec<u8>, size: usize) -> Vec<u8> {
    if rom.len() < size {
        rom.resize(size, 0);
    }
    rom
}

/// Lay out an FX-5800P flash image: 512K erased, a blank program area and
/// the two marker bytes the firmware checks for.
pub fn prepare_fx5800p_flash(mut flash: Vec<u8>) -> Vec<u8> {
    flash.resize(0x80000, 0xFF);
    flash[0x20000..0x30000].fill(0xFF);
    flash[0x30000..0x38000].fill(0x00);
    flash[0x38000..0x40000].fill(0xFF);
    flash[0x37FFE] = 0xFF;
    flash[0x37FFF] = 0x44;
    flash
}
