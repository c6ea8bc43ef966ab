// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::RegionSet;
use crate::bus::{Mmu, Region};
use crate::family::{FamilyConfig, EMULATOR_RAM_WINDOW};
use crate::memory::LinearMemory;
use crate::{ClockDomain, SimResult, SimulationError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

type Shared = Arc<Mutex<LinearMemory>>;

fn lock(mem: &Shared) -> MutexGuard<'_, LinearMemory> {
    mem.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Serialize, Deserialize)]
struct RamState {
    main: Vec<u8>,
    #[serde(default)]
    extra: Vec<u8>,
}

/// Battery-backed work RAM. Contents survive a chip reset.
#[derive(Debug)]
pub struct Ram {
    base: u32,
    size: u32,
    /// Main RAM followed by the emulator window tail, when present.
    main: Shared,
    window: Option<u32>,
    extra: Option<(u32, Shared)>,
    regions: RegionSet,
}

fn byte_region(base: u32, size: u32, desc: &str, mem: &Shared, offset: u32) -> Region {
    let rd = mem.clone();
    let wr = mem.clone();
    Region::new(base, size, desc)
        .on_read(move |off| {
            let mem = lock(&rd);
            mem.read_u8(mem.base_addr + offset + off).unwrap_or(0)
        })
        .on_write(move |off, value| {
            let mut mem = lock(&wr);
            let addr = mem.base_addr + offset + off;
            mem.write_u8(addr, value);
        })
}

impl Ram {
    pub fn new(config: &FamilyConfig) -> Self {
        let window = config.emulator_ram_base();
        let tail = if window.is_some() {
            EMULATOR_RAM_WINDOW
        } else {
            0
        };
        let main = LinearMemory::new((config.ram_size + tail) as usize, config.ram_base);
        let extra = config
            .extra_ram()
            .map(|(base, size)| (base, Arc::new(Mutex::new(LinearMemory::new(size as usize, base)))));
        Self {
            base: config.ram_base,
            size: config.ram_size,
            main: Arc::new(Mutex::new(main)),
            window,
            extra,
            regions: RegionSet::default(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Copy of the whole backing buffer, window tail included.
    pub fn image(&self) -> Vec<u8> {
        lock(&self.main).data.clone()
    }

    /// Load a saved RAM image. Shorter images leave the remainder untouched.
    pub fn load_image(&mut self, bytes: &[u8]) -> SimResult<()> {
        let mut mem = lock(&self.main);
        if bytes.len() > mem.data.len() {
            return Err(SimulationError::Snapshot(format!(
                "RAM image is {} bytes, buffer holds {}",
                bytes.len(),
                mem.data.len()
            )));
        }
        let base = mem.base_addr;
        mem.load(base, bytes);
        Ok(())
    }

    pub fn clear(&mut self) {
        lock(&self.main).fill(0);
        if let Some((_, extra)) = &self.extra {
            lock(extra).fill(0);
        }
    }
}

impl crate::Peripheral for Ram {
    fn name(&self) -> &str {
        "Ram"
    }

    fn attach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        self.regions
            .register(mmu, byte_region(self.base, self.size, "Ram", &self.main, 0))?;
        if let Some(window) = self.window {
            self.regions.register(
                mmu,
                byte_region(window, EMULATOR_RAM_WINDOW, "Ram/Emulator", &self.main, self.size),
            )?;
        }
        if let Some((base, extra)) = &self.extra {
            let size = lock(extra).data.len() as u32;
            self.regions
                .register(mmu, byte_region(*base, size, "Ram/Program", extra, 0))?;
        }
        Ok(())
    }

    fn detach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
        self.regions.release(mmu)
    }

    fn clock(&self) -> ClockDomain {
        ClockDomain::Always
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn std::any::Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        let state = RamState {
            main: self.image(),
            extra: self
                .extra
                .as_ref()
                .map(|(_, mem)| lock(mem).data.clone())
                .unwrap_or_default(),
        };
        serde_json::to_value(state).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let state: RamState =
            serde_json::from_value(state).map_err(|e| SimulationError::Snapshot(e.to_string()))?;
        {
            let mem = lock(&self.main);
            if state.main.len() != mem.data.len() {
                return Err(SimulationError::Snapshot(format!(
                    "RAM snapshot is {} bytes, expected {}",
                    state.main.len(),
                    mem.data.len()
                )));
            }
        }
        lock(&self.main).data.copy_from_slice(&state.main);
        if let Some((_, extra)) = &self.extra {
            let mut mem = lock(extra);
            if state.extra.len() == mem.data.len() {
                mem.data.copy_from_slice(&state.extra);
            }
        }
        Ok(())
    }
}
