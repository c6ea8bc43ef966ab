// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::config::SimulationConfig;
use crate::family::{FamilyConfig, HardwareFamily};
use crate::Machine;
use anyhow::Context;
use nxu8_config::ModelDescriptor;
use std::path::Path;
use tracing::info;

/// Assembles a [`Machine`] from a model descriptor.
#[derive(Debug, Clone)]
pub struct MachineBuilder {
    model: ModelDescriptor,
    config: SimulationConfig,
}

impl MachineBuilder {
    pub fn new(model: ModelDescriptor) -> Self {
        let config = SimulationConfig {
            strict_memory: model.strict_memory,
            ..SimulationConfig::default()
        };
        Self { model, config }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        info!("Loading model descriptor: {:?}", path);
        Ok(Self::new(ModelDescriptor::from_file(path)?))
    }

    pub fn with_call_stack(mut self, enabled: bool) -> Self {
        self.config.call_stack = enabled;
        self
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    /// Family parameters with the descriptor's overrides applied.
    pub fn family_config(&self) -> anyhow::Result<FamilyConfig> {
        let model = &self.model;
        let mut family =
            FamilyConfig::new(HardwareFamily::from(model.hardware), model.real_hardware);
        family.memory_model = model.memory_model.into();
        family.remap = model.remap;
        if let Some(cps) = model.cycles_per_second {
            family.cycles_per_second = cps;
        }
        if let Some(ram) = &model.ram {
            family.ram_base = ram.base;
            family.ram_size = model
                .ram_size()?
                .with_context(|| format!("Model '{}': RAM size missing", model.name))?;
        }
        Ok(family)
    }

    pub fn build(self) -> anyhow::Result<Machine> {
        let family = self.family_config()?;
        let rom = std::fs::read(&self.model.rom)
            .with_context(|| format!("Failed to read ROM image {}", self.model.rom))?;
        if rom.len() > family.rom_size {
            anyhow::bail!(
                "ROM image {} is {:#x} bytes; {:?} holds at most {:#x}",
                self.model.rom,
                rom.len(),
                family.family,
                family.rom_size
            );
        }
        let flash = match &self.model.flash {
            Some(path) => std::fs::read(path)
                .with_context(|| format!("Failed to read flash image {}", path))?,
            None => Vec::new(),
        };

        info!(
            "Building '{}': {:?}, ROM {:#x} bytes, flash {:#x} bytes",
            self.model.name,
            family.family,
            rom.len(),
            flash.len()
        );
        Machine::new(family, &self.config, rom, flash)
            .with_context(|| format!("Failed to build model '{}'", self.model.name))
    }
}

/// Load a model descriptor and build its machine.
pub fn build_machine(model_path: &Path) -> anyhow::Result<Machine> {
    MachineBuilder::from_file(model_path)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::assembler::assemble;
    use crate::DebugControl;

    fn descriptor(dir: &Path, extra: &str) -> std::path::PathBuf {
        let mut rom = vec![0u8; 0x400];
        rom[0..2].copy_from_slice(&0xE000u16.to_le_bytes());
        rom[2..4].copy_from_slice(&0x0200u16.to_le_bytes());
        // Spin in place at the reset vector
        let spin = assemble("bal -1").unwrap();
        rom[0x200..0x202].copy_from_slice(&spin[0].to_le_bytes());
        std::fs::write(dir.join("rom.bin"), &rom).unwrap();
        let path = dir.join("model.yaml");
        std::fs::write(
            &path,
            format!("name: test\nhardware: classwiz\nrom: rom.bin\n{}", extra),
        )
        .unwrap();
        path
    }

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "nxu8-builder-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_build_from_descriptor() {
        let dir = scratch_dir("basic");
        let path = descriptor(&dir, "");
        let mut machine = build_machine(&path).unwrap();
        assert_eq!(machine.step_single().unwrap(), crate::StopReason::StepDone);
        assert_eq!(machine.get_pc(), 0x200);
        assert_eq!(machine.cpu.regs.sp, 0xE000);
        assert_eq!(machine.family().family, HardwareFamily::Classwiz);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_overrides_applied() {
        let dir = scratch_dir("overrides");
        let path = descriptor(
            &dir,
            "memory_model: small\ncycles_per_second: 1000\nram:\n  base: 0xC000\n  size: 4KiB\n",
        );
        let family = MachineBuilder::from_file(&path)
            .unwrap()
            .family_config()
            .unwrap();
        assert_eq!(family.cycles_per_second, 1000);
        assert_eq!(family.ram_base, 0xC000);
        assert_eq!(family.ram_size, 0x1000);
        assert_eq!(family.memory_model, crate::family::MemoryModel::Small);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_rom_is_reported() {
        let dir = scratch_dir("missing");
        let path = dir.join("model.yaml");
        std::fs::write(&path, "name: x\nhardware: 3\nrom: nowhere.bin\n").unwrap();
        let err = build_machine(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("nowhere.bin"));
        std::fs::remove_dir_all(dir).ok();
    }
}
