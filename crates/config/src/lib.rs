// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown hardware '{0}' (expected es_plus, classwiz, classwiz_ii, fx_5800p, ti, solar_ii or 3..8)")]
    UnknownHardware(String),
}

/// Calculator chipset family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HardwareRepr", rename_all = "snake_case")]
pub enum Hardware {
    EsPlus,
    Classwiz,
    ClasswizII,
    Fx5800p,
    Ti,
    SolarII,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HardwareRepr {
    Id(u64),
    Name(String),
}

impl TryFrom<HardwareRepr> for Hardware {
    type Error = ConfigError;

    fn try_from(repr: HardwareRepr) -> std::result::Result<Self, Self::Error> {
        let hw = match &repr {
            HardwareRepr::Id(3) => Hardware::EsPlus,
            HardwareRepr::Id(4) => Hardware::Classwiz,
            HardwareRepr::Id(5) => Hardware::ClasswizII,
            HardwareRepr::Id(6) => Hardware::Fx5800p,
            HardwareRepr::Id(7) => Hardware::Ti,
            HardwareRepr::Id(8) => Hardware::SolarII,
            HardwareRepr::Id(n) => return Err(ConfigError::UnknownHardware(n.to_string())),
            HardwareRepr::Name(s) => match s.trim().to_ascii_lowercase().as_str() {
                "es_plus" | "esplus" | "es+" => Hardware::EsPlus,
                "classwiz" | "cwi" => Hardware::Classwiz,
                "classwiz_ii" | "cwii" => Hardware::ClasswizII,
                "fx_5800p" | "fx5800p" => Hardware::Fx5800p,
                "ti" => Hardware::Ti,
                "solar_ii" => Hardware::SolarII,
                _ => return Err(ConfigError::UnknownHardware(s.clone())),
            },
        };
        Ok(hw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryModel {
    Small,
    #[default]
    Large,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RamOverride {
    pub base: u32,
    pub size: String, // e.g. "8KiB"
}

/// A calculator model: chipset, images and runtime switches.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub hardware: Hardware,
    #[serde(default)]
    pub real_hardware: bool,
    pub rom: String,
    #[serde(default)]
    pub flash: Option<String>,
    #[serde(default)]
    pub memory_model: MemoryModel,
    #[serde(default)]
    pub cycles_per_second: Option<u64>,
    #[serde(default)]
    pub ram: Option<RamOverride>,
    #[serde(default)]
    pub strict_memory: bool,
    #[serde(default)]
    pub remap: bool,
}

impl ModelDescriptor {
    /// Load a descriptor; relative image paths resolve against its directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model descriptor at {:?}", path))?;
        let mut model = Self::from_yaml(&content)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        model.resolve_paths(dir);
        Ok(model)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let model: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Model Descriptor YAML")?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }
        if self.rom.trim().is_empty() {
            anyhow::bail!("Model '{}': 'rom' path cannot be empty", self.name);
        }
        if let Some(ram) = &self.ram {
            let size = parse_size(&ram.size)
                .with_context(|| format!("Model '{}': bad RAM size", self.name))?;
            if size == 0 || ram.base as u64 + size > 0x1_0000 {
                anyhow::bail!(
                    "Model '{}': RAM {:#x}+{:#x} must be non-empty and inside segment 0",
                    self.name,
                    ram.base,
                    size
                );
            }
        }
        if self.cycles_per_second == Some(0) {
            anyhow::bail!("Model '{}': cycles_per_second must be positive", self.name);
        }
        Ok(())
    }

    pub fn resolve_paths(&mut self, dir: &Path) {
        self.rom = resolve(dir, &self.rom);
        if let Some(flash) = self.flash.as_mut() {
            *flash = resolve(dir, flash);
        }
        debug!("Model '{}': rom {}", self.name, self.rom);
    }

    /// RAM size override in bytes.
    pub fn ram_size(&self) -> Result<Option<u32>> {
        self.ram
            .as_ref()
            .map(|r| parse_size(&r.size).map(|s| s as u32))
            .transpose()
    }
}

fn resolve(dir: &Path, file: &str) -> String {
    let p = PathBuf::from(file);
    if p.is_absolute() {
        file.to_string()
    } else {
        dir.join(p).to_string_lossy().into_owned()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    pub model: String,
    /// Optional saved RAM image loaded before the run.
    #[serde(default)]
    pub ram_image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    pub max_steps: u64,
    #[serde(default)]
    pub max_cycles: Option<u64>,
    #[serde(default)]
    pub no_progress_steps: Option<u64>,
    #[serde(default)]
    pub wall_time_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Runner failed before simulation started (e.g. script parse/validation error).
    ConfigError,
    MaxSteps,
    MaxCycles,
    NoProgress,
    WallTime,
    /// A word with no opcode table entry was fetched.
    DecodeError,
    Breakpoint,
    /// The CPU entered HALT or STOP with nothing left to wake it.
    Halt,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryValueDetails {
    pub address: u32,
    pub expected_value: u64,
    /// Bytes read little-endian, 1 by default.
    #[serde(default)]
    pub size: Option<u8>,
    #[serde(default)]
    pub mask: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryValueAssertion {
    pub memory_value: MemoryValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueDetails {
    pub register: String,
    pub expected_value: u64,
    #[serde(default)]
    pub mask: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueAssertion {
    pub register_value: RegisterValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    ExpectedStopReason(StopReasonAssertion),
    MemoryValue(MemoryValueAssertion),
    RegisterValue(RegisterValueAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    pub inputs: TestInputs,
    pub limits: TestLimits,
    #[serde(default)]
    pub breakpoints: Vec<u32>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.inputs.model.trim().is_empty() {
            anyhow::bail!("Input 'model' path cannot be empty");
        }

        if self.limits.max_steps == 0 {
            anyhow::bail!("Limit 'max_steps' must be greater than zero");
        }

        for assertion in &self.assertions {
            if let TestAssertion::MemoryValue(m) = assertion {
                if !matches!(m.memory_value.size.unwrap_or(1), 1 | 2 | 4 | 8) {
                    anyhow::bail!(
                        "memory_value at {:#x}: size must be 1, 2, 4 or 8",
                        m.memory_value.address
                    );
                }
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_script() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  model: "models/fx991cw.yaml"
limits:
  max_steps: 1000
  wall_time_ms: 5000
assertions:
  - memory_value:
      address: 0xD000
      expected_value: 0x42
  - register_value:
      register: er0
      expected_value: 7
  - expected_stop_reason: max_steps
"#;
        let script: TestScript = serde_yaml::from_str(yaml).unwrap();
        assert!(script.validate().is_ok());
        assert_eq!(script.inputs.model, "models/fx991cw.yaml");
        assert_eq!(script.limits.max_steps, 1000);
        assert_eq!(script.assertions.len(), 3);
        assert!(matches!(
            script.assertions[1],
            TestAssertion::RegisterValue(_)
        ));
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
inputs:
  model: "m.yaml"
limits:
  max_steps: 100
"#;
        let script: TestScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_invalid_max_steps() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  model: "m.yaml"
limits:
  max_steps: 0
"#;
        let script: TestScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("max_steps"));
    }

    #[test]
    fn test_bad_memory_assertion_size() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  model: "m.yaml"
limits:
  max_steps: 10
assertions:
  - memory_value:
      address: 0x9000
      expected_value: 1
      size: 3
"#;
        let script: TestScript = serde_yaml::from_str(yaml).unwrap();
        assert!(script.validate().unwrap_err().to_string().contains("size"));
    }

    #[test]
    fn test_hardware_names_and_ids() {
        let named: Hardware = serde_yaml::from_str("classwiz_ii").unwrap();
        assert_eq!(named, Hardware::ClasswizII);
        let by_id: Hardware = serde_yaml::from_str("6").unwrap();
        assert_eq!(by_id, Hardware::Fx5800p);
        assert!(serde_yaml::from_str::<Hardware>("2").is_err());
        assert!(serde_yaml::from_str::<Hardware>("z80").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("8KiB").unwrap(), 8192);
        assert_eq!(parse_size("1MiB").unwrap(), 0x10_0000);
        assert!(parse_size("lots").is_err());
    }
}
