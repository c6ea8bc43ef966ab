// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Helpers behind the `nxu8` binary: text assembly, ROM disassembly and the
//! deterministic test-script runner.

pub mod disasm;
pub mod test_runner;

use std::str::FromStr;

pub const EXIT_PASS: u8 = 0;
pub const EXIT_ASSERT_FAIL: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_RUNTIME_ERROR: u8 = 3;

pub fn parse_u32_addr(s: &str) -> Result<u32, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex address '{}': {}", s, e))
    } else {
        u32::from_str(trimmed).map_err(|e| format!("Invalid address '{}': {}", s, e))
    }
}

/// Assemble each line and render its words as `0x1234`, one line per input.
pub fn assemble_lines(lines: &[String]) -> nxu8_core::SimResult<Vec<String>> {
    lines
        .iter()
        .map(|line| {
            let words = nxu8_core::decoder::assemble(line)?;
            Ok(words
                .iter()
                .map(|w| format!("{:#06x}", w))
                .collect::<Vec<_>>()
                .join(" "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr() {
        assert_eq!(parse_u32_addr("0x1F000"), Ok(0x1F000));
        assert_eq!(parse_u32_addr(" 512 "), Ok(512));
        assert!(parse_u32_addr("0xZZ").is_err());
    }

    #[test]
    fn test_assemble_lines() {
        let out = assemble_lines(&["add r0, 5".to_string(), "bl 1:0x2000".to_string()]).unwrap();
        assert_eq!(out, vec!["0x1005", "0xf101 0x2000"]);
        assert!(assemble_lines(&["frob".to_string()]).is_err());
    }
}
