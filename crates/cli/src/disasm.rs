// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use nxu8_core::decoder::needs_long_imm;
use nxu8_core::decoder::nxu8::disassemble;
use nxu8_core::Bus;
use std::fmt;

/// One listing line: address, raw code words and assembler text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmLine {
    pub address: u32,
    pub words: Vec<u16>,
    pub text: String,
}

impl fmt::Display for DisasmLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self.words.iter().map(|w| format!("{:04X}", w)).collect();
        write!(
            f,
            "{:X}:{:04X}  {:<10} {}",
            self.address >> 16,
            self.address & 0xFFFF,
            words.join(" "),
            self.text
        )
    }
}

/// Listing of `count` instructions from the code space at `start`.
pub fn listing<B: Bus + ?Sized>(bus: &B, start: u32, count: usize) -> Vec<DisasmLine> {
    disassemble(|addr| bus.read_code(addr), start, count)
        .into_iter()
        .map(|(address, text)| {
            let opcode = bus.read_code(address);
            let mut words = vec![opcode];
            if needs_long_imm(opcode) {
                words.push(bus.read_code((address & 0xF_0000) | ((address + 2) & 0xFFFF)));
            }
            DisasmLine {
                address,
                words,
                text,
            }
        })
        .collect()
}
