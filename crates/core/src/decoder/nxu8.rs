// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Disassembly in the assembler's own syntax.

use super::table::{Addressing, Op};
use super::{sign_extend, DecodedInstruction, Operand};
use std::fmt;

pub fn register_name(index: u8, size: u8) -> String {
    match size {
        1 => format!("r{}", index),
        2 => format!("er{}", index),
        4 => format!("xr{}", index),
        _ => format!("qr{}", index),
    }
}

fn signed(value: u16) -> i32 {
    value as i16 as i32
}

fn hex_or_dec(value: u16) -> String {
    if value < 10 {
        value.to_string()
    } else {
        format!("{:#x}", value)
    }
}

fn list_names(bits: u8, pop: bool) -> String {
    let names: [(u8, &str); 4] = if pop {
        [(1, "ea"), (2, "pc"), (4, "psw"), (8, "lr")]
    } else {
        [(1, "ea"), (2, "elr"), (4, "epsw"), (8, "lr")]
    };
    let picked: Vec<&str> = names
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    format!("{{{}}}", picked.join(", "))
}

impl DecodedInstruction {
    fn format_operand(&self, i: usize) -> Option<String> {
        let text = match self.operands[i] {
            Operand::None => return None,
            Operand::Immediate(_) => {
                let value = self.immediate(i);
                if self.hints().contains(super::Hints::IMM_EXTEND) {
                    signed(value).to_string()
                } else {
                    hex_or_dec(value)
                }
            }
            Operand::Register { index, size } => register_name(index, size),
            Operand::StackPointer => "sp".to_string(),
            Operand::ExtendedAddress => "ea".to_string(),
            Operand::Psw => "psw".to_string(),
            Operand::Ecsr => "ecsr".to_string(),
            Operand::Elr => "elr".to_string(),
            Operand::Epsw => "epsw".to_string(),
            Operand::Condition(c) => c.name().to_string(),
            Operand::Memory { mode, field } => match mode {
                Addressing::Ea => "[ea]".to_string(),
                Addressing::EaInc => "[ea+]".to_string(),
                Addressing::Reg => format!("[er{}]", field),
                Addressing::Disp16Reg => {
                    format!("{}[er{}]", hex_or_dec(self.long_imm), field)
                }
                Addressing::BasePointer => format!("{}[bp]", signed(sign_extend(field, 0x3F))),
                Addressing::FramePointer => format!("{}[fp]", signed(sign_extend(field, 0x3F))),
                Addressing::Direct => format!("{:#x}", self.long_imm),
            },
            Operand::RegisterList(bits) => list_names(bits, self.op() == Op::PopList),
        };
        Some(text)
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.entry.mnemonic;
        match (self.op(), self.operands) {
            (Op::Bcc, [Operand::Condition(cond), Operand::Immediate(disp)]) => {
                write!(f, "b{} {}", cond.name(), disp as u8 as i8)
            }
            (Op::B | Op::Bl, [Operand::Immediate(segment), Operand::None]) => {
                write!(f, "{} {}:{:#x}", mnemonic, segment, self.long_imm)
            }
            (Op::Sb | Op::Rb | Op::Tb, _) => {
                let target = self.format_operand(0).unwrap_or_default();
                let bit = self.format_operand(1).unwrap_or_default();
                write!(f, "{} {}.{}", mnemonic, target, bit)
            }
            _ => {
                let parts: Vec<String> = (0..2).filter_map(|i| self.format_operand(i)).collect();
                if parts.is_empty() {
                    write!(f, "{}", mnemonic)
                } else {
                    write!(f, "{} {}", mnemonic, parts.join(", "))
                }
            }
        }
    }
}

/// Disassemble `count` instructions from a code image starting at `addr`.
pub fn disassemble<F>(mut fetch: F, addr: u32, count: usize) -> Vec<(u32, String)>
where
    F: FnMut(u32) -> u16,
{
    let mut out = Vec::with_capacity(count);
    let mut pc = addr & !1;
    for _ in 0..count {
        let segment = pc & 0xF_0000;
        let opcode = fetch(pc);
        let next = segment | ((pc + 2) & 0xFFFF);
        let long_imm = fetch(next);
        match super::decode(opcode, long_imm) {
            Some(insn) => {
                out.push((pc, insn.to_string()));
                pc = segment | ((pc + insn.length()) & 0xFFFF);
            }
            None => {
                out.push((pc, format!(".word {:#06x}", opcode)));
                pc = next;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::decode;
    use super::*;

    fn text(opcode: u16, long_imm: u16) -> String {
        decode(opcode, long_imm).unwrap().to_string()
    }

    #[test]
    fn test_disassembly_forms() {
        assert_eq!(text(0x1005, 0), "add r0, 5");
        assert_eq!(text(0xC8FD, 0), "bne -3");
        assert_eq!(text(0xF101, 0x2000), "bl 1:0x2000");
        assert_eq!(text(0x9022, 0), "l er0, [er2]");
        assert_eq!(text(0xD144, 0), "l r1, 4[fp]");
        assert_eq!(text(0xB0BF, 0), "st er0, -1[bp]");
        assert_eq!(text(0x9455, 0), "st xr4, [ea+]");
        assert_eq!(text(0xF02B, 0x0010), "lea 0x10[er2]");
        assert_eq!(text(0xA0B0, 0x8000), "sb 0x8000.3");
        assert_eq!(text(0xA030, 0), "sb r0.3");
        assert_eq!(text(0xF9CE, 0), "push {ea, lr}");
        assert_eq!(text(0xF28E, 0), "pop {pc}");
        assert_eq!(text(0xE1FC, 0), "add sp, -4");
        assert_eq!(text(0x832F, 0), "extbw er2");
        assert_eq!(text(0xFE9F, 0), "dsr");
        assert_eq!(text(0x902F, 0), "dsr r2");
        assert_eq!(text(0xE303, 0), "dsr 3");
        assert_eq!(text(0xA00B | 0x10, 0), "mov psw, r1");
    }

    #[test]
    fn test_disassemble_stream() {
        let words = [0x1005u16, 0xF101, 0x2000, 0xFE4F, 0xFE1F];
        let listing = disassemble(|addr| words.get((addr / 2) as usize).copied().unwrap_or(0), 0, 4);
        assert_eq!(listing[0], (0, "add r0, 5".to_string()));
        assert_eq!(listing[1], (2, "bl 1:0x2000".to_string()));
        assert_eq!(listing[2], (6, ".word 0xfe4f".to_string()));
        assert_eq!(listing[3], (8, "rt".to_string()));
    }
}
