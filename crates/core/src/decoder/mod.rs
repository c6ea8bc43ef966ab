// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod assembler;
pub mod nxu8;
pub mod table;

pub use assembler::{assemble, Assembler};
pub use table::{Addressing, Hints, Op, OpcodeEntry, OperandKind, OPCODES};

/// Branch condition, encoded 0..15.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Ge,
    Lt,
    Gt,
    Le,
    Ges,
    Lts,
    Gts,
    Les,
    Ne,
    Eq,
    Nv,
    Ov,
    Ps,
    Ns,
    Al,
    /// Encoding 15: never taken.
    Never,
}

pub const CONDITION_NAMES: [&str; 16] = [
    "ge", "lt", "gt", "le", "ges", "lts", "gts", "les", "ne", "eq", "nv", "ov", "ps", "ns", "al",
    "nop",
];

impl Condition {
    pub fn from_code(code: u8) -> Self {
        use Condition::*;
        match code & 0xF {
            0 => Ge,
            1 => Lt,
            2 => Gt,
            3 => Le,
            4 => Ges,
            5 => Lts,
            6 => Gts,
            7 => Les,
            8 => Ne,
            9 => Eq,
            10 => Nv,
            11 => Ov,
            12 => Ps,
            13 => Ns,
            14 => Al,
            _ => Never,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        CONDITION_NAMES[self as usize]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CONDITION_NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|code| Self::from_code(code as u8))
    }
}

/// A fully resolved operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Immediate(u16),
    Register { index: u8, size: u8 },
    StackPointer,
    ExtendedAddress,
    Psw,
    Ecsr,
    Elr,
    Epsw,
    Condition(Condition),
    /// `field` is the base register index or the raw 6-bit displacement.
    Memory { mode: Addressing, field: u16 },
    RegisterList(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub entry: &'static OpcodeEntry,
    pub opcode: u16,
    /// Trailing code word, present for `LONG_IMM` entries.
    pub long_imm: u16,
    pub operands: [Operand; 2],
}

impl DecodedInstruction {
    pub fn op(&self) -> Op {
        self.entry.op
    }

    pub fn hints(&self) -> Hints {
        self.entry.hints
    }

    /// Instruction length in bytes.
    pub fn length(&self) -> u32 {
        self.entry.length()
    }

    /// Immediate of operand `i`, sign-extended when the entry asks for it.
    pub fn immediate(&self, i: usize) -> u16 {
        let desc = self.entry.operands[i];
        match self.operands[i] {
            Operand::Immediate(v) if self.entry.hints.contains(Hints::IMM_EXTEND) => {
                sign_extend(v, desc.mask)
            }
            Operand::Immediate(v) => v,
            _ => 0,
        }
    }
}

/// Sign-extend a field whose width is given by its (contiguous) mask.
pub fn sign_extend(value: u16, mask: u16) -> u16 {
    let bits = 16 - mask.leading_zeros();
    if bits == 0 || bits >= 16 {
        return value;
    }
    let shift = 16 - bits;
    (((value << shift) as i16) >> shift) as u16
}

/// Whether a word needs the following code word as its long immediate.
pub fn needs_long_imm(opcode: u16) -> bool {
    table::lookup(opcode)
        .map(|e| e.hints.contains(Hints::LONG_IMM))
        .unwrap_or(false)
}

/// Pure decode of one instruction word (plus its trailing word, if any).
pub fn decode(opcode: u16, long_imm: u16) -> Option<DecodedInstruction> {
    let entry = table::lookup(opcode)?;
    let mut operands = [Operand::None; 2];
    for (slot, desc) in operands.iter_mut().zip(entry.operands.iter()) {
        let field = desc.field(opcode);
        *slot = match desc.kind {
            OperandKind::None | OperandKind::Mirror => Operand::None,
            OperandKind::Immediate => Operand::Immediate(field),
            OperandKind::Register(size) => Operand::Register {
                index: field as u8,
                size,
            },
            OperandKind::StackPointer => Operand::StackPointer,
            OperandKind::ExtendedAddress => Operand::ExtendedAddress,
            OperandKind::Psw => Operand::Psw,
            OperandKind::Ecsr => Operand::Ecsr,
            OperandKind::Elr => Operand::Elr,
            OperandKind::Epsw => Operand::Epsw,
            OperandKind::Condition => Operand::Condition(Condition::from_code(field as u8)),
            OperandKind::Memory(mode) => Operand::Memory { mode, field },
            OperandKind::RegisterList => Operand::RegisterList(field as u8),
        };
    }
    Some(DecodedInstruction {
        entry,
        opcode,
        long_imm: if entry.hints.contains(Hints::LONG_IMM) {
            long_imm
        } else {
            0
        },
        operands,
    })
}
