// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! nX-U8/U16 encoding table shared by the decoder and the assembler.

use bitflags::bitflags;
use std::sync::OnceLock;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hints: u16 {
        /// Immediate operand is sign-extended from its field width.
        const IMM_EXTEND = 0x0001;
        const STORE = 0x0002;
        /// DSR prefix that also latches its value into the DSR SFR.
        const DSR_WRITE = 0x0004;
        const DSR_PREFIX = 0x0008;
        /// `[EA+]`: EA advances by the access size.
        const INC_EA = 0x0010;
        /// A second code word follows.
        const LONG_IMM = 0x0020;
        /// Result is written back to the first operand.
        const WRITEBACK = 0x0040;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Addc,
    And,
    Cmp,
    Cmpc,
    Mov,
    Or,
    Xor,
    Sub,
    Subc,
    Sll,
    Sllc,
    Srl,
    Srlc,
    Sra,
    AddSp,
    MovControl,
    Push,
    Pop,
    PushList,
    PopList,
    Load,
    Store,
    Lea,
    Daa,
    Das,
    Neg,
    Extbw,
    Sb,
    Rb,
    Tb,
    Ei,
    Di,
    Sc,
    Rc,
    Cplc,
    Bcc,
    Swi,
    Brk,
    Iceswi,
    B,
    Bl,
    Mul,
    Div,
    Inc,
    Dec,
    Rt,
    Rti,
    Rtice,
    Nop,
    Dsr,
}

/// Memory addressing forms of load/store/lea/bit operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// `[EA]`
    Ea,
    /// `[EA+]`
    EaInc,
    /// `[ERm]`
    Reg,
    /// `Disp16[ERm]`
    Disp16Reg,
    /// `Disp6[BP]` (BP = ER12)
    BasePointer,
    /// `Disp6[FP]` (FP = ER14)
    FramePointer,
    /// 16-bit absolute address in the trailing word.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Immediate,
    /// General register of the given width in bytes (1, 2, 4, 8).
    Register(u8),
    StackPointer,
    ExtendedAddress,
    Psw,
    Ecsr,
    Elr,
    Epsw,
    Condition,
    Memory(Addressing),
    /// PUSH/POP list: EA=1, ELR=2, EPSW=4, LR=8.
    RegisterList,
    /// Encoding field that must repeat the first operand's field.
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandSpec {
    pub kind: OperandKind,
    pub mask: u16,
    pub shift: u8,
}

impl OperandSpec {
    pub const fn field(&self, opcode: u16) -> u16 {
        (opcode >> self.shift) & self.mask
    }

    pub const fn encode(&self, value: u16) -> u16 {
        (value & self.mask) << self.shift
    }

    pub const fn bits(&self) -> u16 {
        self.mask << self.shift
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
    pub mnemonic: &'static str,
    pub op: Op,
    pub hints: Hints,
    /// Fixed bits; variable fields are zero.
    pub mask: u16,
    pub operands: [OperandSpec; 2],
}

impl OpcodeEntry {
    pub const fn variable_bits(&self) -> u16 {
        self.operands[0].bits() | self.operands[1].bits()
    }

    /// Whether `opcode` is an encoding of this entry.
    pub fn matches(&self, opcode: u16) -> bool {
        if opcode & !self.variable_bits() != self.mask {
            return false;
        }
        match (self.operands[0], self.operands[1]) {
            (first, mirror) if mirror.kind == OperandKind::Mirror => {
                first.field(opcode) == mirror.field(opcode)
            }
            _ => true,
        }
    }

    pub fn length(&self) -> u32 {
        if self.hints.contains(Hints::LONG_IMM) {
            4
        } else {
            2
        }
    }
}

const NONE: OperandSpec = spec(OperandKind::None, 0, 0);

const fn spec(kind: OperandKind, mask: u16, shift: u8) -> OperandSpec {
    OperandSpec { kind, mask, shift }
}

const fn r8(shift: u8) -> OperandSpec {
    spec(OperandKind::Register(1), 0xF, shift)
}

const fn er(shift: u8) -> OperandSpec {
    spec(OperandKind::Register(2), 0xE, shift)
}

const fn xr(shift: u8) -> OperandSpec {
    spec(OperandKind::Register(4), 0xC, shift)
}

const fn qr(shift: u8) -> OperandSpec {
    spec(OperandKind::Register(8), 0x8, shift)
}

const fn imm(mask: u16) -> OperandSpec {
    spec(OperandKind::Immediate, mask, 0)
}

const fn mem(mode: Addressing) -> OperandSpec {
    match mode {
        Addressing::Reg | Addressing::Disp16Reg => spec(OperandKind::Memory(mode), 0xE, 4),
        Addressing::BasePointer | Addressing::FramePointer => {
            spec(OperandKind::Memory(mode), 0x3F, 0)
        }
        _ => spec(OperandKind::Memory(mode), 0, 0),
    }
}

const fn only(kind: OperandKind) -> OperandSpec {
    spec(kind, 0, 0)
}

const fn entry(
    mnemonic: &'static str,
    op: Op,
    hints: Hints,
    mask: u16,
    a: OperandSpec,
    b: OperandSpec,
) -> OpcodeEntry {
    OpcodeEntry {
        mnemonic,
        op,
        hints,
        mask,
        operands: [a, b],
    }
}

const NO: Hints = Hints::empty();
const WB: Hints = Hints::WRITEBACK;
const WB_IE: Hints = Hints::WRITEBACK.union(Hints::IMM_EXTEND);
const LI: Hints = Hints::LONG_IMM;
const ST: Hints = Hints::STORE;
const ST_LI: Hints = Hints::STORE.union(Hints::LONG_IMM);
const INC: Hints = Hints::INC_EA;
const ST_INC: Hints = Hints::STORE.union(Hints::INC_EA);
const IE: Hints = Hints::IMM_EXTEND;
const DSR_SET: Hints = Hints::DSR_PREFIX.union(Hints::DSR_WRITE);

use Addressing::*;

macro_rules! load_store {
    ($reg:expr, $ea:literal, $ea_inc:literal) => {
        [
            entry("l", Op::Load, NO, $ea, $reg, mem(Ea)),
            entry("l", Op::Load, INC, $ea_inc, $reg, mem(EaInc)),
            entry("st", Op::Store, ST, $ea + 1, $reg, mem(Ea)),
            entry("st", Op::Store, ST_INC, $ea_inc + 1, $reg, mem(EaInc)),
        ]
    };
}

const fn concat<const N: usize>(parts: &[&[OpcodeEntry]]) -> [OpcodeEntry; N] {
    let mut out = [entry("", Op::Nop, NO, 0, NONE, NONE); N];
    let mut n = 0;
    let mut p = 0;
    while p < parts.len() {
        let mut i = 0;
        while i < parts[p].len() {
            out[n] = parts[p][i];
            n += 1;
            i += 1;
        }
        p += 1;
    }
    assert!(n == N);
    out
}

const ALU: &[OpcodeEntry] = &[
    entry("add", Op::Add, WB, 0x8001, r8(8), r8(4)),
    entry("add", Op::Add, WB, 0x1000, r8(8), imm(0xFF)),
    entry("add", Op::Add, WB, 0xF006, er(8), er(4)),
    entry("add", Op::Add, WB_IE, 0xE080, er(8), imm(0x7F)),
    entry("addc", Op::Addc, WB, 0x8006, r8(8), r8(4)),
    entry("addc", Op::Addc, WB, 0x6000, r8(8), imm(0xFF)),
    entry("and", Op::And, WB, 0x8002, r8(8), r8(4)),
    entry("and", Op::And, WB, 0x2000, r8(8), imm(0xFF)),
    entry("cmp", Op::Cmp, NO, 0x8007, r8(8), r8(4)),
    entry("cmp", Op::Cmp, NO, 0x7000, r8(8), imm(0xFF)),
    entry("cmp", Op::Cmp, NO, 0xF007, er(8), er(4)),
    entry("cmpc", Op::Cmpc, NO, 0x8005, r8(8), r8(4)),
    entry("cmpc", Op::Cmpc, NO, 0x5000, r8(8), imm(0xFF)),
    entry("mov", Op::Mov, WB, 0x8000, r8(8), r8(4)),
    entry("mov", Op::Mov, WB, 0x0000, r8(8), imm(0xFF)),
    entry("mov", Op::Mov, WB, 0xF005, er(8), er(4)),
    entry("mov", Op::Mov, WB_IE, 0xE000, er(8), imm(0x7F)),
    entry("or", Op::Or, WB, 0x8003, r8(8), r8(4)),
    entry("or", Op::Or, WB, 0x3000, r8(8), imm(0xFF)),
    entry("xor", Op::Xor, WB, 0x8004, r8(8), r8(4)),
    entry("xor", Op::Xor, WB, 0x4000, r8(8), imm(0xFF)),
    entry("sub", Op::Sub, WB, 0x8008, r8(8), r8(4)),
    entry("subc", Op::Subc, WB, 0x8009, r8(8), r8(4)),
    entry("sll", Op::Sll, WB, 0x800A, r8(8), r8(4)),
    entry("sll", Op::Sll, WB, 0x900A, r8(8), spec(OperandKind::Immediate, 0x7, 4)),
    entry("sllc", Op::Sllc, WB, 0x800B, r8(8), r8(4)),
    entry("sllc", Op::Sllc, WB, 0x900B, r8(8), spec(OperandKind::Immediate, 0x7, 4)),
    entry("srl", Op::Srl, WB, 0x800C, r8(8), r8(4)),
    entry("srl", Op::Srl, WB, 0x900C, r8(8), spec(OperandKind::Immediate, 0x7, 4)),
    entry("srlc", Op::Srlc, WB, 0x800D, r8(8), r8(4)),
    entry("srlc", Op::Srlc, WB, 0x900D, r8(8), spec(OperandKind::Immediate, 0x7, 4)),
    entry("sra", Op::Sra, WB, 0x800E, r8(8), r8(4)),
    entry("sra", Op::Sra, WB, 0x900E, r8(8), spec(OperandKind::Immediate, 0x7, 4)),
    entry("daa", Op::Daa, WB, 0x801F, r8(8), NONE),
    entry("das", Op::Das, WB, 0x803F, r8(8), NONE),
    entry("neg", Op::Neg, WB, 0x805F, r8(8), NONE),
    entry("extbw", Op::Extbw, WB, 0x810F, er(8), spec(OperandKind::Mirror, 0xE, 4)),
    entry("mul", Op::Mul, WB, 0xF004, er(8), r8(4)),
    entry("div", Op::Div, WB, 0xF009, er(8), r8(4)),
    entry("inc", Op::Inc, NO, 0xFE2F, mem(Ea), NONE),
    entry("dec", Op::Dec, NO, 0xFE3F, mem(Ea), NONE),
];

const CONTROL: &[OpcodeEntry] = &[
    entry("add", Op::AddSp, IE, 0xE100, only(OperandKind::StackPointer), imm(0xFF)),
    entry("mov", Op::MovControl, NO, 0xA00F, only(OperandKind::Ecsr), r8(4)),
    entry("mov", Op::MovControl, NO, 0xA00D, only(OperandKind::Elr), er(8)),
    entry("mov", Op::MovControl, NO, 0xA00C, only(OperandKind::Epsw), r8(4)),
    entry("mov", Op::MovControl, NO, 0xA005, er(8), only(OperandKind::Elr)),
    entry("mov", Op::MovControl, NO, 0xA01A, er(8), only(OperandKind::StackPointer)),
    entry("mov", Op::MovControl, NO, 0xA00B, only(OperandKind::Psw), r8(4)),
    entry("mov", Op::MovControl, NO, 0xE900, only(OperandKind::Psw), imm(0xFF)),
    entry("mov", Op::MovControl, NO, 0xA007, r8(8), only(OperandKind::Ecsr)),
    entry("mov", Op::MovControl, NO, 0xA004, r8(8), only(OperandKind::Epsw)),
    entry("mov", Op::MovControl, NO, 0xA003, r8(8), only(OperandKind::Psw)),
    entry("mov", Op::MovControl, NO, 0xA10A, only(OperandKind::StackPointer), er(4)),
    entry("push", Op::Push, NO, 0xF05E, er(8), NONE),
    entry("push", Op::Push, NO, 0xF07E, qr(8), NONE),
    entry("push", Op::Push, NO, 0xF04E, r8(8), NONE),
    entry("push", Op::Push, NO, 0xF06E, xr(8), NONE),
    entry("push", Op::PushList, NO, 0xF0CE, spec(OperandKind::RegisterList, 0xF, 8), NONE),
    entry("pop", Op::Pop, NO, 0xF01E, er(8), NONE),
    entry("pop", Op::Pop, NO, 0xF03E, qr(8), NONE),
    entry("pop", Op::Pop, NO, 0xF00E, r8(8), NONE),
    entry("pop", Op::Pop, NO, 0xF02E, xr(8), NONE),
    entry("pop", Op::PopList, NO, 0xF08E, spec(OperandKind::RegisterList, 0xF, 8), NONE),
];

const MEMORY: &[OpcodeEntry] = &[
    entry("l", Op::Load, NO, 0x9002, er(8), mem(Reg)),
    entry("l", Op::Load, LI, 0xA008, er(8), mem(Disp16Reg)),
    entry("l", Op::Load, NO, 0xB000, er(8), mem(BasePointer)),
    entry("l", Op::Load, NO, 0xB040, er(8), mem(FramePointer)),
    entry("l", Op::Load, LI, 0x9012, er(8), mem(Direct)),
    entry("st", Op::Store, ST, 0x9003, er(8), mem(Reg)),
    entry("st", Op::Store, ST_LI, 0xA009, er(8), mem(Disp16Reg)),
    entry("st", Op::Store, ST, 0xB080, er(8), mem(BasePointer)),
    entry("st", Op::Store, ST, 0xB0C0, er(8), mem(FramePointer)),
    entry("st", Op::Store, ST_LI, 0x9013, er(8), mem(Direct)),
    entry("l", Op::Load, NO, 0x9000, r8(8), mem(Reg)),
    entry("l", Op::Load, LI, 0x9008, r8(8), mem(Disp16Reg)),
    entry("l", Op::Load, NO, 0xD000, r8(8), mem(BasePointer)),
    entry("l", Op::Load, NO, 0xD040, r8(8), mem(FramePointer)),
    entry("l", Op::Load, LI, 0x9010, r8(8), mem(Direct)),
    entry("st", Op::Store, ST, 0x9001, r8(8), mem(Reg)),
    entry("st", Op::Store, ST_LI, 0x9009, r8(8), mem(Disp16Reg)),
    entry("st", Op::Store, ST, 0xD080, r8(8), mem(BasePointer)),
    entry("st", Op::Store, ST, 0xD0C0, r8(8), mem(FramePointer)),
    entry("st", Op::Store, ST_LI, 0x9011, r8(8), mem(Direct)),
    entry("lea", Op::Lea, NO, 0xF00A, mem(Reg), NONE),
    entry("lea", Op::Lea, LI, 0xF00B, mem(Disp16Reg), NONE),
    entry("lea", Op::Lea, LI, 0xF00C, mem(Direct), NONE),
];

const BITS: &[OpcodeEntry] = &[
    entry("sb", Op::Sb, NO, 0xA000, r8(8), spec(OperandKind::Immediate, 0x7, 4)),
    entry("sb", Op::Sb, LI, 0xA080, mem(Direct), spec(OperandKind::Immediate, 0x7, 4)),
    entry("rb", Op::Rb, NO, 0xA002, r8(8), spec(OperandKind::Immediate, 0x7, 4)),
    entry("rb", Op::Rb, LI, 0xA082, mem(Direct), spec(OperandKind::Immediate, 0x7, 4)),
    entry("tb", Op::Tb, NO, 0xA001, r8(8), spec(OperandKind::Immediate, 0x7, 4)),
    entry("tb", Op::Tb, LI, 0xA081, mem(Direct), spec(OperandKind::Immediate, 0x7, 4)),
    entry("ei", Op::Ei, NO, 0xED08, NONE, NONE),
    entry("di", Op::Di, NO, 0xEBF7, NONE, NONE),
    entry("sc", Op::Sc, NO, 0xED80, NONE, NONE),
    entry("rc", Op::Rc, NO, 0xEB7F, NONE, NONE),
    entry("cplc", Op::Cplc, NO, 0xFECF, NONE, NONE),
];

const FLOW: &[OpcodeEntry] = &[
    entry("b", Op::Bcc, NO, 0xC000, spec(OperandKind::Condition, 0xF, 8), imm(0xFF)),
    entry("swi", Op::Swi, NO, 0xE500, imm(0x3F), NONE),
    entry("brk", Op::Brk, NO, 0xFFFF, NONE, NONE),
    entry("iceswi", Op::Iceswi, NO, 0xFEFF, NONE, NONE),
    entry("b", Op::B, LI, 0xF000, spec(OperandKind::Immediate, 0xF, 8), NONE),
    entry("b", Op::B, NO, 0xF002, er(4), NONE),
    entry("bl", Op::Bl, LI, 0xF001, spec(OperandKind::Immediate, 0xF, 8), NONE),
    entry("bl", Op::Bl, NO, 0xF003, er(4), NONE),
    entry("rt", Op::Rt, NO, 0xFE1F, NONE, NONE),
    entry("rti", Op::Rti, NO, 0xFE0F, NONE, NONE),
    entry("rtice", Op::Rtice, NO, 0xFE6F, NONE, NONE),
    entry("rtice", Op::Rtice, NO, 0xFE7F, NONE, NONE),
    entry("nop", Op::Nop, NO, 0xFE8F, NONE, NONE),
    entry("dsr", Op::Dsr, Hints::DSR_PREFIX, 0xFE9F, NONE, NONE),
    entry("dsr", Op::Dsr, DSR_SET, 0xE300, imm(0xFF), NONE),
    entry("dsr", Op::Dsr, DSR_SET, 0x900F, r8(4), NONE),
];

const BYTE_EA: [OpcodeEntry; 4] = load_store!(r8(8), 0x9030, 0x9050);
const WORD_EA: [OpcodeEntry; 4] = load_store!(er(8), 0x9032, 0x9052);
const DWORD_EA: [OpcodeEntry; 4] = load_store!(xr(8), 0x9034, 0x9054);
const QWORD_EA: [OpcodeEntry; 4] = load_store!(qr(8), 0x9036, 0x9056);

const TABLE_LEN: usize = ALU.len()
    + CONTROL.len()
    + MEMORY.len()
    + BITS.len()
    + FLOW.len()
    + BYTE_EA.len()
    + WORD_EA.len()
    + DWORD_EA.len()
    + QWORD_EA.len();

/// The full instruction table. Order matters only for assembler lookup.
pub static OPCODES: [OpcodeEntry; TABLE_LEN] = concat(&[
    ALU, CONTROL, MEMORY, &BYTE_EA, &WORD_EA, &DWORD_EA, &QWORD_EA, BITS, FLOW,
]);

/// 64K opcode word to table index map, built on first use.
fn dispatch() -> &'static [u16] {
    static DISPATCH: OnceLock<Vec<u16>> = OnceLock::new();
    DISPATCH.get_or_init(|| {
        let mut table = vec![0u16; 0x10000];
        for (index, entry) in OPCODES.iter().enumerate() {
            let variable = entry.variable_bits();
            let mut sub = variable;
            loop {
                let opcode = entry.mask | sub;
                if entry.matches(opcode) && table[opcode as usize] == 0 {
                    table[opcode as usize] = index as u16 + 1;
                }
                if sub == 0 {
                    break;
                }
                sub = (sub - 1) & variable;
            }
        }
        table
    })
}

pub fn lookup(opcode: u16) -> Option<&'static OpcodeEntry> {
    match dispatch()[opcode as usize] {
        0 => None,
        index => OPCODES.get(index as usize - 1),
    }
}
