// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimulationError;
use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Processor status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Psw: u8 {
        const C = 0x80;
        const Z = 0x40;
        const S = 0x20;
        const OV = 0x10;
        const MIE = 0x08;
        const HC = 0x04;
        const ELEVEL = 0x03;
    }
}

impl Psw {
    pub fn elevel(self) -> u8 {
        self.bits() & Psw::ELEVEL.bits()
    }

    pub fn set_elevel(&mut self, level: u8) {
        *self = Psw::from_bits_retain((self.bits() & !Psw::ELEVEL.bits()) | (level & 0x03));
    }
}

/// nX-U8 register file. `R0..R15` are the storage; `ERn`, `XRn` and `QRn`
/// are little-endian views over consecutive byte registers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    pub r: [u8; 16],
    pub pc: u16,
    pub csr: u8,
    pub lr: u16,
    pub lcsr: u8,
    pub sp: u16,
    pub ea: u16,
    pub psw: Psw,
    /// Data segment for the current instruction only.
    pub dsr: u8,
    /// Banked by exception level; index 0 is unused by interrupts.
    pub elr: [u16; 4],
    pub ecsr: [u8; 4],
    pub epsw: [Psw; 4],
}

impl RegisterFile {
    pub fn er(&self, n: u8) -> u16 {
        let n = (n & 0xE) as usize;
        u16::from_le_bytes([self.r[n], self.r[n + 1]])
    }

    pub fn set_er(&mut self, n: u8, value: u16) {
        let n = (n & 0xE) as usize;
        self.r[n..n + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn xr(&self, n: u8) -> u32 {
        self.get(n, 4) as u32
    }

    pub fn qr(&self, n: u8) -> u64 {
        self.get(n, 8)
    }

    /// Read `size` bytes starting at byte register `n` (wrapping at R15).
    pub fn get(&self, n: u8, size: u8) -> u64 {
        (0..size).rev().fold(0u64, |acc, i| {
            acc << 8 | self.r[((n + i) & 0xF) as usize] as u64
        })
    }

    pub fn set(&mut self, n: u8, size: u8, value: u64) {
        for i in 0..size {
            self.r[((n + i) & 0xF) as usize] = (value >> (8 * i)) as u8;
        }
    }

    /// 20-bit code address.
    pub fn code_address(&self) -> u32 {
        (self.csr as u32) << 16 | self.pc as u32
    }

    pub fn elevel(&self) -> usize {
        self.psw.elevel() as usize
    }
}

/// Register names exposed to debuggers and test scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterName {
    R(u8),
    Er(u8),
    Xr(u8),
    Qr(u8),
    Pc,
    Csr,
    Lr,
    Lcsr,
    Sp,
    Ea,
    Psw,
    Dsr,
    Elr(u8),
    Ecsr(u8),
    Epsw(u8),
}

impl RegisterName {
    pub fn all() -> Vec<RegisterName> {
        let mut names: Vec<RegisterName> = (0..16).map(RegisterName::R).collect();
        names.extend((0..16).step_by(2).map(RegisterName::Er));
        names.extend((0..16).step_by(4).map(RegisterName::Xr));
        names.extend([RegisterName::Qr(0), RegisterName::Qr(8)]);
        names.extend([
            RegisterName::Pc,
            RegisterName::Csr,
            RegisterName::Lr,
            RegisterName::Lcsr,
            RegisterName::Sp,
            RegisterName::Ea,
            RegisterName::Psw,
            RegisterName::Dsr,
        ]);
        for level in 1..=3 {
            names.extend([
                RegisterName::Elr(level),
                RegisterName::Ecsr(level),
                RegisterName::Epsw(level),
            ]);
        }
        names
    }

    pub fn read(self, regs: &RegisterFile) -> u64 {
        match self {
            RegisterName::R(n) => regs.r[n as usize] as u64,
            RegisterName::Er(n) => regs.er(n) as u64,
            RegisterName::Xr(n) => regs.xr(n) as u64,
            RegisterName::Qr(n) => regs.qr(n),
            RegisterName::Pc => regs.pc as u64,
            RegisterName::Csr => regs.csr as u64,
            RegisterName::Lr => regs.lr as u64,
            RegisterName::Lcsr => regs.lcsr as u64,
            RegisterName::Sp => regs.sp as u64,
            RegisterName::Ea => regs.ea as u64,
            RegisterName::Psw => regs.psw.bits() as u64,
            RegisterName::Dsr => regs.dsr as u64,
            RegisterName::Elr(l) => regs.elr[l as usize] as u64,
            RegisterName::Ecsr(l) => regs.ecsr[l as usize] as u64,
            RegisterName::Epsw(l) => regs.epsw[l as usize].bits() as u64,
        }
    }

    /// Store `value`, truncated to the register's width.
    pub fn write(self, regs: &mut RegisterFile, value: u64) {
        match self {
            RegisterName::R(n) => regs.r[n as usize] = value as u8,
            RegisterName::Er(n) => regs.set_er(n, value as u16),
            RegisterName::Xr(n) => regs.set(n, 4, value),
            RegisterName::Qr(n) => regs.set(n, 8, value),
            RegisterName::Pc => regs.pc = value as u16,
            RegisterName::Csr => regs.csr = value as u8,
            RegisterName::Lr => regs.lr = value as u16,
            RegisterName::Lcsr => regs.lcsr = value as u8,
            RegisterName::Sp => regs.sp = value as u16,
            RegisterName::Ea => regs.ea = value as u16,
            RegisterName::Psw => regs.psw = Psw::from_bits_retain(value as u8),
            RegisterName::Dsr => regs.dsr = value as u8,
            RegisterName::Elr(l) => regs.elr[l as usize] = value as u16,
            RegisterName::Ecsr(l) => regs.ecsr[l as usize] = value as u8,
            RegisterName::Epsw(l) => regs.epsw[l as usize] = Psw::from_bits_retain(value as u8),
        }
    }
}

impl fmt::Display for RegisterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterName::R(n) => write!(f, "R{}", n),
            RegisterName::Er(n) => write!(f, "ER{}", n),
            RegisterName::Xr(n) => write!(f, "XR{}", n),
            RegisterName::Qr(n) => write!(f, "QR{}", n),
            RegisterName::Pc => write!(f, "PC"),
            RegisterName::Csr => write!(f, "CSR"),
            RegisterName::Lr => write!(f, "LR"),
            RegisterName::Lcsr => write!(f, "LCSR"),
            RegisterName::Sp => write!(f, "SP"),
            RegisterName::Ea => write!(f, "EA"),
            RegisterName::Psw => write!(f, "PSW"),
            RegisterName::Dsr => write!(f, "DSR"),
            RegisterName::Elr(l) => write!(f, "ELR{}", l),
            RegisterName::Ecsr(l) => write!(f, "ECSR{}", l),
            RegisterName::Epsw(l) => write!(f, "EPSW{}", l),
        }
    }
}

impl FromStr for RegisterName {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let unknown = || SimulationError::UnknownRegister(s.to_string());

        let fixed = match upper.as_str() {
            "PC" => Some(RegisterName::Pc),
            "CSR" => Some(RegisterName::Csr),
            "LR" => Some(RegisterName::Lr),
            "LCSR" => Some(RegisterName::Lcsr),
            "SP" => Some(RegisterName::Sp),
            "EA" => Some(RegisterName::Ea),
            "PSW" => Some(RegisterName::Psw),
            "DSR" => Some(RegisterName::Dsr),
            _ => None,
        };
        if let Some(name) = fixed {
            return Ok(name);
        }

        // Longest prefixes first so "ECSR1" is not read as "E" + ...
        let indexed: [(&str, fn(u8) -> RegisterName, u8, u8); 7] = [
            ("ECSR", RegisterName::Ecsr, 1, 3),
            ("EPSW", RegisterName::Epsw, 1, 3),
            ("ELR", RegisterName::Elr, 1, 3),
            ("ER", RegisterName::Er, 2, 14),
            ("XR", RegisterName::Xr, 4, 12),
            ("QR", RegisterName::Qr, 8, 8),
            ("R", RegisterName::R, 1, 15),
        ];
        for (prefix, make, step, max) in indexed {
            if let Some(digits) = upper.strip_prefix(prefix) {
                let n: u8 = digits.parse().map_err(|_| unknown())?;
                let min = if prefix.starts_with('E') && prefix != "ER" { 1 } else { 0 };
                if n < min || n > max || n % step != 0 {
                    return Err(unknown());
                }
                return Ok(make(n));
            }
        }
        Err(unknown())
    }
}
