// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::{Psw, RegisterFile};
use crate::peripherals::standby::RunMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MachineSnapshot {
    pub cpu: CpuSnapshot,
    pub interrupts: InterruptSnapshot,
    pub peripherals: HashMap<String, serde_json::Value>,
    pub run_mode: RunMode,
    pub ticks: u64,
    pub instructions: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub registers: Vec<u8>,
    pub pc: u16,
    pub csr: u8,
    pub lr: u16,
    pub lcsr: u8,
    pub sp: u16,
    pub ea: u16,
    pub psw: u8,
    pub dsr: u8,
    pub latched_dsr: u8,
    pub elr: [u16; 4],
    pub ecsr: [u8; 4],
    pub epsw: [u8; 4],
}

impl CpuSnapshot {
    pub fn from_registers(regs: &RegisterFile, latched_dsr: u8) -> Self {
        Self {
            registers: regs.r.to_vec(),
            pc: regs.pc,
            csr: regs.csr,
            lr: regs.lr,
            lcsr: regs.lcsr,
            sp: regs.sp,
            ea: regs.ea,
            psw: regs.psw.bits(),
            dsr: regs.dsr,
            latched_dsr,
            elr: regs.elr,
            ecsr: regs.ecsr,
            epsw: regs.epsw.map(|p| p.bits()),
        }
    }

    pub fn to_registers(&self) -> RegisterFile {
        let mut r = [0u8; 16];
        for (dst, src) in r.iter_mut().zip(self.registers.iter()) {
            *dst = *src;
        }
        RegisterFile {
            r,
            pc: self.pc,
            csr: self.csr,
            lr: self.lr,
            lcsr: self.lcsr,
            sp: self.sp,
            ea: self.ea,
            psw: Psw::from_bits_retain(self.psw),
            dsr: self.dsr,
            elr: self.elr,
            ecsr: self.ecsr,
            epsw: self.epsw.map(Psw::from_bits_retain),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptSnapshot {
    /// Indices of active interrupt lines.
    pub active: Vec<usize>,
    pub mask: u64,
    pub pending: u64,
    pub enabled: Vec<bool>,
    pub mi_blocked: bool,
}
