// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod alu;
mod execute;
pub mod registers;
mod stack;

pub use registers::{Psw, RegisterFile, RegisterName};

use crate::call_stack::CallStackTracker;
use crate::decoder::{self, DecodedInstruction, Hints, Operand};
use crate::family::{CpuModel, FamilyConfig, MemoryModel};
use crate::hooks::Hooks;
use crate::snapshot::CpuSnapshot;
use crate::{Bus, SimResult, SimulationError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Longest DSR prefix chain handled in one step.
const MAX_DSR_PREFIXES: usize = 64;

/// Exception requested by the instruction just executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    Software(u8),
    Break,
    Emulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// Address of the first word fetched this step.
    pub pc: u32,
    pub opcode: u16,
    pub trap: Option<Trap>,
    /// An instruction hook asked to stop.
    pub break_requested: bool,
    pub cycles: u32,
}

#[derive(Debug)]
pub struct Cpu {
    pub regs: RegisterFile,
    model: CpuModel,
    memory_model: MemoryModel,
    csr_mask: u8,
    dsr_mask: u8,
    /// Value of the DSR SFR at 0xF000, shared with the SFR region.
    latched_dsr: Arc<AtomicU8>,
    hooks: Hooks,
    call_stack: Option<CallStackTracker>,
}

impl Cpu {
    pub fn new(config: &FamilyConfig, hooks: Hooks) -> Self {
        Self {
            regs: RegisterFile::default(),
            model: config.cpu_model,
            memory_model: config.memory_model,
            csr_mask: config.csr_mask(),
            dsr_mask: config.dsr_mask(),
            latched_dsr: Arc::new(AtomicU8::new(0)),
            hooks,
            call_stack: None,
        }
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    pub fn memory_model(&self) -> MemoryModel {
        self.memory_model
    }

    pub fn dsr_mask(&self) -> u8 {
        self.dsr_mask
    }

    pub fn latched_dsr(&self) -> Arc<AtomicU8> {
        self.latched_dsr.clone()
    }

    pub fn enable_call_stack(&mut self, on: bool) {
        self.call_stack = on.then(|| CallStackTracker::new(self.hooks.clone()));
    }

    pub fn call_stack(&self) -> Option<&CallStackTracker> {
        self.call_stack.as_ref()
    }

    pub fn code_address(&self) -> u32 {
        self.regs.code_address()
    }

    fn large(&self) -> bool {
        self.memory_model == MemoryModel::Large
    }

    pub fn read_register(&self, name: RegisterName) -> u64 {
        match name {
            RegisterName::Dsr => self.latched_dsr.load(Ordering::Relaxed) as u64,
            _ => name.read(&self.regs),
        }
    }

    pub fn write_register(&mut self, name: RegisterName, value: u64) {
        match name {
            RegisterName::Dsr => self
                .latched_dsr
                .store(value as u8 & self.dsr_mask, Ordering::Relaxed),
            _ => name.write(&mut self.regs, value),
        }
    }

    /// Power-on state; SP comes from the first vector word. The PC is set
    /// when the reset interrupt is accepted.
    pub fn reset<B: Bus + ?Sized>(&mut self, bus: &B) {
        self.regs = RegisterFile::default();
        self.latched_dsr.store(0, Ordering::Relaxed);
        self.regs.sp = bus.read_code(0);
        if let Some(tracker) = self.call_stack.as_mut() {
            tracker.clear();
        }
    }

    /// Enter an exception handler at `level` through vector `index`.
    pub fn raise<B: Bus + ?Sized>(&mut self, level: u8, index: usize, bus: &B) {
        if level > 0 {
            let l = level as usize & 3;
            self.regs.elr[l] = self.regs.pc;
            self.regs.ecsr[l] = self.regs.csr;
            self.regs.epsw[l] = self.regs.psw;
        }
        self.regs.psw.set_elevel(level);
        self.regs.psw.remove(Psw::MIE);
        self.regs.csr = 0;
        self.regs.pc = bus.read_code((index as u32) * 2);
        tracing::debug!(
            "CPU: exception level {} vector {:#04x} -> {:#06x}",
            level,
            index,
            self.regs.pc
        );
    }

    /// Fetch and decode the instruction at `csr:pc`.
    fn fetch<B: Bus + ?Sized>(&self, bus: &B, pc: u16) -> SimResult<DecodedInstruction> {
        let segment = (self.regs.csr as u32) << 16;
        let addr = segment | pc as u32;
        let opcode = bus.read_code(addr);
        let long_imm = if decoder::needs_long_imm(opcode) {
            bus.read_code(segment | pc.wrapping_add(2) as u32)
        } else {
            0
        };
        decoder::decode(opcode, long_imm).ok_or(SimulationError::UnknownOpcode { pc: addr, opcode })
    }

    /// Execute one instruction, including any DSR prefixes in front of it.
    pub fn next<B: Bus + ?Sized>(&mut self, bus: &mut B) -> SimResult<StepOutcome> {
        let start = self.code_address();
        let mut insn = self.fetch(bus, self.regs.pc)?;
        self.hooks.step_start(start, insn.opcode);

        let mut prefixes = 0;
        while insn.hints().contains(Hints::DSR_PREFIX) {
            self.apply_dsr_prefix(&insn);
            self.regs.pc = self.regs.pc.wrapping_add(insn.length() as u16);
            prefixes += 1;
            if prefixes >= MAX_DSR_PREFIXES {
                // DSR stays live for the next step
                return Ok(self.finish(start, insn.opcode, None, prefixes as u32));
            }
            insn = self.fetch(bus, self.regs.pc)?;
        }

        tracing::debug!(
            "{:#07x}: {:<24} ; {:#06x}",
            self.code_address(),
            insn.to_string(),
            insn.opcode
        );

        self.regs.pc = self.regs.pc.wrapping_add(insn.length() as u16);
        let trap = self.execute(&insn, bus, start);
        self.regs.dsr = 0;

        if let Some(segment) = bus.take_dsr_fault() {
            self.regs.dsr = segment;
            self.latched_dsr.store(segment, Ordering::Relaxed);
        }

        Ok(self.finish(start, insn.opcode, trap, prefixes as u32 + 1))
    }

    fn finish(&mut self, start: u32, opcode: u16, trap: Option<Trap>, cycles: u32) -> StepOutcome {
        self.hooks.step_end(cycles);
        let break_requested = self.hooks.instruction(start, self.code_address());
        StepOutcome {
            pc: start,
            opcode,
            trap,
            break_requested,
            cycles,
        }
    }

    fn apply_dsr_prefix(&mut self, insn: &DecodedInstruction) {
        if !insn.hints().contains(Hints::DSR_WRITE) {
            self.regs.dsr = self.latched_dsr.load(Ordering::Relaxed);
            return;
        }
        let value = match insn.operands[0] {
            Operand::Register { index, .. } => self.regs.r[index as usize],
            Operand::Immediate(v) => v as u8,
            _ => 0,
        } & self.dsr_mask;
        self.regs.dsr = value;
        self.latched_dsr.store(value, Ordering::Relaxed);
    }

    /// Address in the current data segment.
    fn data_address(&self, offset: u16) -> u32 {
        (self.regs.dsr as u32) << 16 | offset as u32
    }

    /// Little-endian data read of `size` bytes; wide accesses are word aligned.
    fn read_data<B: Bus + ?Sized>(&self, bus: &mut B, offset: u16, size: u8) -> u64 {
        let offset = if size > 1 { offset & !1 } else { offset };
        let mut value = 0u64;
        for i in 0..size as u16 {
            let byte = bus.read_data(self.data_address(offset.wrapping_add(i)));
            value |= (byte as u64) << (8 * i);
        }
        value
    }

    fn write_data<B: Bus + ?Sized>(&self, bus: &mut B, offset: u16, size: u8, value: u64) {
        let offset = if size > 1 { offset & !1 } else { offset };
        for i in 0..size as u16 {
            bus.write_data(
                self.data_address(offset.wrapping_add(i)),
                (value >> (8 * i)) as u8,
            );
        }
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot::from_registers(&self.regs, self.latched_dsr.load(Ordering::Relaxed))
    }

    pub fn apply_snapshot(&mut self, snapshot: &CpuSnapshot) {
        self.regs = snapshot.to_registers();
        self.latched_dsr.store(snapshot.latched_dsr, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests;
