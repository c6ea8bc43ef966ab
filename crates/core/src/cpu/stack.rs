// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! PUSH/POP. The stack always lives in segment 0.

use super::{Cpu, Psw};
use crate::Bus;

/// Register list bits of PUSH/POP.
const LIST_EA: u8 = 1;
const LIST_ELR_PC: u8 = 2;
const LIST_PSW: u8 = 4;
const LIST_LR: u8 = 8;

impl Cpu {
    pub(super) fn push16<B: Bus + ?Sized>(&mut self, bus: &mut B, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        let sp = self.regs.sp;
        bus.write_data(sp.wrapping_add(1) as u32, (value >> 8) as u8);
        bus.write_data(sp as u32, value as u8);
    }

    pub(super) fn pop16<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let sp = self.regs.sp;
        let low = bus.read_data(sp as u32) as u16;
        let high = bus.read_data(sp.wrapping_add(1) as u32) as u16;
        self.regs.sp = sp.wrapping_add(2);
        high << 8 | low
    }

    /// Byte pushes still move SP by a full word.
    pub(super) fn push_register<B: Bus + ?Sized>(&mut self, bus: &mut B, index: u8, size: u8) {
        let value = self.regs.get(index, size);
        let reserve = size.max(2) as u16;
        self.regs.sp = self.regs.sp.wrapping_sub(reserve);
        let sp = self.regs.sp;
        for ix in (0..size as u16).rev() {
            bus.write_data(sp.wrapping_add(ix) as u32, (value >> (8 * ix)) as u8);
        }
    }

    pub(super) fn pop_register<B: Bus + ?Sized>(&mut self, bus: &mut B, index: u8, size: u8) {
        let sp = self.regs.sp;
        let mut value = 0u64;
        for ix in 0..size as u16 {
            value |= (bus.read_data(sp.wrapping_add(ix) as u32) as u64) << (8 * ix);
        }
        self.regs.sp = sp.wrapping_add(size.max(2) as u16);
        self.regs.set(index, size, value);
    }

    pub(super) fn push_list<B: Bus + ?Sized>(&mut self, bus: &mut B, list: u8) {
        let level = self.regs.elevel();
        let large = self.large();

        if list & LIST_ELR_PC != 0 {
            if large {
                self.push16(bus, self.regs.ecsr[level] as u16);
            }
            self.push16(bus, self.regs.elr[level]);
        }
        if list & LIST_PSW != 0 {
            self.push16(bus, self.regs.epsw[level].bits() as u16);
        }
        if list & LIST_LR != 0 {
            if large {
                self.push16(bus, self.regs.lcsr as u16);
            }
            self.push16(bus, self.regs.lr);
            let lr = (self.regs.lcsr as u32) << 16 | self.regs.lr as u32;
            let sp = self.regs.sp;
            if let Some(tracker) = self.call_stack.as_mut() {
                tracker.on_push_lr(sp, lr);
            }
        }
        if list & LIST_EA != 0 {
            self.push16(bus, self.regs.ea);
        }
    }

    pub(super) fn pop_list<B: Bus + ?Sized>(&mut self, bus: &mut B, list: u8) {
        let large = self.large();

        if list & LIST_EA != 0 {
            self.regs.ea = self.pop16(bus);
        }
        if list & LIST_LR != 0 {
            let sp = self.regs.sp;
            if let Some(tracker) = self.call_stack.as_mut() {
                tracker.on_pop_lr(sp);
            }
            self.regs.lr = self.pop16(bus);
            if large {
                self.regs.lcsr = self.pop16(bus) as u8 & 0x0F;
            }
        }
        if list & LIST_PSW != 0 {
            self.regs.psw = Psw::from_bits_retain(self.pop16(bus) as u8);
        }
        if list & LIST_ELR_PC != 0 {
            let old_sp = self.regs.sp;
            let old_pc = self.code_address();
            self.regs.pc = self.pop16(bus);
            if large {
                self.regs.csr = self.pop16(bus) as u8 & 0x0F;
            }
            let return_to = self.code_address();
            if let Some(tracker) = self.call_stack.as_mut() {
                tracker.on_pop_pc(old_pc, old_sp, return_to);
            }
        }
    }
}
