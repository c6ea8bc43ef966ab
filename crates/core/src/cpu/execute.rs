// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::alu::{self, Shift};
use super::{Cpu, Psw, Trap};
use crate::decoder::{sign_extend, Addressing, Condition, DecodedInstruction, Hints, Op, Operand};
use crate::Bus;

impl Psw {
    fn test(self, cond: Condition) -> bool {
        let c = self.contains(Psw::C);
        let z = self.contains(Psw::Z);
        let s = self.contains(Psw::S);
        let ov = self.contains(Psw::OV);
        match cond {
            Condition::Ge => !c,
            Condition::Lt => c,
            Condition::Gt => !c && !z,
            Condition::Le => c || z,
            Condition::Ges => s == ov,
            Condition::Lts => s != ov,
            Condition::Gts => s == ov && !z,
            Condition::Les => s != ov || z,
            Condition::Ne => !z,
            Condition::Eq => z,
            Condition::Nv => !ov,
            Condition::Ov => ov,
            Condition::Ps => !s,
            Condition::Ns => s,
            Condition::Al => true,
            Condition::Never => false,
        }
    }
}

fn register(operand: Operand) -> (u8, u8) {
    match operand {
        Operand::Register { index, size } => (index, size),
        _ => (0, 1),
    }
}

impl Cpu {
    /// Run a decoded instruction. PC already points past it.
    pub(super) fn execute<B: Bus + ?Sized>(
        &mut self,
        insn: &DecodedInstruction,
        bus: &mut B,
        start: u32,
    ) -> Option<Trap> {
        match insn.op() {
            Op::Add | Op::Addc | Op::And | Op::Cmp | Op::Cmpc | Op::Mov | Op::Or | Op::Xor
            | Op::Sub | Op::Subc => self.exec_alu(insn),
            Op::Sll | Op::Sllc | Op::Srl | Op::Srlc | Op::Sra => self.exec_shift(insn),
            Op::Daa | Op::Das | Op::Neg => {
                let (n, _) = register(insn.operands[0]);
                let value = self.regs.r[n as usize];
                let psw = &mut self.regs.psw;
                self.regs.r[n as usize] = match insn.op() {
                    Op::Daa => alu::daa(psw, value),
                    Op::Das => alu::das(psw, value),
                    _ => alu::sub(psw, 0, value as u32, false, 8) as u8,
                };
            }
            Op::Extbw => {
                let (n, _) = register(insn.operands[0]);
                let value = self.regs.r[n as usize] as i8 as i16 as u16;
                self.regs.set_er(n, value);
                alu::zs(&mut self.regs.psw, value as u32, 16);
            }
            Op::Mul => {
                let (n, _) = register(insn.operands[0]);
                let (m, _) = register(insn.operands[1]);
                let product = self.regs.r[n as usize] as u16 * self.regs.r[m as usize] as u16;
                self.regs.set_er(n, product);
                self.regs.psw.set(Psw::Z, product == 0);
            }
            Op::Div => self.exec_div(insn),
            Op::Inc | Op::Dec => {
                let addr = self.regs.ea;
                let value = self.read_data(bus, addr, 1) as u32;
                let carry = self.regs.psw.contains(Psw::C);
                let result = if insn.op() == Op::Inc {
                    alu::add(&mut self.regs.psw, value, 1, false, 8)
                } else {
                    alu::sub(&mut self.regs.psw, value, 1, false, 8)
                };
                self.regs.psw.set(Psw::C, carry);
                self.write_data(bus, addr, 1, result as u64);
            }
            Op::AddSp => {
                self.regs.sp = self.regs.sp.wrapping_add(insn.immediate(1));
            }
            Op::MovControl => self.exec_control_move(insn),
            Op::Push => {
                let (n, size) = register(insn.operands[0]);
                self.push_register(bus, n, size);
            }
            Op::Pop => {
                let (n, size) = register(insn.operands[0]);
                self.pop_register(bus, n, size);
            }
            Op::PushList => {
                if let Operand::RegisterList(list) = insn.operands[0] {
                    self.push_list(bus, list);
                }
            }
            Op::PopList => {
                if let Operand::RegisterList(list) = insn.operands[0] {
                    self.pop_list(bus, list);
                }
            }
            Op::Load | Op::Store => {
                let (n, size) = register(insn.operands[0]);
                let addr = self.effective_address(insn, 1, size);
                if insn.hints().contains(Hints::STORE) {
                    let value = self.regs.get(n, size);
                    self.write_data(bus, addr, size, value);
                } else {
                    let value = self.read_data(bus, addr, size);
                    self.regs.set(n, size, value);
                    let sign = 1u64 << (size as u32 * 8 - 1);
                    self.regs.psw.set(Psw::Z, value == 0);
                    self.regs.psw.set(Psw::S, value & sign != 0);
                }
            }
            Op::Lea => {
                self.regs.ea = self.effective_address(insn, 0, 0);
            }
            Op::Sb | Op::Rb | Op::Tb => self.exec_bit(insn, bus),
            Op::Ei => self.regs.psw.insert(Psw::MIE),
            Op::Di => self.regs.psw.remove(Psw::MIE),
            Op::Sc => self.regs.psw.insert(Psw::C),
            Op::Rc => self.regs.psw.remove(Psw::C),
            Op::Cplc => self.regs.psw.toggle(Psw::C),
            Op::Bcc => {
                if let Operand::Condition(cond) = insn.operands[0] {
                    if self.regs.psw.test(cond) {
                        let offset = sign_extend(insn.immediate(1), 0xFF);
                        self.regs.pc = self.regs.pc.wrapping_add(offset.wrapping_mul(2));
                    }
                }
            }
            Op::B | Op::Bl => self.exec_branch(insn, start),
            Op::Rt => {
                let from = start;
                self.regs.pc = self.regs.lr;
                self.regs.csr = self.regs.lcsr & self.csr_mask;
                let return_to = self.code_address();
                if let Some(tracker) = self.call_stack.as_mut() {
                    tracker.on_rt(from, return_to);
                }
            }
            Op::Rti | Op::Rtice => {
                let level = self.regs.elevel();
                self.regs.pc = self.regs.elr[level];
                self.regs.csr = self.regs.ecsr[level] & self.csr_mask;
                self.regs.psw = self.regs.epsw[level];
            }
            Op::Swi => return Some(Trap::Software(insn.immediate(0) as u8)),
            Op::Brk => return Some(Trap::Break),
            Op::Iceswi => return Some(Trap::Emulator),
            Op::Nop | Op::Dsr => {}
        }
        None
    }

    /// Data offset of memory operand `i`. `[EA+]` advances EA by `size`.
    fn effective_address(&mut self, insn: &DecodedInstruction, i: usize, size: u8) -> u16 {
        let Operand::Memory { mode, field } = insn.operands[i] else {
            return 0;
        };
        match mode {
            Addressing::Ea => self.regs.ea,
            Addressing::EaInc => {
                let addr = self.regs.ea;
                self.regs.ea = addr.wrapping_add(size as u16);
                addr
            }
            Addressing::Reg => self.regs.er(field as u8),
            Addressing::Disp16Reg => self.regs.er(field as u8).wrapping_add(insn.long_imm),
            Addressing::BasePointer => self.regs.er(12).wrapping_add(sign_extend(field, 0x3F)),
            Addressing::FramePointer => self.regs.er(14).wrapping_add(sign_extend(field, 0x3F)),
            Addressing::Direct => insn.long_imm,
        }
    }

    /// Second ALU operand: a register of the first operand's width or an immediate.
    fn source(&self, insn: &DecodedInstruction) -> u32 {
        match insn.operands[1] {
            Operand::Register { index, size } => self.regs.get(index, size) as u32,
            Operand::Immediate(_) => insn.immediate(1) as u32,
            _ => 0,
        }
    }

    fn exec_alu(&mut self, insn: &DecodedInstruction) {
        let (n, size) = register(insn.operands[0]);
        let bits = size as u32 * 8;
        let a = self.regs.get(n, size) as u32;
        let b = self.source(insn);
        let psw = &mut self.regs.psw;
        let result = match insn.op() {
            Op::Add => alu::add(psw, a, b, false, bits),
            Op::Addc => alu::add(psw, a, b, true, bits),
            Op::Sub | Op::Cmp => alu::sub(psw, a, b, false, bits),
            Op::Subc | Op::Cmpc => alu::sub(psw, a, b, true, bits),
            Op::And => alu::logic(psw, a & b, bits),
            Op::Or => alu::logic(psw, a | b, bits),
            Op::Xor => alu::logic(psw, a ^ b, bits),
            _ => alu::zs(psw, b, bits),
        };
        if insn.hints().contains(Hints::WRITEBACK) {
            self.regs.set(n, size, result as u64);
        }
    }

    fn exec_shift(&mut self, insn: &DecodedInstruction) {
        let (n, _) = register(insn.operands[0]);
        let width = self.source(insn) as u8;
        let value = self.regs.r[n as usize];
        let (kind, fill) = match insn.op() {
            Op::Sll => (Shift::Sll, 0),
            Op::Sllc => (Shift::Sllc, self.regs.r[(n.wrapping_sub(1) & 0xF) as usize]),
            Op::Srl => (Shift::Srl, 0),
            Op::Srlc => (Shift::Srlc, self.regs.r[((n + 1) & 0xF) as usize]),
            _ => (Shift::Sra, 0),
        };
        self.regs.r[n as usize] = alu::shift(&mut self.regs.psw, kind, value, fill, width);
    }

    fn exec_div(&mut self, insn: &DecodedInstruction) {
        let (n, _) = register(insn.operands[0]);
        let (m, _) = register(insn.operands[1]);
        let dividend = self.regs.er(n);
        let divisor = self.regs.r[m as usize] as u16;
        if divisor == 0 {
            self.regs.set_er(n, 0xFFFF);
            self.regs.r[m as usize] = dividend as u8;
            self.regs.psw.insert(Psw::C);
            self.regs.psw.remove(Psw::Z);
            return;
        }
        let quotient = dividend / divisor;
        self.regs.set_er(n, quotient);
        self.regs.r[m as usize] = (dividend % divisor) as u8;
        self.regs.psw.remove(Psw::C);
        self.regs.psw.set(Psw::Z, quotient == 0);
    }

    /// Moves involving SP, PSW and the banked exception registers.
    fn exec_control_move(&mut self, insn: &DecodedInstruction) {
        let level = self.regs.elevel();
        match (insn.operands[0], insn.operands[1]) {
            (Operand::Ecsr, Operand::Register { index, .. }) => {
                self.regs.ecsr[level] = self.regs.r[index as usize];
            }
            (Operand::Elr, Operand::Register { index, .. }) => {
                self.regs.elr[level] = self.regs.er(index);
            }
            (Operand::Epsw, Operand::Register { index, .. }) => {
                self.regs.epsw[level] = Psw::from_bits_retain(self.regs.r[index as usize]);
            }
            (Operand::Psw, Operand::Register { index, .. }) => {
                self.regs.psw = Psw::from_bits_retain(self.regs.r[index as usize]);
            }
            (Operand::Psw, Operand::Immediate(v)) => {
                self.regs.psw = Psw::from_bits_retain(v as u8);
            }
            (Operand::StackPointer, Operand::Register { index, .. }) => {
                self.regs.sp = self.regs.er(index) & !1;
            }
            (Operand::Register { index, .. }, Operand::Elr) => {
                self.regs.set_er(index, self.regs.elr[level]);
            }
            (Operand::Register { index, .. }, Operand::StackPointer) => {
                self.regs.set_er(index, self.regs.sp);
            }
            (Operand::Register { index, .. }, Operand::Ecsr) => {
                self.regs.r[index as usize] = self.regs.ecsr[level];
            }
            (Operand::Register { index, .. }, Operand::Epsw) => {
                self.regs.r[index as usize] = self.regs.epsw[level].bits();
            }
            (Operand::Register { index, .. }, Operand::Psw) => {
                self.regs.r[index as usize] = self.regs.psw.bits();
            }
            (dst, src) => tracing::warn!("CPU: unhandled control move {:?} <- {:?}", dst, src),
        }
    }

    fn exec_bit<B: Bus + ?Sized>(&mut self, insn: &DecodedInstruction, bus: &mut B) {
        let bit = 1u8 << (insn.immediate(1) & 7);
        let in_memory = matches!(insn.operands[0], Operand::Memory { .. });
        let old = match insn.operands[0] {
            Operand::Register { index, .. } => self.regs.r[index as usize],
            _ => self.read_data(bus, insn.long_imm, 1) as u8,
        };
        self.regs.psw.set(Psw::Z, old & bit == 0);
        let new = match insn.op() {
            Op::Sb => old | bit,
            Op::Rb => old & !bit,
            _ => return,
        };
        if in_memory {
            self.write_data(bus, insn.long_imm, 1, new as u64);
        } else if let Operand::Register { index, .. } = insn.operands[0] {
            self.regs.r[index as usize] = new;
        }
    }

    fn exec_branch(&mut self, insn: &DecodedInstruction, start: u32) {
        let return_pc = self.regs.pc;
        let return_csr = self.regs.csr;
        match insn.operands[0] {
            Operand::Immediate(segment) => {
                self.regs.csr = segment as u8 & self.csr_mask;
                self.regs.pc = insn.long_imm;
            }
            Operand::Register { index, .. } => {
                self.regs.pc = self.regs.er(index);
            }
            _ => return,
        }
        if insn.op() == Op::Bl {
            self.regs.lr = return_pc;
            self.regs.lcsr = return_csr;
            let target = self.code_address();
            let (sp, er0, er2) = (self.regs.sp, self.regs.er(0), self.regs.er(2));
            if let Some(tracker) = self.call_stack.as_mut() {
                tracker.on_call(start, target, sp, er0, er2);
            }
        }
    }
}
