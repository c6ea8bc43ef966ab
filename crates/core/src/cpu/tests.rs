// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::*;
use crate::decoder::assemble;
use crate::family::HardwareFamily;
use std::collections::HashMap;

const ORIGIN: u16 = 0x0100;

#[derive(Debug, Default)]
struct FlatBus {
    code: Vec<u8>,
    data: HashMap<u32, u8>,
    fault: Option<u8>,
}

impl FlatBus {
    fn with_program(lines: &[&str]) -> Self {
        let mut code = vec![0u8; 0x20000];
        let mut at = ORIGIN as usize;
        for line in lines {
            for word in assemble(line).unwrap_or_else(|e| panic!("{}: {}", line, e)) {
                code[at..at + 2].copy_from_slice(&word.to_le_bytes());
                at += 2;
            }
        }
        Self {
            code,
            ..Self::default()
        }
    }

    fn set_code_word(&mut self, addr: usize, word: u16) {
        self.code[addr..addr + 2].copy_from_slice(&word.to_le_bytes());
    }
}

impl Bus for FlatBus {
    fn read_code(&self, addr: u32) -> u16 {
        let a = (addr & 0x1_FFFE) as usize;
        u16::from_le_bytes([self.code[a], self.code[a + 1]])
    }

    fn read_data(&mut self, addr: u32) -> u8 {
        self.data.get(&addr).copied().unwrap_or(0)
    }

    fn write_data(&mut self, addr: u32, value: u8) {
        self.data.insert(addr, value);
    }

    fn take_dsr_fault(&mut self) -> Option<u8> {
        self.fault.take()
    }
}

fn setup(lines: &[&str]) -> (Cpu, FlatBus) {
    let cfg = FamilyConfig::new(HardwareFamily::ClasswizII, false);
    let mut cpu = Cpu::new(&cfg, Hooks::new());
    cpu.regs.pc = ORIGIN;
    cpu.regs.sp = 0x8000;
    (cpu, FlatBus::with_program(lines))
}

fn run(cpu: &mut Cpu, bus: &mut FlatBus, steps: usize) {
    for _ in 0..steps {
        cpu.next(bus).unwrap();
    }
}

#[test]
fn test_add_immediate_sets_flags() {
    let (mut cpu, mut bus) = setup(&["mov r0, 0xff", "add r0, 1"]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.regs.r[0], 0);
    assert!(cpu.regs.psw.contains(Psw::C | Psw::Z));
    assert_eq!(cpu.regs.pc, ORIGIN + 4);
}

#[test]
fn test_cmp_does_not_write_back() {
    let (mut cpu, mut bus) = setup(&["mov r1, 5", "cmp r1, 7"]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.regs.r[1], 5);
    assert!(cpu.regs.psw.contains(Psw::C));
}

#[test]
fn test_word_move_sign_extends() {
    let (mut cpu, mut bus) = setup(&["mov er2, -1"]);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.er(2), 0xFFFF);
    assert!(cpu.regs.psw.contains(Psw::S));
}

#[test]
fn test_unknown_opcode_reports_address() {
    let (mut cpu, mut bus) = setup(&[]);
    bus.set_code_word(ORIGIN as usize, 0xFE4F);
    let err = cpu.next(&mut bus).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::UnknownOpcode {
            pc: 0x100,
            opcode: 0xFE4F
        }
    ));
}

#[test]
fn test_store_and_load_through_register() {
    let (mut cpu, mut bus) = setup(&[
        "mov r0, 0x34",
        "mov r1, 0x12",
        "lea 0x9000",
        "st er0, [ea+]",
        "l er2, 0x9000",
    ]);
    run(&mut cpu, &mut bus, 5);
    assert_eq!(bus.data[&0x9000], 0x34);
    assert_eq!(bus.data[&0x9001], 0x12);
    assert_eq!(cpu.regs.ea, 0x9002);
    assert_eq!(cpu.regs.er(2), 0x1234);
    assert!(!cpu.regs.psw.contains(Psw::Z));
}

#[test]
fn test_word_access_forces_even_address() {
    let (mut cpu, mut bus) = setup(&["mov er0, 3", "lea 0x9001", "st er0, [ea]"]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(bus.data[&0x9000], 3);
    assert!(!bus.data.contains_key(&0x9002));
}

#[test]
fn test_dsr_prefix_applies_to_one_instruction() {
    let (mut cpu, mut bus) = setup(&["mov r0, 0xaa", "dsr 2", "st r0, 0x1000", "st r0, 0x1000"]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(bus.data[&0x2_1000], 0xAA);
    assert_eq!(cpu.regs.dsr, 0);
    assert_eq!(cpu.read_register(RegisterName::Dsr), 2);

    run(&mut cpu, &mut bus, 1);
    assert_eq!(bus.data[&0x1000], 0xAA);
}

#[test]
fn test_latched_dsr_prefix_reuses_sfr_value() {
    let (mut cpu, mut bus) = setup(&["dsr", "l r0, 0x1000"]);
    cpu.write_register(RegisterName::Dsr, 3);
    bus.data.insert(0x3_1000, 0x5A);
    let outcome = cpu.next(&mut bus).unwrap();
    assert_eq!(outcome.cycles, 2);
    assert_eq!(cpu.regs.r[0], 0x5A);
}

#[test]
fn test_dsr_fault_corrupts_segment() {
    let (mut cpu, mut bus) = setup(&["l r0, 0x1000"]);
    bus.fault = Some(0xF0);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.dsr, 0xF0);
    assert_eq!(cpu.read_register(RegisterName::Dsr), 0xF0);
}

#[test]
fn test_branch_conditions() {
    let (mut cpu, mut bus) = setup(&["mov r0, 1", "cmp r0, 1", "beq 2", "mov r1, 1", "nop", "mov r2, 1"]);
    run(&mut cpu, &mut bus, 4);
    assert_eq!(cpu.regs.r[1], 0);
    assert_eq!(cpu.regs.r[2], 1);
}

#[test]
fn test_condition_fifteen_never_branches() {
    let (mut cpu, mut bus) = setup(&[]);
    bus.set_code_word(ORIGIN as usize, 0xCF10);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);
}

#[test]
fn test_call_and_return() {
    let (mut cpu, mut bus) = setup(&["bl 1:0x2000"]);
    bus.set_code_word(0x1_2000, 0xFE1F); // rt
    cpu.enable_call_stack(true);

    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.code_address(), 0x1_2000);
    assert_eq!(cpu.regs.lr, ORIGIN + 4);
    assert_eq!(cpu.regs.lcsr, 0);
    assert_eq!(cpu.call_stack().unwrap().depth(), 1);

    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.code_address(), (ORIGIN + 4) as u32);
    assert_eq!(cpu.call_stack().unwrap().depth(), 0);
}

#[test]
fn test_push_pop_list_large_model() {
    let (mut cpu, mut bus) = setup(&["push {lr, ea}", "pop {ea, lr}"]);
    cpu.regs.lr = 0x1234;
    cpu.regs.lcsr = 2;
    cpu.regs.ea = 0xBEEF;
    run(&mut cpu, &mut bus, 1);
    // LCSR, LR, then EA
    assert_eq!(cpu.regs.sp, 0x8000 - 6);
    assert_eq!(bus.data[&0x7FFE], 2);
    assert_eq!(bus.data[&0x7FFC], 0x34);
    assert_eq!(bus.data[&0x7FFD], 0x12);
    assert_eq!(bus.data[&0x7FFA], 0xEF);

    cpu.regs.lr = 0;
    cpu.regs.lcsr = 0;
    cpu.regs.ea = 0;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.sp, 0x8000);
    assert_eq!(cpu.regs.lr, 0x1234);
    assert_eq!(cpu.regs.lcsr, 2);
    assert_eq!(cpu.regs.ea, 0xBEEF);
}

#[test]
fn test_word_push_is_little_endian() {
    let (mut cpu, mut bus) = setup(&["push {er2}", "pop {er4}"]);
    cpu.regs.sp = 0x2000;
    cpu.regs.set_er(2, 0xBEEF);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.sp, 0x1FFE);
    assert_eq!(bus.data[&0x1FFE], 0xEF);
    assert_eq!(bus.data[&0x1FFF], 0xBE);

    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.sp, 0x2000);
    assert_eq!(cpu.regs.er(4), 0xBEEF);
    assert_eq!(cpu.regs.er(2), 0xBEEF);
}

#[test]
fn test_byte_push_reserves_word() {
    let (mut cpu, mut bus) = setup(&["mov r3, 0x77", "push {r3}", "pop {r4}"]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.regs.sp, 0x7FFE);
    assert_eq!(bus.data[&0x7FFE], 0x77);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.r[4], 0x77);
    assert_eq!(cpu.regs.sp, 0x8000);
}

#[test]
fn test_raise_and_return_from_interrupt() {
    let (mut cpu, mut bus) = setup(&["nop"]);
    bus.set_code_word(0x0A, 0x0400);
    bus.set_code_word(0x0400, 0xFE0F); // rti
    cpu.regs.psw = Psw::MIE | Psw::C;
    cpu.regs.csr = 0;

    cpu.raise(1, 5, &bus);
    assert_eq!(cpu.regs.pc, 0x0400);
    assert_eq!(cpu.regs.elevel(), 1);
    assert!(!cpu.regs.psw.contains(Psw::MIE));
    assert_eq!(cpu.regs.elr[1], ORIGIN);

    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.pc, ORIGIN);
    assert_eq!(cpu.regs.psw, Psw::MIE | Psw::C);
}

#[test]
fn test_software_interrupt_trap() {
    let (mut cpu, mut bus) = setup(&["swi 3", "brk"]);
    assert_eq!(cpu.next(&mut bus).unwrap().trap, Some(Trap::Software(3)));
    assert_eq!(cpu.next(&mut bus).unwrap().trap, Some(Trap::Break));
}

#[test]
fn test_division_by_zero() {
    let (mut cpu, mut bus) = setup(&["div er0, r2"]);
    cpu.regs.set_er(0, 0x1234);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.er(0), 0xFFFF);
    assert_eq!(cpu.regs.r[2], 0x34);
    assert!(cpu.regs.psw.contains(Psw::C));
}

#[test]
fn test_multiply_and_divide() {
    let (mut cpu, mut bus) = setup(&["mul er0, r2", "div er0, r3"]);
    cpu.regs.r[0] = 20;
    cpu.regs.r[2] = 13;
    cpu.regs.r[3] = 7;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.er(0), 260);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.er(0), 37);
    assert_eq!(cpu.regs.r[3], 1);
}

#[test]
fn test_bit_operations() {
    let (mut cpu, mut bus) = setup(&["sb r0.3", "tb r0.3", "rb 0x9000.0"]);
    bus.data.insert(0x9000, 0x01);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs.r[0], 0x08);
    assert!(cpu.regs.psw.contains(Psw::Z));
    run(&mut cpu, &mut bus, 1);
    assert!(!cpu.regs.psw.contains(Psw::Z));
    run(&mut cpu, &mut bus, 1);
    assert_eq!(bus.data[&0x9000], 0);
}

#[test]
fn test_reset_loads_stack_pointer() {
    let (mut cpu, mut bus) = setup(&[]);
    bus.set_code_word(0, 0x8E00);
    cpu.regs.r[5] = 9;
    cpu.write_register(RegisterName::Dsr, 4);
    cpu.reset(&bus);
    assert_eq!(cpu.regs.sp, 0x8E00);
    assert_eq!(cpu.regs.r[5], 0);
    assert_eq!(cpu.read_register(RegisterName::Dsr), 0);
}
