// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use nxu8_core::config::SimulationConfig;
use nxu8_core::decoder::assemble;
use nxu8_core::family::{FamilyConfig, HardwareFamily};
use nxu8_core::peripherals::standby::RunMode;
use nxu8_core::{DebugControl, Machine, SimulationObserver};
use std::sync::{Arc, Mutex};

/// Image with SP at word 0, reset entry 0x200 at word 1 and `program` at 0x200.
fn image(size: usize, sp: u16, program: &[&str]) -> Vec<u8> {
    let mut rom = vec![0u8; size];
    rom[0..2].copy_from_slice(&sp.to_le_bytes());
    rom[2..4].copy_from_slice(&0x0200u16.to_le_bytes());
    let mut at = 0x200;
    for line in program {
        for word in assemble(line).unwrap() {
            rom[at..at + 2].copy_from_slice(&word.to_le_bytes());
            at += 2;
        }
    }
    rom
}

fn machine(family: HardwareFamily, real: bool, rom: Vec<u8>) -> Machine {
    Machine::new(
        FamilyConfig::new(family, real),
        &SimulationConfig::default(),
        rom,
        Vec::new(),
    )
    .unwrap()
}

#[derive(Debug, Default)]
struct MemorySpy {
    writes: Mutex<Vec<(u32, u8)>>,
}

impl SimulationObserver for MemorySpy {
    fn on_memory_read(&self, addr: u32) -> Option<u8> {
        (addr == 0xD050).then_some(0x99)
    }

    fn on_memory_write(&self, addr: u32, value: u8) -> bool {
        self.writes.lock().unwrap().push((addr, value));
        addr == 0xD123
    }
}

#[test]
fn test_es_plus_rom_mirror_and_ram() {
    let mut rom = image(0x20000, 0x8E00, &["mov r0, 0x21", "st r0, 0x8010", "bal -1"]);
    rom[0x10] = 0x5C;
    rom[0x10010] = 0x6D;
    let mut m = machine(HardwareFamily::EsPlus, false, rom);

    m.run(Some(3)).unwrap();
    assert_eq!(m.read_memory(0x8010, 1), vec![0x21]);
    assert_eq!(m.read_memory(0x80010, 1), vec![0x5C]);
    assert_eq!(m.read_memory(0x10010, 1), vec![0x6D]);
    // Emulator RAM window backed by the RAM tail
    m.write_memory(0x9800, &[0x3E]);
    assert_eq!(m.read_memory(0x9800, 1), vec![0x3E]);
}

#[test]
fn test_rom_window_ignores_writes() {
    let mut m = machine(HardwareFamily::Classwiz, false, image(0x40000, 0xE000, &["bal -1"]));
    let before = m.read_memory(0x0200, 2);
    m.write_memory(0x0200, &[0xAA, 0xBB]);
    assert_eq!(m.read_memory(0x0200, 2), before);
}

#[test]
fn test_fx5800p_sentinel_reads_ones() {
    let mut m = machine(HardwareFamily::Fx5800p, false, image(0x20000, 0x8E00, &["bal -1"]));
    assert_eq!(m.read_memory(0x10_0000, 1), vec![0xFF]);
}

#[test]
fn test_ti_interrupt_sfr_is_wider() {
    let m = machine(HardwareFamily::Ti, false, image(0x20000, 0xC000, &["bal -1"]));
    let regions = m.mmu.regions();
    let ie = regions
        .iter()
        .find(|r| r.description == "InterruptSfr/IE")
        .unwrap();
    assert_eq!((ie.base, ie.size), (0xF010, 8));
    assert!(regions.iter().all(|r| r.description != "BlockControl/BLKCON0"));
}

#[test]
fn test_emulated_clock_runs_one_instruction_per_tick() {
    let mut m = machine(
        HardwareFamily::Classwiz,
        false,
        image(0x40000, 0xE000, &["add r0, 1", "bal -2"]),
    );
    m.run_ticks(100).unwrap();
    assert_eq!(m.instructions(), 100);
    assert_eq!(m.ticks(), 100);
}

#[test]
fn test_real_hardware_clock_divides_sysclk() {
    let mut m = machine(
        HardwareFamily::ClasswizII,
        true,
        image(0x60000, 0xE000, &["add r0, 1", "bal -2"]),
    );
    m.run_ticks(1000).unwrap();
    assert!(m.instructions() > 0);
    assert!(m.instructions() <= 500);
}

#[test]
fn test_stop_needs_unlock_sequence() {
    let mut m = machine(HardwareFamily::Classwiz, false, image(0x40000, 0xE000, &["bal -1"]));
    m.step_single().unwrap();

    m.write_memory(0xF009, &[0x02]);
    assert_eq!(m.run_mode(), RunMode::Run);

    m.write_memory(0xF008, &[0x50]);
    m.write_memory(0xF008, &[0xA0]);
    m.write_memory(0xF009, &[0x02]);
    assert_eq!(m.run_mode(), RunMode::Stop);

    let executed = m.instructions();
    m.run_ticks(50).unwrap();
    assert_eq!(m.instructions(), executed);

    m.reset().unwrap();
    assert_eq!(m.run_mode(), RunMode::Run);
}

#[test]
fn test_memory_hooks_override_and_swallow() {
    let mut m = machine(
        HardwareFamily::Classwiz,
        false,
        image(
            0x40000,
            0xE000,
            &[
                "l r0, 0xD050",
                "mov r1, 7",
                "st r1, 0xD123",
                "st r1, 0xD124",
                "bal -1",
            ],
        ),
    );
    let spy = Arc::new(MemorySpy::default());
    m.add_observer(spy.clone());

    m.run(Some(5)).unwrap();
    assert_eq!(m.read_register("r0").unwrap(), 0x99);
    // Debugger access bypasses the hooks
    assert_eq!(m.read_memory(0xD050, 1), vec![0x00]);
    assert_eq!(m.read_memory(0xD123, 1), vec![0x00]);
    assert_eq!(m.read_memory(0xD124, 1), vec![0x07]);
    assert_eq!(
        *spy.writes.lock().unwrap(),
        vec![(0xD123, 0x07), (0xD124, 0x07)]
    );
}

#[test]
fn test_set_pc_and_step() {
    let mut m = machine(
        HardwareFamily::Classwiz,
        false,
        image(0x40000, 0xE000, &["bal -1", "mov r0, 0x44", "bal -1"]),
    );
    m.step_single().unwrap();
    m.set_pc(0x202);
    m.step_single().unwrap();
    assert_eq!(m.read_register("r0").unwrap(), 0x44);
    assert_eq!(m.get_pc(), 0x204);
}
