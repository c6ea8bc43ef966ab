// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#[cfg(test)]
mod integration_tests {
    use crate::bus::{Mmu, Region};
    use crate::config::SimulationConfig;
    use crate::decoder::assemble;
    use crate::family::{FamilyConfig, HardwareFamily};
    use crate::metrics::PerformanceMetrics;
    use crate::peripherals::standby::RunMode;
    use crate::peripherals::RegionSet;
    use crate::snapshot::MachineSnapshot;
    use crate::{
        DebugControl, Machine, Peripheral, PeripheralTickResult, SimResult, SimulationError,
        StopReason,
    };
    use std::sync::{Arc, Mutex};

    const RESET_ENTRY: usize = 0x200;
    const MASKABLE_HANDLER: usize = 0x300;
    const BREAK_HANDLER: usize = 0x380;

    fn place(rom: &mut [u8], at: usize, lines: &[&str]) {
        let mut at = at;
        for line in lines {
            for word in assemble(line).unwrap_or_else(|e| panic!("{}: {}", line, e)) {
                rom[at..at + 2].copy_from_slice(&word.to_le_bytes());
                at += 2;
            }
        }
    }

    fn set_word(rom: &mut [u8], at: usize, word: u16) {
        rom[at..at + 2].copy_from_slice(&word.to_le_bytes());
    }

    /// CLASSWIZ image: SP 0xE000, reset to 0x200, first maskable vector to
    /// 0x300, break vector to 0x380.
    fn classwiz_rom(program: &[&str], handler: &[&str], break_handler: &[&str]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x40000];
        set_word(&mut rom, 0, 0xE000);
        set_word(&mut rom, 2, RESET_ENTRY as u16);
        set_word(&mut rom, 4, BREAK_HANDLER as u16);
        set_word(&mut rom, 10, MASKABLE_HANDLER as u16);
        place(&mut rom, RESET_ENTRY, program);
        place(&mut rom, MASKABLE_HANDLER, handler);
        place(&mut rom, BREAK_HANDLER, break_handler);
        rom
    }

    fn machine_with(rom: Vec<u8>, config: &SimulationConfig) -> Machine {
        let family = FamilyConfig::new(HardwareFamily::Classwiz, false);
        Machine::new(family, config, rom, Vec::new()).unwrap()
    }

    fn create_machine(program: &[&str]) -> Machine {
        machine_with(
            classwiz_rom(program, &["mov r1, 0x55", "rti"], &["brk"]),
            &SimulationConfig::default(),
        )
    }

    fn reg(machine: &Machine, name: &str) -> u64 {
        machine.read_register(name).unwrap()
    }

    /// Requests maskable source 0 once, `after` ticks after attach.
    #[derive(Debug)]
    struct Pulse {
        after: u32,
        seen: u32,
    }

    impl Peripheral for Pulse {
        fn name(&self) -> &str {
            "Pulse"
        }

        fn attach(&mut self, _mmu: &mut Mmu) -> SimResult<()> {
            Ok(())
        }

        fn detach(&mut self, _mmu: &mut Mmu) -> SimResult<()> {
            Ok(())
        }

        fn tick(&mut self) -> PeripheralTickResult {
            self.seen += 1;
            let mut res = PeripheralTickResult::default();
            if self.seen == self.after {
                res.irqs.push(0);
            }
            res
        }
    }

    /// One read/write byte at 0xF0E0, gated by BLKCON0 bit 2.
    #[derive(Debug, Default)]
    struct Latch {
        value: Arc<Mutex<u8>>,
        regions: RegionSet,
    }

    impl Peripheral for Latch {
        fn name(&self) -> &str {
            "Latch"
        }

        fn attach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
            let rd = self.value.clone();
            let wr = self.value.clone();
            self.regions.register(
                mmu,
                Region::new(0xF0E0, 1, "Latch")
                    .on_read(move |_| *rd.lock().unwrap())
                    .on_write(move |_, v| *wr.lock().unwrap() = v),
            )
        }

        fn detach(&mut self, mmu: &mut Mmu) -> SimResult<()> {
            self.regions.release(mmu)
        }

        fn reset(&mut self) {
            *self.value.lock().unwrap() = 0;
        }

        fn block_bit(&self) -> Option<u8> {
            Some(2)
        }
    }

    #[test]
    fn test_reset_vector_and_ram_store() {
        let mut machine = create_machine(&["mov r0, 0x12", "st r0, 0xD100", "bal -1"]);
        assert_eq!(machine.cpu.regs.sp, 0xE000);

        let reason = machine.run(Some(3)).unwrap();
        assert_eq!(reason, StopReason::MaxStepsReached);
        assert_eq!(reg(&machine, "r0"), 0x12);
        assert_eq!(machine.read_memory(0xD100, 1), vec![0x12]);
        assert_eq!(machine.get_pc(), 0x206);
        assert_eq!(machine.instructions(), 3);
    }

    #[test]
    fn test_breakpoint_stops_and_resumes() {
        let mut machine =
            create_machine(&["mov r0, 1", "add r0, 1", "add r0, 1", "bal -1"]);
        machine.add_breakpoint(0x204);

        let reason = machine.run(Some(100)).unwrap();
        assert_eq!(reason, StopReason::Breakpoint(0x204));
        assert_eq!(reg(&machine, "r0"), 2);

        // Resuming from the breakpoint address does not re-trigger it
        let reason = machine.run(Some(5)).unwrap();
        assert_eq!(reason, StopReason::MaxStepsReached);
        assert_eq!(reg(&machine, "r0"), 3);

        machine.remove_breakpoint(0x204);
        assert!(machine.breakpoints.is_empty());
    }

    #[test]
    fn test_maskable_interrupt_through_sfr() {
        let mut machine = create_machine(&["sb 0xF010.1", "ei", "bal -1"]);
        machine.run(Some(3)).unwrap();
        assert_eq!(machine.read_memory(0xF010, 1), vec![0x02]);

        machine.interrupts.try_raise(0);
        assert_eq!(machine.read_memory(0xF014, 1), vec![0x02]);

        // Accepted and the first handler instruction executed
        machine.step_single().unwrap();
        assert_eq!(reg(&machine, "r1"), 0x55);
        assert_eq!(machine.cpu.regs.psw.elevel(), 1);
        assert_eq!(reg(&machine, "elr1"), 0x206);
        assert_eq!(machine.read_memory(0xF014, 1), vec![0x00]);

        machine.step_single().unwrap();
        assert_eq!(machine.get_pc(), 0x206);
        assert_eq!(machine.cpu.regs.psw.elevel(), 0);
    }

    #[test]
    fn test_disabled_source_only_latches_pending() {
        let mut machine = create_machine(&["ei", "bal -1"]);
        machine.run(Some(2)).unwrap();
        machine.interrupts.try_raise(0);
        assert_eq!(machine.interrupts.pending(), 0x02);
        assert!(!machine.interrupts.has_pending());

        machine.run(Some(3)).unwrap();
        assert_eq!(reg(&machine, "r1"), 0);
    }

    #[test]
    fn test_halt_woken_by_peripheral_interrupt() {
        let mut machine = create_machine(&[
            "sb 0xF010.1",
            "ei",
            "mov r0, 1",
            "st r0, 0xF009",
            "mov r2, 0x77",
            "bal -1",
        ]);
        machine
            .add_peripheral("Pulse", Box::new(Pulse { after: 64, seen: 0 }))
            .unwrap();

        machine.run(Some(4)).unwrap();
        assert_eq!(machine.run_mode(), RunMode::Halt);
        let executed = machine.instructions();
        machine.run_ticks(10).unwrap();
        assert_eq!(machine.instructions(), executed);

        // Wake, handler, return, then the instruction after the halt
        machine.run(Some(3)).unwrap();
        assert_eq!(machine.run_mode(), RunMode::Run);
        assert_eq!(reg(&machine, "r1"), 0x55);
        assert_eq!(reg(&machine, "r2"), 0x77);
    }

    #[test]
    fn test_halt_woken_by_pending_interrupt_while_masked() {
        let mut machine = create_machine(&[
            "sb 0xF010.1",
            "mov r0, 1",
            "st r0, 0xF009",
            "mov r2, 0x77",
            "bal -1",
        ]);
        machine
            .add_peripheral("Pulse", Box::new(Pulse { after: 64, seen: 0 }))
            .unwrap();

        machine.run(Some(3)).unwrap();
        assert_eq!(machine.run_mode(), RunMode::Halt);

        // MIE is clear: the request stays pending, yet the CPU resumes
        machine.run(Some(1)).unwrap();
        assert_eq!(machine.run_mode(), RunMode::Run);
        assert!(machine.interrupts.has_pending());
        assert_eq!(reg(&machine, "r2"), 0x77);
        assert_eq!(reg(&machine, "r1"), 0);
    }

    #[test]
    fn test_blkcon_detaches_and_restores_peripheral() {
        let mut machine = create_machine(&["mov r0, 4", "st r0, 0xF028", "bal -1"]);
        machine
            .add_peripheral("Latch", Box::new(Latch::default()))
            .unwrap();
        machine.write_memory(0xF0E0, &[0x5A]);
        assert_eq!(machine.read_memory(0xF0E0, 1), vec![0x5A]);

        machine.run(Some(3)).unwrap();
        let slot = machine.peripherals.iter().find(|p| p.name == "Latch").unwrap();
        assert!(!slot.attached);
        assert_eq!(machine.read_memory(0xF0E0, 1), vec![0x00]);
        assert!(!machine.mmu.regions().iter().any(|r| r.description == "Latch"));

        machine.write_memory(0xF028, &[0x00]);
        machine.tick().unwrap();
        let slot = machine.peripherals.iter().find(|p| p.name == "Latch").unwrap();
        assert!(slot.attached);
        machine.write_memory(0xF0E0, &[0x11]);
        assert_eq!(machine.read_memory(0xF0E0, 1), vec![0x11]);
    }

    #[test]
    fn test_reset_reattaches_blocked_peripheral_and_keeps_ram() {
        let mut machine = create_machine(&["mov r0, 4", "st r0, 0xF028", "bal -1"]);
        machine
            .add_peripheral("Latch", Box::new(Latch::default()))
            .unwrap();
        machine.write_memory(0xD400, &[0xC3]);
        machine.run(Some(3)).unwrap();

        machine.reset().unwrap();
        assert!(machine.peripherals.iter().all(|p| p.attached));
        assert_eq!(machine.read_memory(0xD400, 1), vec![0xC3]);
        assert_eq!(machine.read_memory(0xF028, 1), vec![0x00]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut machine = create_machine(&["add r0, 1", "st r0, 0xD200", "bal -4"]);
        machine.run(Some(6)).unwrap();
        assert_eq!(reg(&machine, "r0"), 2);

        let json = serde_json::to_string(&machine.snapshot()).unwrap();
        let pc = machine.get_pc();
        let instructions = machine.instructions();

        machine.run(Some(6)).unwrap();
        assert_eq!(reg(&machine, "r0"), 4);
        assert_eq!(machine.read_memory(0xD200, 1), vec![4]);

        let snapshot: MachineSnapshot = serde_json::from_str(&json).unwrap();
        machine.apply_snapshot(snapshot).unwrap();
        assert_eq!(reg(&machine, "r0"), 2);
        assert_eq!(machine.read_memory(0xD200, 1), vec![2]);
        assert_eq!(machine.get_pc(), pc);
        assert_eq!(machine.instructions(), instructions);
    }

    #[test]
    fn test_observers_see_calls_and_resets() {
        let config = SimulationConfig {
            call_stack: true,
            ..SimulationConfig::default()
        };
        let mut rom = classwiz_rom(&["bl 0:0x0340", "bal -1"], &["rti"], &["brk"]);
        place(&mut rom, 0x340, &["rt"]);
        let mut machine = machine_with(rom, &config);

        let metrics = Arc::new(PerformanceMetrics::new());
        machine.add_observer(metrics.clone());

        machine.run(Some(3)).unwrap();
        assert_eq!(metrics.get_instructions(), 3);
        assert_eq!(metrics.get_calls(), 1);
        assert_eq!(machine.cpu.call_stack().map(|t| t.depth()), Some(0));
        assert_eq!(machine.get_pc(), 0x204);

        machine.reset().unwrap();
        assert_eq!(metrics.get_resets(), 1);
    }

    #[test]
    fn test_break_at_level_two_resets_chip() {
        let mut machine = create_machine(&["mov r0, 9", "st r0, 0xD300", "brk"]);
        let metrics = Arc::new(PerformanceMetrics::new());
        machine.add_observer(metrics.clone());

        // mov, st, brk (raised), break handler's brk (reset)
        machine.run(Some(4)).unwrap();
        assert_eq!(metrics.get_resets(), 1);

        machine.step_single().unwrap();
        assert_eq!(machine.get_pc(), 0x202);
        assert_eq!(machine.read_memory(0xD300, 1), vec![9]);
    }

    #[test]
    fn test_dsr_prefix_latches_sfr() {
        let mut rom = classwiz_rom(&["dsr 2", "l r1, 0x0010", "bal -1"], &["rti"], &["brk"]);
        rom[0x20010] = 0xAB;
        let mut machine = machine_with(rom, &SimulationConfig::default());

        machine.run(Some(4)).unwrap();
        assert_eq!(reg(&machine, "r1"), 0xAB);
        assert_eq!(machine.read_memory(0xF000, 1), vec![2]);

        machine.write_memory(0xF000, &[5]);
        let latched = machine.cpu.latched_dsr();
        assert_eq!(latched.load(std::sync::atomic::Ordering::Relaxed), 5);
    }

    #[test]
    fn test_unknown_opcode_surfaces_as_error() {
        let mut rom = classwiz_rom(&[], &["rti"], &["brk"]);
        set_word(&mut rom, RESET_ENTRY, 0xFE4F);
        let mut machine = machine_with(rom, &SimulationConfig::default());
        let err = machine.run(Some(10)).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::UnknownOpcode {
                pc: 0x200,
                opcode: 0xFE4F
            }
        ));
    }

    #[test]
    fn test_emulator_ram_window_aliases_ram_tail() {
        let mut machine = create_machine(&["bal -1"]);
        machine.write_memory(0x49800, &[0x42]);
        assert_eq!(machine.read_memory(0x49800, 1), vec![0x42]);
        let regions = machine.mmu.regions();
        let ram = regions.iter().find(|r| r.description == "Ram").unwrap();
        assert_eq!((ram.base, ram.size), (0xD000, 0x2000));
        assert!(regions.iter().any(|r| r.description == "Ram/Emulator"));
    }

    #[test]
    fn test_register_names_round_trip() {
        let mut machine = create_machine(&["bal -1"]);
        for name in machine.get_register_names() {
            machine.read_register(&name).unwrap();
        }
        machine.write_register("er2", 0xBEEF).unwrap();
        assert_eq!(reg(&machine, "r2"), 0xEF);
        assert_eq!(reg(&machine, "r3"), 0xBE);
        assert!(matches!(
            machine.read_register("x9"),
            Err(SimulationError::UnknownRegister(_))
        ));
    }
}
