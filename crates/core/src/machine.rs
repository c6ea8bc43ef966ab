// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The chipset: CPU, MMU, interrupt controller and peripherals driven one
//! system-clock tick at a time.

use crate::bus::Mmu;
use crate::config::SimulationConfig;
use crate::cpu::{Cpu, RegisterName, StepOutcome, Trap};
use crate::family::{FamilyConfig, HardwareFamily};
use crate::hooks::Hooks;
use crate::interrupt::{BreakAction, InterruptController};
use crate::memory::{pad_rom, prepare_fx5800p_flash};
use crate::peripherals::blkcon::{BlockControl, BlockHandle};
use crate::peripherals::clock_generator::{ClockGenerator, ClockHandle, ClockTicks};
use crate::peripherals::interrupt_sfr::InterruptSfr;
use crate::peripherals::misc::Misc;
use crate::peripherals::ram::Ram;
use crate::peripherals::rom_window::RomWindow;
use crate::peripherals::standby::{RunMode, RunState, StandbyControl};
use crate::snapshot::MachineSnapshot;
use crate::{DebugControl, Peripheral, SimResult, SimulationObserver, StopReason};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Ticks `step` waits for an instruction before giving up (halted CPU with
/// nothing to wake it).
pub const MAX_IDLE_TICKS: u32 = 1 << 20;

#[derive(Debug)]
pub struct PeripheralSlot {
    pub name: String,
    pub dev: Box<dyn Peripheral>,
    /// False while BLKCON0 holds the block powered down.
    pub attached: bool,
}

#[derive(Debug)]
pub struct Machine {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub interrupts: Arc<InterruptController>,
    pub peripherals: Vec<PeripheralSlot>,
    pub hooks: Hooks,

    // Debug state
    pub breakpoints: HashSet<u32>,
    pub total_cycles: u64,

    family: FamilyConfig,
    run: RunState,
    clock: ClockHandle,
    blkcon: Option<BlockHandle>,
    ticks: u64,
    instructions: u64,
}

impl Machine {
    /// Build a chip with its built-in peripherals and put it through reset.
    pub fn new(
        family: FamilyConfig,
        config: &SimulationConfig,
        rom: Vec<u8>,
        flash: Vec<u8>,
    ) -> SimResult<Self> {
        let rom: Arc<[u8]> = pad_rom(rom, family.rom_size).into();
        let flash: Arc<[u8]> = if family.family == HardwareFamily::Fx5800p {
            prepare_fx5800p_flash(flash).into()
        } else {
            flash.into()
        };

        let hooks = Hooks::new();
        let mmu = Mmu::new(&family, rom, flash, hooks.clone());
        let mut cpu = Cpu::new(&family, hooks.clone());
        cpu.enable_call_stack(config.call_stack);
        let interrupts = Arc::new(InterruptController::new(&family, hooks.clone()));

        let run = RunState::default();
        let clock_generator = ClockGenerator::new(&family);
        let clock = clock_generator.handle();
        let block_control = family.blkcon_mask().map(BlockControl::new);
        let blkcon = block_control.as_ref().map(BlockControl::handle);

        let mut machine = Self {
            cpu,
            mmu,
            interrupts,
            peripherals: Vec::new(),
            hooks,
            breakpoints: HashSet::new(),
            total_cycles: 0,
            family,
            run,
            clock,
            blkcon,
            ticks: 0,
            instructions: 0,
        };

        let windows = machine.family.rom_windows();
        machine.add_peripheral(
            "RomWindow",
            Box::new(RomWindow::new(windows, config.strict_memory)),
        )?;
        let ram = Ram::new(&machine.family);
        machine.add_peripheral("Ram", Box::new(ram))?;
        let misc = Misc::new(
            machine.cpu.latched_dsr(),
            machine.cpu.dsr_mask(),
            machine.family.has_segment_access_sfr(),
        );
        machine.add_peripheral("Misc", Box::new(misc))?;
        let standby = StandbyControl::new(machine.run.clone());
        machine.add_peripheral("StandbyControl", Box::new(standby))?;
        machine.add_peripheral("ClockGenerator", Box::new(clock_generator))?;
        if let Some(block_control) = block_control {
            machine.add_peripheral("BlockControl", Box::new(block_control))?;
        }
        let sfr = InterruptSfr::new(machine.interrupts.clone());
        machine.add_peripheral("InterruptSfr", Box::new(sfr))?;

        info!(
            "Machine: {:?} ({}), {} Hz, {} regions",
            machine.family.family,
            if machine.family.real_hardware {
                "real hardware"
            } else {
                "emulated"
            },
            machine.family.cycles_per_second,
            machine.mmu.regions().len()
        );

        machine.reset()?;
        Ok(machine)
    }

    pub fn family(&self) -> &FamilyConfig {
        &self.family
    }

    /// Attach a peripheral's regions and add it to the tick list.
    pub fn add_peripheral(&mut self, name: &str, mut dev: Box<dyn Peripheral>) -> SimResult<()> {
        dev.attach(&mut self.mmu)?;
        self.peripherals.push(PeripheralSlot {
            name: name.to_string(),
            dev,
            attached: true,
        });
        Ok(())
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.hooks.add(observer);
    }

    /// First peripheral of type `T`.
    pub fn peripheral<T: 'static>(&self) -> Option<&T> {
        self.peripherals
            .iter()
            .find_map(|p| p.dev.as_any().and_then(|a| a.downcast_ref::<T>()))
    }

    pub fn peripheral_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find_map(|p| p.dev.as_any_mut().and_then(|a| a.downcast_mut::<T>()))
    }

    pub fn peek_peripheral(&self, name: &str) -> Option<serde_json::Value> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.dev.snapshot())
    }

    pub fn run_mode(&self) -> RunMode {
        self.run.get()
    }

    pub fn set_run_mode(&mut self, mode: RunMode) {
        self.run.set(mode);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Chip reset. RAM contents survive; blocked peripherals are powered
    /// back up; RESET becomes the only active interrupt.
    pub fn reset(&mut self) -> SimResult<()> {
        info!("Machine: reset");
        self.mmu.flags().set_segment_access(false);
        self.hooks.reset();

        for slot in &mut self.peripherals {
            if !slot.attached {
                slot.dev.attach(&mut self.mmu)?;
                slot.attached = true;
            }
            slot.dev.reset();
        }

        self.cpu.reset(&self.mmu);
        self.interrupts.raise_reset();
        self.run.set(RunMode::Run);
        Ok(())
    }

    /// Detach every peripheral whose block bit is set in `value` and
    /// re-attach every one whose bit is clear.
    fn apply_blkcon(&mut self, value: u8) -> SimResult<()> {
        for slot in &mut self.peripherals {
            let Some(bit) = slot.dev.block_bit() else {
                continue;
            };
            let blocked = value & (1 << bit) != 0;
            if blocked && slot.attached {
                debug!("BLKCON: {} off", slot.name);
                slot.dev.detach(&mut self.mmu)?;
                slot.attached = false;
            } else if !blocked && !slot.attached {
                debug!("BLKCON: {} on", slot.name);
                slot.dev.attach(&mut self.mmu)?;
                slot.dev.reset();
                slot.attached = true;
            }
        }
        Ok(())
    }

    fn tick_peripherals(&mut self) -> ClockTicks {
        let gate = self.clock.gate(self.run.get() == RunMode::Stop);
        for slot in &mut self.peripherals {
            if !slot.attached || !gate.fired(slot.dev.clock()) {
                continue;
            }
            let res = slot.dev.tick();
            if res.cycles > 0 {
                self.total_cycles += res.cycles as u64;
                self.hooks.peripheral_tick(&slot.name, res.cycles);
            }
            for irq in res.irqs {
                self.interrupts.try_raise(irq);
            }
            if res.nmi {
                self.interrupts.request_nonmaskable();
            }
        }
        gate
    }

    /// One system-clock tick: peripherals, interrupt acceptance, then one
    /// instruction when running. Returns the instruction executed, if any.
    pub fn tick(&mut self) -> SimResult<Option<StepOutcome>> {
        self.ticks += 1;
        let gate = self.tick_peripherals();

        if let Some(value) = self.blkcon.as_ref().and_then(BlockHandle::take_changed) {
            self.apply_blkcon(value)?;
        }

        if self.interrupts.has_pending() {
            self.interrupts.accept(&mut self.cpu, &self.mmu);
            self.run.set(RunMode::Run);
        }

        if !self.run.is_running() || !gate.sysclk {
            return Ok(None);
        }

        let outcome = self.cpu.next(&mut self.mmu)?;
        self.instructions += 1;
        self.total_cycles += outcome.cycles as u64;
        if let Some(trap) = outcome.trap {
            self.handle_trap(trap)?;
        }
        Ok(Some(outcome))
    }

    fn handle_trap(&mut self, trap: Trap) -> SimResult<()> {
        match trap {
            Trap::Software(n) => self.interrupts.raise_software(n),
            Trap::Emulator => self.interrupts.raise_emulator(),
            Trap::Break => {
                let elevel = self.cpu.regs.psw.elevel();
                if self.interrupts.break_request(elevel) == BreakAction::Reset {
                    info!("Machine: BRK at exception level {}, resetting", elevel);
                    self.reset()?;
                }
            }
        }
        Ok(())
    }

    /// Tick until one instruction has executed.
    pub fn step(&mut self) -> SimResult<Option<StepOutcome>> {
        for _ in 0..MAX_IDLE_TICKS {
            if let Some(outcome) = self.tick()? {
                return Ok(Some(outcome));
            }
        }
        debug!("Machine: no instruction in {} ticks", MAX_IDLE_TICKS);
        Ok(None)
    }

    /// Run `count` chipset ticks.
    pub fn run_ticks(&mut self, count: u64) -> SimResult<()> {
        for _ in 0..count {
            self.tick()?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            cpu: self.cpu.snapshot(),
            interrupts: self.interrupts.snapshot(),
            peripherals: self
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
            run_mode: self.run.get(),
            ticks: self.ticks,
            instructions: self.instructions,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: MachineSnapshot) -> SimResult<()> {
        self.interrupts.restore(&snapshot.interrupts)?;
        for p in &mut self.peripherals {
            if let Some(state) = snapshot.peripherals.get(&p.name) {
                p.dev.restore(state.clone())?;
            }
        }
        self.cpu.apply_snapshot(&snapshot.cpu);
        self.run.set(snapshot.run_mode);
        self.ticks = snapshot.ticks;
        self.instructions = snapshot.instructions;
        Ok(())
    }
}

impl DebugControl for Machine {
    fn add_breakpoint(&mut self, addr: u32) {
        self.breakpoints.insert(addr);
    }

    fn remove_breakpoint(&mut self, addr: u32) {
        self.breakpoints.remove(&addr);
    }

    fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    fn run(&mut self, max_steps: Option<u32>) -> SimResult<StopReason> {
        self.hooks.simulation_start();
        let mut steps = 0;
        let reason = loop {
            // A breakpoint at the starting PC does not stop a resumed run
            let pc = self.cpu.code_address();
            if steps > 0 && self.breakpoints.contains(&pc) {
                break StopReason::Breakpoint(pc);
            }

            let Some(outcome) = self.step()? else {
                break StopReason::ManualStop;
            };
            steps += 1;
            if outcome.break_requested {
                break StopReason::ManualStop;
            }

            if let Some(max) = max_steps {
                if steps >= max {
                    break StopReason::MaxStepsReached;
                }
            }
        };
        self.hooks.simulation_stop();
        Ok(reason)
    }

    fn step_single(&mut self) -> SimResult<StopReason> {
        match self.step()? {
            Some(_) => Ok(StopReason::StepDone),
            None => Ok(StopReason::ManualStop),
        }
    }

    fn read_register(&self, name: &str) -> SimResult<u64> {
        let reg: RegisterName = name.parse()?;
        Ok(self.cpu.read_register(reg))
    }

    fn write_register(&mut self, name: &str, val: u64) -> SimResult<()> {
        let reg: RegisterName = name.parse()?;
        self.cpu.write_register(reg, val);
        Ok(())
    }

    fn read_memory(&mut self, addr: u32, len: usize) -> Vec<u8> {
        (0..len as u32)
            .map(|i| self.mmu.peek(addr.wrapping_add(i)))
            .collect()
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.mmu.poke(addr.wrapping_add(i as u32), *byte);
        }
    }

    fn get_pc(&self) -> u32 {
        self.cpu.code_address()
    }

    fn set_pc(&mut self, addr: u32) {
        self.cpu.regs.pc = addr as u16;
        self.cpu.regs.csr = (addr >> 16) as u8 & 0x0F;
    }

    fn get_register_names(&self) -> Vec<String> {
        RegisterName::all().iter().map(|r| r.to_string()).collect()
    }

    fn get_cycle_count(&self) -> u64 {
        self.total_cycles
    }

    fn reset(&mut self) -> SimResult<()> {
        Machine::reset(self)
    }
}
