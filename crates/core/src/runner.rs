// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Background thread that drives a [`Machine`].
//!
//! Real-hardware models are paced against the wall clock in
//! [`TIMER_INTERVAL_MS`] slices; emulated models free-run in batches. The
//! machine sits behind one coarse lock held for a whole batch.

use crate::clock::{Cycles, TIMER_INTERVAL_MS};
use crate::Machine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Ticks per lock acquisition when free-running.
pub const FREE_RUN_BATCH: u64 = 10_000;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug)]
pub struct Emulator {
    machine: Arc<Mutex<Machine>>,
    cycles: Arc<Mutex<Cycles>>,
    nominal_cps: u64,
    real_hardware: bool,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    thread: Option<JoinHandle<()>>,
}

impl Emulator {
    pub fn new(machine: Machine) -> Self {
        let nominal_cps = machine.family().cycles_per_second;
        let real_hardware = machine.family().real_hardware;
        Self {
            machine: Arc::new(Mutex::new(machine)),
            cycles: Arc::new(Mutex::new(Cycles::new(nominal_cps, TIMER_INTERVAL_MS))),
            nominal_cps,
            real_hardware,
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
            thread: None,
        }
    }

    /// Spawn the tick thread. No-op when already running.
    pub fn start(&mut self) {
        if self.thread.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        lock(&self.cycles).reset();

        let machine = self.machine.clone();
        let running = self.running.clone();
        let paused = self.paused.clone();
        let last_error = self.last_error.clone();

        let handle = if self.real_hardware {
            let cycles = self.cycles.clone();
            std::thread::spawn(move || {
                let interval = Duration::from_millis(TIMER_INTERVAL_MS);
                let mut iteration_end = Instant::now();
                while running.load(Ordering::SeqCst) {
                    // Owed ticks are consumed while paused, not banked
                    let owed = lock(&cycles).delta();
                    if !paused.load(Ordering::SeqCst) {
                        if let Err(e) = lock(&machine).run_ticks(owed) {
                            error!("Runner: {}", e);
                            *lock(&last_error) = Some(e.to_string());
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                    }

                    iteration_end += interval;
                    let now = Instant::now();
                    if iteration_end > now {
                        std::thread::sleep(iteration_end - now);
                    } else {
                        iteration_end = now;
                    }
                }
            })
        } else {
            std::thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    if paused.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(1));
                        continue;
                    }
                    if let Err(e) = lock(&machine).run_ticks(FREE_RUN_BATCH) {
                        error!("Runner: {}", e);
                        *lock(&last_error) = Some(e.to_string());
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    std::thread::yield_now();
                }
            })
        };
        info!(
            "Runner: started ({})",
            if self.real_hardware { "paced" } else { "free-running" }
        );
        self.thread = Some(handle);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Error that stopped the thread, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Stop the thread and wait for it.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Runner: tick thread panicked");
            }
            info!("Runner: stopped");
        }
    }

    /// Scale the paced rate by `factor` (1.0 is nominal).
    pub fn set_clock_speed(&self, factor: f64) {
        lock(&self.cycles).set_clock_speed(self.nominal_cps, factor);
    }

    pub fn cycles_per_second(&self) -> u64 {
        lock(&self.cycles).cycles_per_second
    }

    /// Run `f` with the machine locked.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut Machine) -> R) -> R {
        f(&mut lock(&self.machine))
    }

    pub fn machine(&self) -> Arc<Mutex<Machine>> {
        self.machine.clone()
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::decoder::assembler::Assembler;
    use crate::family::{FamilyConfig, HardwareFamily};

    fn spin_machine(real: bool) -> Machine {
        let mut asm = Assembler::new();
        asm.assemble_source("add r0, 1\nbal -2\n").unwrap();
        let mut rom = vec![0u8; 0x200];
        rom[0..2].copy_from_slice(&0xE000u16.to_le_bytes());
        rom[2..4].copy_from_slice(&0x0100u16.to_le_bytes());
        rom[0x100..0x100 + asm.bytes().len()].copy_from_slice(asm.bytes());
        let family = FamilyConfig::new(HardwareFamily::Classwiz, real);
        Machine::new(family, &SimulationConfig::default(), rom, Vec::new()).unwrap()
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_free_run_pause_shutdown() {
        let mut emu = Emulator::new(spin_machine(false));
        emu.start();
        assert!(wait_for(|| emu.with_machine(|m| m.instructions()) > 1000));

        emu.pause();
        std::thread::sleep(Duration::from_millis(20));
        let frozen = emu.with_machine(|m| m.instructions());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(emu.with_machine(|m| m.instructions()), frozen);

        emu.resume();
        assert!(wait_for(|| emu.with_machine(|m| m.instructions()) > frozen));
        emu.shutdown();
        assert!(!emu.is_running());
        assert!(emu.last_error().is_none());
    }

    #[test]
    fn test_paced_run_advances() {
        let mut emu = Emulator::new(spin_machine(true));
        emu.set_clock_speed(0.5);
        assert_eq!(emu.cycles_per_second(), 1_048_576);
        emu.start();
        assert!(wait_for(|| emu.with_machine(|m| m.ticks()) > 10_000));
        emu.shutdown();
    }
}
