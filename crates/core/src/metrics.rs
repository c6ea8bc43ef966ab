// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimulationObserver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Counting observer: instructions, cycles, interrupts and IPS.
#[derive(Debug)]
pub struct PerformanceMetrics {
    instruction_count: AtomicU64,
    cycle_count: AtomicU64,
    interrupt_count: AtomicU64,
    reset_count: AtomicU64,
    call_count: AtomicU64,
    peripheral_cycles_by_name: Mutex<HashMap<String, u64>>,
    start_time: Mutex<Instant>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            instruction_count: AtomicU64::new(0),
            cycle_count: AtomicU64::new(0),
            interrupt_count: AtomicU64::new(0),
            reset_count: AtomicU64::new(0),
            call_count: AtomicU64::new(0),
            peripheral_cycles_by_name: Mutex::new(HashMap::new()),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        self.instruction_count.store(0, Ordering::SeqCst);
        self.cycle_count.store(0, Ordering::SeqCst);
        self.interrupt_count.store(0, Ordering::SeqCst);
        self.reset_count.store(0, Ordering::SeqCst);
        self.call_count.store(0, Ordering::SeqCst);
        if let Ok(mut m) = self.peripheral_cycles_by_name.lock() {
            m.clear();
        }
        if let Ok(mut t) = self.start_time.lock() {
            *t = Instant::now();
        }
    }

    pub fn get_instructions(&self) -> u64 {
        self.instruction_count.load(Ordering::SeqCst)
    }

    pub fn get_cycles(&self) -> u64 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    /// Interrupt requests seen by the controller, handled or not.
    pub fn get_interrupts(&self) -> u64 {
        self.interrupt_count.load(Ordering::SeqCst)
    }

    pub fn get_resets(&self) -> u64 {
        self.reset_count.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn get_peripheral_cycles(&self, name: &str) -> u64 {
        self.peripheral_cycles_by_name
            .lock()
            .ok()
            .and_then(|m| m.get(name).copied())
            .unwrap_or(0)
    }

    pub fn get_ips(&self) -> f64 {
        let elapsed = self
            .start_time
            .lock()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_instructions() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for PerformanceMetrics {
    fn on_step_start(&self, _pc: u32, _opcode: u16) {
        self.instruction_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_step_end(&self, cycles: u32) {
        self.cycle_count.fetch_add(cycles as u64, Ordering::SeqCst);
    }

    fn on_interrupt(&self, _index: u8) -> bool {
        self.interrupt_count.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn on_reset(&self) {
        self.reset_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_call_function(&self, _pc: u32, _target: u32) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_peripheral_tick(&self, name: &str, cycles: u32) {
        if cycles == 0 {
            return;
        }
        self.cycle_count.fetch_add(cycles as u64, Ordering::SeqCst);
        if let Ok(mut m) = self.peripheral_cycles_by_name.lock() {
            *m.entry(name.to_string()).or_insert(0) += cycles as u64;
        }
    }
}
