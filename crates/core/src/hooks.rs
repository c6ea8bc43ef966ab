// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimulationObserver;
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// Shared list of observers.
///
/// The MMU, CPU, interrupt controller and machine each hold a clone, so an
/// observer added through any of them sees every event. Observers must not
/// register further observers from inside a callback.
#[derive(Clone, Default)]
pub struct Hooks {
    observers: Arc<RwLock<Vec<Arc<dyn SimulationObserver>>>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("observers", &self.read().len())
            .finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn SimulationObserver>>> {
        self.observers.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, observer: Arc<dyn SimulationObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn clear(&self) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn simulation_start(&self) {
        for o in self.read().iter() {
            o.on_simulation_start();
        }
    }

    pub fn simulation_stop(&self) {
        for o in self.read().iter() {
            o.on_simulation_stop();
        }
    }

    pub fn step_start(&self, pc: u32, opcode: u16) {
        for o in self.read().iter() {
            o.on_step_start(pc, opcode);
        }
    }

    pub fn step_end(&self, cycles: u32) {
        for o in self.read().iter() {
            o.on_step_end(cycles);
        }
    }

    /// Returns true when any observer asks to break.
    pub fn instruction(&self, pc_before: u32, pc_after: u32) -> bool {
        let mut stop = false;
        for o in self.read().iter() {
            stop |= o.on_instruction(pc_before, pc_after);
        }
        stop
    }

    /// First observer that supplies a value wins.
    pub fn memory_read(&self, addr: u32) -> Option<u8> {
        self.read().iter().find_map(|o| o.on_memory_read(addr))
    }

    pub fn memory_write(&self, addr: u32, value: u8) -> bool {
        let mut handled = false;
        for o in self.read().iter() {
            handled |= o.on_memory_write(addr, value);
        }
        handled
    }

    pub fn interrupt(&self, index: u8) -> bool {
        let mut handled = false;
        for o in self.read().iter() {
            handled |= o.on_interrupt(index);
        }
        handled
    }

    pub fn brk(&self) -> bool {
        let mut handled = false;
        for o in self.read().iter() {
            handled |= o.on_brk();
        }
        handled
    }

    pub fn reset(&self) {
        for o in self.read().iter() {
            o.on_reset();
        }
    }

    pub fn call_function(&self, pc: u32, target: u32) {
        for o in self.read().iter() {
            o.on_call_function(pc, target);
        }
    }

    pub fn function_return(&self, pc: u32, return_to: u32) {
        for o in self.read().iter() {
            o.on_function_return(pc, return_to);
        }
    }

    pub fn peripheral_tick(&self, name: &str, cycles: u32) {
        for o in self.read().iter() {
            o.on_peripheral_tick(name, cycles);
        }
    }
}
