// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod call_stack;
pub mod clock;
pub mod config;
pub mod cpu;
pub mod decoder;
pub mod family;
pub mod hooks;
pub mod interrupt;
pub mod machine;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod runner;
pub mod snapshot;
pub mod system;

use std::any::Any;

mod tests;

pub use machine::Machine;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("MMU region overlap at {0:#08x}")]
    RegionOverlap(u32),
    #[error("MMU region double-hole at {0:#08x}")]
    RegionHole(u32),
    #[error("Segment {0:#04x} has no dispatch table")]
    SegmentMissing(u8),
    #[error("Unknown opcode {opcode:#06x} at {pc:#07x}")]
    UnknownOpcode { pc: u32, opcode: u16 },
    #[error("Assembly error: {0}")]
    Assembly(String),
    #[error("{0} is not a valid maskable interrupt index")]
    InvalidInterrupt(usize),
    #[error("Unknown register '{0}'")]
    UnknownRegister(String),
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Which clock a peripheral is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockDomain {
    /// Ticked on every chipset tick.
    Always,
    Lsclk,
    Hsclk,
    #[default]
    Sysclk,
}

#[derive(Debug, Clone, Default)]
pub struct PeripheralTickResult {
    /// Maskable interrupt sources (0-based) the peripheral requests.
    pub irqs: Vec<usize>,
    /// Request the non-maskable interrupt.
    pub nmi: bool,
    pub cycles: u32,
}

/// Trait for observing simulation events in a modular way.
///
/// Methods returning `bool` (or `Some`) mark the event as handled: the core
/// then skips its default behavior for that event.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_simulation_stop(&self) {}
    fn on_step_start(&self, _pc: u32, _opcode: u16) {}
    fn on_step_end(&self, _cycles: u32) {}
    /// Called after every executed instruction. Returning `true` requests a break.
    fn on_instruction(&self, _pc_before: u32, _pc_after: u32) -> bool {
        false
    }
    fn on_memory_read(&self, _addr: u32) -> Option<u8> {
        None
    }
    fn on_memory_write(&self, _addr: u32, _value: u8) -> bool {
        false
    }
    fn on_interrupt(&self, _index: u8) -> bool {
        false
    }
    fn on_brk(&self) -> bool {
        false
    }
    fn on_reset(&self) {}
    fn on_call_function(&self, _pc: u32, _target: u32) {}
    fn on_function_return(&self, _pc: u32, _return_to: u32) {}
    fn on_peripheral_tick(&self, _name: &str, _cycles: u32) {}
}

/// Byte-addressable data bus plus the code fetch port.
pub trait Bus {
    fn read_code(&self, addr: u32) -> u16;
    fn read_data(&mut self, addr: u32) -> u8;
    fn write_data(&mut self, addr: u32, value: u8);

    /// Read without firing memory hooks.
    fn peek_data(&mut self, addr: u32) -> u8 {
        self.read_data(addr)
    }

    /// Segment of the last sentinel read that corrupts the DSR, if any.
    fn take_dsr_fault(&mut self) -> Option<u8> {
        None
    }
}

/// Trait representing a memory-mapped peripheral.
///
/// Peripherals own the MMU regions they register in `attach` and release
/// them in `detach`.
pub trait Peripheral: std::fmt::Debug + Send {
    fn name(&self) -> &str;
    fn attach(&mut self, mmu: &mut bus::Mmu) -> SimResult<()>;
    fn detach(&mut self, mmu: &mut bus::Mmu) -> SimResult<()>;
    fn reset(&mut self) {}
    fn tick(&mut self) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }
    fn clock(&self) -> ClockDomain {
        ClockDomain::Sysclk
    }
    /// BLKCON0 bit that gates this peripheral.
    fn block_bit(&self) -> Option<u8> {
        None
    }
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}

/// Trait for controlling the machine in debug mode
pub trait DebugControl {
    fn add_breakpoint(&mut self, addr: u32);
    fn remove_breakpoint(&mut self, addr: u32);
    fn clear_breakpoints(&mut self);

    /// Run until breakpoint or steps limit
    fn run(&mut self, max_steps: Option<u32>) -> SimResult<StopReason>;

    /// Execute exactly one instruction
    fn step_single(&mut self) -> SimResult<StopReason>;

    fn read_register(&self, name: &str) -> SimResult<u64>;
    fn write_register(&mut self, name: &str, val: u64) -> SimResult<()>;

    fn read_memory(&mut self, addr: u32, len: usize) -> Vec<u8>;
    fn write_memory(&mut self, addr: u32, data: &[u8]);

    fn get_pc(&self) -> u32;
    fn set_pc(&mut self, addr: u32);
    fn get_register_names(&self) -> Vec<String>;
    fn get_cycle_count(&self) -> u64;
    fn reset(&mut self) -> SimResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Breakpoint(u32),
    StepDone,
    MaxStepsReached,
    ManualStop,
}
