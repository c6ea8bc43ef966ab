// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Interrupt lines, the mask/pending SFRs and acceptance priority.

use crate::cpu::{Cpu, Psw};
use crate::family::FamilyConfig;
use crate::hooks::Hooks;
use crate::snapshot::InterruptSnapshot;
use crate::{Bus, SimResult, SimulationError};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

pub const INT_RESET: usize = 1;
pub const INT_BREAK: usize = 2;
pub const INT_EMULATOR: usize = 3;
pub const INT_NONMASKABLE: usize = 4;
pub const INT_MASKABLE: usize = 5;
pub const INT_SOFTWARE: usize = 0x40;
pub const INT_COUNT: usize = 0x80;

/// One maskable request line and its enable bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSource {
    /// Vector raised when the source fires.
    pub vector: usize,
    pub enabled: bool,
}

/// What a BRK request turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakAction {
    /// Already at exception level 2 or above: the chip resets.
    Reset,
    /// An observer took the break.
    Handled,
    Raised,
}

#[derive(Debug)]
struct LineState {
    active: [bool; INT_COUNT],
    pending_count: usize,
    /// Bit 0 is the NMI enable, bit i+1 the enable of source i.
    mask: u64,
    /// Bit 0 is the NMI request, bit i+1 the request of source i.
    pending: u64,
    sources: Vec<InterruptSource>,
    mi_blocked: bool,
    /// Writable bits of both SFRs.
    sfr_bits: u64,
}

impl LineState {
    fn activate(&mut self, index: usize) {
        if !self.active[index] {
            self.active[index] = true;
            self.pending_count += 1;
        }
    }

    fn deactivate(&mut self, index: usize) {
        if self.active[index] {
            self.active[index] = false;
            self.pending_count -= 1;
        }
    }

    fn clear(&mut self) {
        self.active = [false; INT_COUNT];
        self.pending_count = 0;
    }
}

#[derive(Debug)]
pub struct InterruptController {
    state: Mutex<LineState>,
    sfr_width: u32,
    hooks: Hooks,
}

fn is_maskable(index: usize) -> bool {
    (INT_MASKABLE..INT_SOFTWARE).contains(&index)
}

/// Exception level an accepted vector runs at.
pub fn target_level(index: usize) -> u8 {
    match index {
        INT_RESET => 0,
        INT_BREAK | INT_NONMASKABLE => 2,
        INT_EMULATOR => 3,
        _ => 1,
    }
}

impl InterruptController {
    pub fn new(config: &FamilyConfig, hooks: Hooks) -> Self {
        let sources: Vec<InterruptSource> = config
            .maskable_vectors()
            .into_iter()
            .map(|vector| InterruptSource {
                vector,
                enabled: false,
            })
            .collect();
        let low = if config.watchdog_interrupt() { 1 } else { 2 };
        let sfr_bits = (1u64 << (sources.len() + 1)) - low;
        Self {
            state: Mutex::new(LineState {
                active: [false; INT_COUNT],
                pending_count: 0,
                mask: 0,
                pending: 0,
                sources,
                mi_blocked: false,
                sfr_bits,
            }),
            sfr_width: config.interrupt_sfr_width(),
            hooks,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Size in bytes of each of the mask and pending SFRs.
    pub fn sfr_width(&self) -> u32 {
        self.sfr_width
    }

    pub fn source_count(&self) -> usize {
        self.lock().sources.len()
    }

    pub fn sources(&self) -> Vec<InterruptSource> {
        self.lock().sources.clone()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending_count > 0
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending_count
    }

    pub fn is_active(&self, index: usize) -> bool {
        index < INT_COUNT && self.lock().active[index]
    }

    pub fn mi_blocked(&self) -> bool {
        self.lock().mi_blocked
    }

    pub fn set_mi_blocked(&self, blocked: bool) {
        self.lock().mi_blocked = blocked;
    }

    pub fn raise_maskable(&self, index: usize) -> SimResult<()> {
        if !is_maskable(index) {
            return Err(SimulationError::InvalidInterrupt(index));
        }
        if self.hooks.interrupt(index as u8) {
            return Ok(());
        }
        self.lock().activate(index);
        Ok(())
    }

    pub fn reset_maskable(&self, index: usize) -> SimResult<()> {
        if !is_maskable(index) {
            return Err(SimulationError::InvalidInterrupt(index));
        }
        self.lock().deactivate(index);
        Ok(())
    }

    pub fn raise_nonmaskable(&self) {
        if self.hooks.interrupt(INT_NONMASKABLE as u8) {
            return;
        }
        self.lock().activate(INT_NONMASKABLE);
    }

    /// Latch the NMI request; it is raised once its enable bit is set.
    pub fn request_nonmaskable(&self) {
        let enabled = {
            let mut state = self.lock();
            state.pending |= 1;
            state.mask & 1 != 0
        };
        if enabled {
            self.raise_nonmaskable();
        }
    }

    pub fn reset_nonmaskable(&self) {
        self.lock().deactivate(INT_NONMASKABLE);
    }

    /// `SWI #n`.
    pub fn raise_software(&self, n: u8) {
        self.lock().activate(INT_SOFTWARE + (n as usize & 0x3F));
    }

    pub fn raise_emulator(&self) {
        self.lock().activate(INT_EMULATOR);
    }

    /// `BRK`. Above exception level 1 the caller must reset the chip.
    pub fn break_request(&self, elevel: u8) -> BreakAction {
        if elevel > 1 {
            return BreakAction::Reset;
        }
        if self.hooks.brk() {
            return BreakAction::Handled;
        }
        self.lock().activate(INT_BREAK);
        BreakAction::Raised
    }

    /// Drop every line and leave only RESET active.
    pub fn raise_reset(&self) {
        let mut state = self.lock();
        state.clear();
        state.activate(INT_RESET);
    }

    /// A peripheral requests source `source`: latch the pending bit and
    /// raise the vector when the source is enabled.
    pub fn try_raise(&self, source: usize) {
        let vector = {
            let mut state = self.lock();
            let Some(src) = state.sources.get(source).copied() else {
                debug!("INT: request from unknown source {}", source);
                return;
            };
            state.pending |= 1 << (source + 1);
            src.enabled.then_some(src.vector)
        };
        if let Some(vector) = vector {
            self.raise_vector(vector);
        }
    }

    /// Clear the pending bit of `source` and drop its vector.
    pub fn reset_source(&self, source: usize) {
        let mut state = self.lock();
        if let Some(src) = state.sources.get(source).copied() {
            state.pending &= !(1 << (source + 1));
            state.deactivate(src.vector);
        }
    }

    pub fn set_enabled(&self, source: usize, enabled: bool) {
        let vector = {
            let mut state = self.lock();
            let Some(src) = state.sources.get_mut(source) else {
                return;
            };
            src.enabled = enabled;
            let vector = src.vector;
            if !enabled {
                state.deactivate(vector);
                return;
            }
            (state.pending & (1 << (source + 1)) != 0).then_some(vector)
        };
        if let Some(vector) = vector {
            self.raise_vector(vector);
        }
    }

    fn raise_vector(&self, vector: usize) {
        if let Err(e) = self.raise_maskable(vector) {
            debug!("INT: {}", e);
        }
    }

    /// Clear both SFRs, disable every source and drop the NMI.
    pub fn reset_sfr(&self) {
        let mut state = self.lock();
        state.mask = 0;
        state.pending = 0;
        let vectors: Vec<usize> = state.sources.iter().map(|s| s.vector).collect();
        for src in state.sources.iter_mut() {
            src.enabled = false;
        }
        for vector in vectors {
            state.deactivate(vector);
        }
        state.deactivate(INT_NONMASKABLE);
    }

    pub fn mask(&self) -> u64 {
        self.lock().mask
    }

    pub fn pending(&self) -> u64 {
        self.lock().pending
    }

    /// Byte `offset` of the SFR block: mask bytes first, then pending bytes.
    pub fn read_sfr(&self, offset: u32) -> u8 {
        let state = self.lock();
        if offset < self.sfr_width {
            (state.mask >> (offset * 8)) as u8
        } else {
            (state.pending >> ((offset - self.sfr_width) * 8)) as u8
        }
    }

    pub fn write_sfr(&self, offset: u32, value: u8) {
        if offset < self.sfr_width {
            self.write_mask_byte(offset, value);
        } else {
            self.write_pending_byte(offset - self.sfr_width, value);
        }
    }

    fn write_mask_byte(&self, byte: u32, value: u8) {
        let (to_raise, nmi) = {
            let mut state = self.lock();
            let shift = byte * 8;
            state.mask = (state.mask & !(0xFF << shift)) | (value as u64) << shift;
            state.mask &= state.sfr_bits;

            let (mask, pending) = (state.mask, state.pending);
            let mut to_raise = Vec::new();
            for i in 0..state.sources.len() {
                let bit = 1 << (i + 1);
                let enabled = mask & bit != 0;
                state.sources[i].enabled = enabled;
                let vector = state.sources[i].vector;
                if !enabled {
                    state.deactivate(vector);
                } else if pending & bit != 0 {
                    to_raise.push(vector);
                }
            }
            let nmi = mask & 1 != 0;
            if !nmi {
                state.deactivate(INT_NONMASKABLE);
            }
            (to_raise, nmi && pending & 1 != 0)
        };
        for vector in to_raise {
            self.raise_vector(vector);
        }
        if nmi {
            self.raise_nonmaskable();
        }
    }

    fn write_pending_byte(&self, byte: u32, value: u8) {
        let (to_raise, nmi) = {
            let mut state = self.lock();
            let shift = byte * 8;
            state.pending = (state.pending & !(0xFF << shift)) | (value as u64) << shift;
            state.pending &= state.sfr_bits;

            let (mask, pending) = (state.mask, state.pending);
            let mut to_raise = Vec::new();
            for i in 0..state.sources.len() {
                let src = state.sources[i];
                if pending & (1 << (i + 1)) != 0 {
                    if src.enabled {
                        to_raise.push(src.vector);
                    }
                } else {
                    state.deactivate(src.vector);
                }
            }
            let nmi = pending & 1 != 0;
            if !nmi {
                state.deactivate(INT_NONMASKABLE);
            }
            (to_raise, nmi && mask & 1 != 0)
        };
        for vector in to_raise {
            self.raise_vector(vector);
        }
        if nmi {
            self.raise_nonmaskable();
        }
    }

    /// Pick the highest-priority active line and enter it if the CPU state
    /// allows. Returns the vector entered.
    pub fn accept<B: Bus + ?Sized>(&self, cpu: &mut Cpu, bus: &B) -> Option<usize> {
        let elevel = cpu.regs.psw.elevel();
        let mie = cpu.regs.psw.contains(Psw::MIE);

        let index = {
            let mut state = self.lock();
            let active = state.active;
            let found = if active[INT_RESET] {
                Some(INT_RESET)
            } else {
                (INT_SOFTWARE..INT_COUNT)
                    .find(|&i| active[i])
                    .or_else(|| active[INT_EMULATOR].then_some(INT_EMULATOR))
                    .or_else(|| active[INT_BREAK].then_some(INT_BREAK))
                    .or_else(|| active[INT_NONMASKABLE].then_some(INT_NONMASKABLE))
                    .or_else(|| (INT_MASKABLE..INT_SOFTWARE).find(|&i| active[i]))
            };
            let index = found?;

            let acceptable = match index {
                INT_NONMASKABLE => elevel <= 2,
                i if is_maskable(i) => elevel <= 1 && mie && !state.mi_blocked,
                _ => true,
            };
            if !acceptable {
                return None;
            }

            if index == INT_NONMASKABLE {
                state.pending &= !1;
            } else if is_maskable(index) {
                let cleared: u64 = state
                    .sources
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.vector == index)
                    .fold(0, |acc, (i, _)| acc | 1 << (i + 1));
                state.pending &= !cleared;
            }
            state.deactivate(index);
            index
        };

        if index >= INT_SOFTWARE && elevel > 1 {
            info!("INT: software interrupt at exception level {}", elevel);
        }
        cpu.raise(target_level(index), index, bus);
        Some(index)
    }

    pub fn snapshot(&self) -> InterruptSnapshot {
        let state = self.lock();
        InterruptSnapshot {
            active: (0..INT_COUNT).filter(|&i| state.active[i]).collect(),
            mask: state.mask,
            pending: state.pending,
            enabled: state.sources.iter().map(|s| s.enabled).collect(),
            mi_blocked: state.mi_blocked,
        }
    }

    pub fn restore(&self, snapshot: &InterruptSnapshot) -> SimResult<()> {
        let mut state = self.lock();
        if snapshot.enabled.len() != state.sources.len() {
            return Err(SimulationError::Snapshot(format!(
                "expected {} interrupt sources, found {}",
                state.sources.len(),
                snapshot.enabled.len()
            )));
        }
        state.clear();
        for &index in &snapshot.active {
            if index >= INT_COUNT {
                return Err(SimulationError::Snapshot(format!(
                    "interrupt index {} out of range",
                    index
                )));
            }
            state.activate(index);
        }
        state.mask = snapshot.mask & state.sfr_bits;
        state.pending = snapshot.pending & state.sfr_bits;
        for (src, &enabled) in state.sources.iter_mut().zip(&snapshot.enabled) {
            src.enabled = enabled;
        }
        state.mi_blocked = snapshot.mi_blocked;
        Ok(())
    }
}
