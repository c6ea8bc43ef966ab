// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Shadow call stack for debuggers.
//!
//! Frames are inferred from `BL`, `PUSH LR`, `POP LR`, `POP PC` and `RT`.
//! The heuristics can lose track of tail calls and conditional LR saves;
//! that only affects what a debugger shows, never execution.

use crate::hooks::Hooks;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    /// Entry point of the called function (or the last jump target).
    pub new_pc: u32,
    pub sp: u16,
    pub er0: u16,
    pub er2: u16,
    /// 20-bit return address recorded when LR was pushed.
    pub lr: u32,
    pub lr_pushed: bool,
    pub lr_push_address: u16,
    pub is_jump: bool,
}

#[derive(Debug, Clone)]
pub struct CallStackTracker {
    frames: Vec<CallFrame>,
    hooks: Hooks,
}

impl CallStackTracker {
    pub fn new(hooks: Hooks) -> Self {
        Self {
            frames: Vec::new(),
            hooks,
        }
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn on_call(&mut self, pc: u32, target: u32, sp: u16, er0: u16, er2: u16) {
        self.frames.push(CallFrame {
            new_pc: target,
            sp,
            er0,
            er2,
            ..CallFrame::default()
        });
        self.hooks.call_function(pc, target);
    }

    /// `PUSH LR` left LR at `address` (the new SP).
    pub fn on_push_lr(&mut self, address: u16, lr: u32) {
        if let Some(top) = self.frames.last_mut() {
            if !top.lr_pushed {
                top.lr_pushed = true;
                top.lr_push_address = address;
                top.lr = lr;
            }
        }
    }

    /// `POP LR` with SP at `sp` before the pop. Functions that save LR on
    /// only one branch restore it the same way.
    pub fn on_pop_lr(&mut self, sp: u16) {
        if let Some(top) = self.frames.last_mut() {
            if top.lr_pushed && top.lr_push_address == sp {
                top.lr_pushed = false;
            }
        }
    }

    /// `POP PC` read `return_to` from `old_sp`.
    pub fn on_pop_pc(&mut self, pc: u32, old_sp: u16, return_to: u32) {
        let Some(top) = self.frames.last_mut() else {
            return;
        };
        if !top.lr_pushed {
            top.is_jump = true;
            top.new_pc = return_to;
            return;
        }
        if top.lr_push_address == old_sp && top.lr == return_to {
            self.frames.pop();
            self.hooks.function_return(pc, return_to);
        } else {
            debug!(
                "call stack: unbalanced pop pc at {:#07x} (frame lr {:#07x})",
                pc, top.lr
            );
            top.is_jump = true;
        }
    }

    /// `RT` returns from a leaf that never pushed LR.
    pub fn on_rt(&mut self, pc: u32, return_to: u32) {
        match self.frames.last() {
            Some(top) if !top.lr_pushed => {
                self.frames.pop();
                self.hooks.function_return(pc, return_to);
            }
            Some(_) => debug!("call stack: rt at {:#07x} with LR still pushed", pc),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulationObserver;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<(&'static str, u32, u32)>>,
    }

    impl SimulationObserver for Recorder {
        fn on_call_function(&self, pc: u32, target: u32) {
            self.events.lock().unwrap().push(("call", pc, target));
        }
        fn on_function_return(&self, pc: u32, return_to: u32) {
            self.events.lock().unwrap().push(("ret", pc, return_to));
        }
    }

    fn tracker() -> (CallStackTracker, Arc<Recorder>) {
        let hooks = Hooks::new();
        let recorder = Arc::new(Recorder::default());
        hooks.add(recorder.clone());
        (CallStackTracker::new(hooks), recorder)
    }

    #[test]
    fn test_leaf_call_returns_on_rt() {
        let (mut t, rec) = tracker();
        t.on_call(0x100, 0x2000, 0x8E00, 0, 0);
        assert_eq!(t.depth(), 1);
        t.on_rt(0x2010, 0x104);
        assert_eq!(t.depth(), 0);
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec![("call", 0x100, 0x2000), ("ret", 0x2010, 0x104)]
        );
    }

    #[test]
    fn test_push_lr_pop_pc_pairs() {
        let (mut t, _rec) = tracker();
        t.on_call(0x100, 0x1_2000, 0x8E00, 0, 0);
        t.on_push_lr(0x8DFC, 0x0104);
        // Nested push while marked keeps the first record
        t.on_push_lr(0x8DF0, 0x9999);
        assert_eq!(t.frames()[0].lr_push_address, 0x8DFC);

        t.on_pop_pc(0x1_2040, 0x8DFC, 0x0104);
        assert_eq!(t.depth(), 0);
    }

    #[test]
    fn test_mismatched_pop_marks_jump() {
        let (mut t, _rec) = tracker();
        t.on_call(0x100, 0x2000, 0x8E00, 0, 0);
        t.on_push_lr(0x8DFC, 0x0104);
        t.on_pop_pc(0x2040, 0x8DF8, 0x0104);
        assert_eq!(t.depth(), 1);
        assert!(t.frames()[0].is_jump);

        // Without a saved LR, POP PC is a computed jump
        let (mut t, _rec) = tracker();
        t.on_call(0x100, 0x2000, 0x8E00, 0, 0);
        t.on_pop_pc(0x2040, 0x8DFC, 0x3000);
        assert!(t.frames()[0].is_jump);
        assert_eq!(t.frames()[0].new_pc, 0x3000);
    }

    #[test]
    fn test_pop_lr_clears_mark() {
        let (mut t, _rec) = tracker();
        t.on_call(0x100, 0x2000, 0x8E00, 0, 0);
        t.on_push_lr(0x8DFC, 0x0104);
        t.on_pop_lr(0x8DFC);
        assert!(!t.frames()[0].lr_pushed);
        t.on_rt(0x2050, 0x104);
        assert_eq!(t.depth(), 0);
    }
}
