// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Track calls and returns for debuggers (advisory only).
    pub call_stack: bool,
    /// Report writes to ROM windows as warnings instead of trace noise.
    pub strict_memory: bool,
}
