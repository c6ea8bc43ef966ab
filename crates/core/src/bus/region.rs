// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Read callback: offset relative to the region base.
pub type ReadFn = Box<dyn FnMut(u32) -> u8 + Send>;
/// Write callback: offset relative to the region base.
pub type WriteFn = Box<dyn FnMut(u32, u8) + Send>;

/// Handle returned by [`super::Mmu::register_region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub(crate) usize);

/// A bound range of the address space.
pub struct Region {
    pub base: u32,
    pub size: u32,
    pub description: String,
    pub(crate) read: Option<ReadFn>,
    pub(crate) write: Option<WriteFn>,
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("base", &format_args!("{:#07x}", self.base))
            .field("size", &format_args!("{:#x}", self.size))
            .field("description", &self.description)
            .finish()
    }
}

impl Region {
    pub fn new(base: u32, size: u32, description: impl Into<String>) -> Self {
        Self {
            base,
            size,
            description: description.into(),
            read: None,
            write: None,
        }
    }

    pub fn on_read(mut self, read: impl FnMut(u32) -> u8 + Send + 'static) -> Self {
        self.read = Some(Box::new(read));
        self
    }

    pub fn on_write(mut self, write: impl FnMut(u32, u8) + Send + 'static) -> Self {
        self.write = Some(Box::new(write));
        self
    }

    pub fn end(&self) -> u32 {
        self.base + self.size
    }

    pub fn info(&self) -> RegionInfo {
        RegionInfo {
            base: self.base,
            size: self.size,
            description: self.description.clone(),
        }
    }
}

/// Debugger view of a registered region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub base: u32,
    pub size: u32,
    pub description: String,
}
