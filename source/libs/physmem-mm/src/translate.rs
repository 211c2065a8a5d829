// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Virtual → physical translation by walking a task's page tables.
//!
//! The walk is read-only: absent or invalid entries end it with an error, nothing is allocated
//! and nothing is faulted in. Intermediate entries that are huge mappings are treated as bad.

use crate::entry::PageTableEntry;
use crate::layout::PagingLayout;
use crate::memory::PhysicalMemory;
use crate::task::TaskHandle;
use crate::{AddressSpaceRoot, Pfn, PhysAddr};

const ENTRY_SIZE: usize = 8;

/// Reasons a translation fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// The task has no user address space.
    #[error("task has no address space")]
    NoAddressSpace,
    /// The address is outside the range the layout translates.
    #[error("address {0:#x} is not canonical")]
    NonCanonical(u64),
    /// An intermediate entry is absent or malformed.
    #[error("page table invalid at level {level}")]
    PageTableInvalid {
        /// Level whose entry stopped the walk.
        level: &'static str,
    },
    /// The leaf entry is not present.
    #[error("page not present")]
    PageNotPresent,
    /// The leaf points at a frame with no backing memory.
    #[error("frame {pfn:#x} is not backed")]
    FrameInvalid {
        /// Offending frame number.
        pfn: Pfn,
    },
}

/// Page-table walker over one physical memory and layout.
#[derive(Debug)]
pub struct AddressTranslator<'a, M> {
    memory: &'a M,
    layout: &'a PagingLayout,
}

impl<'a, M: PhysicalMemory> AddressTranslator<'a, M> {
    /// Creates a walker.
    pub fn new(memory: &'a M, layout: &'a PagingLayout) -> Self {
        Self { memory, layout }
    }

    /// Translates `vaddr` inside `task`'s address space.
    pub fn translate<T: TaskHandle>(&self, task: &T, vaddr: u64) -> Result<PhysAddr, TranslateError> {
        let root = task.address_space().ok_or(TranslateError::NoAddressSpace)?;
        self.walk(root, vaddr)
    }

    /// Walks the tables under `root` for `vaddr`.
    pub fn walk(&self, root: AddressSpaceRoot, vaddr: u64) -> Result<PhysAddr, TranslateError> {
        if !self.layout.is_canonical(vaddr) {
            return Err(TranslateError::NonCanonical(vaddr));
        }
        let Some((leaf, upper)) = self.layout.levels().split_last() else {
            return Err(TranslateError::PageNotPresent);
        };
        let mut table = root.pfn();
        for level in upper {
            let invalid = TranslateError::PageTableInvalid { level: level.name };
            let entry = self.load(table, level.index(vaddr)).ok_or(invalid)?;
            if entry.is_none() || !entry.is_valid() || entry.is_bad_table() {
                return Err(invalid);
            }
            table = entry.frame();
        }
        let entry = self
            .load(table, leaf.index(vaddr))
            .ok_or(TranslateError::PageTableInvalid { level: leaf.name })?;
        if !entry.is_valid() {
            return Err(TranslateError::PageNotPresent);
        }
        let pfn = entry.frame();
        if !self.memory.is_backed(pfn) {
            return Err(TranslateError::FrameInvalid { pfn });
        }
        Ok(PhysAddr::compose(pfn, vaddr))
    }

    fn load(&self, table: Pfn, index: usize) -> Option<PageTableEntry> {
        let frame = self.memory.map_frame(table)?;
        let at = index * ENTRY_SIZE;
        let raw: [u8; ENTRY_SIZE] = frame.get(at..at + ENTRY_SIZE)?.try_into().ok()?;
        Some(PageTableEntry::from_raw(u64::from_le_bytes(raw)))
    }
}
