// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-table construction over a [`FrameStore`], allocating intermediate levels on demand.
//!
//! Only the simulated platform builds tables; the translator itself never writes one.

use crate::entry::{PageFlags, PageTableEntry};
use crate::layout::PagingLayout;
use crate::memory::{FrameStore, PhysicalMemory};
use crate::{AddressSpaceRoot, Pfn, PAGE_SIZE};

const ENTRY_SIZE: usize = 8;

/// Error returned when manipulating page tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// Virtual address was not page aligned.
    #[error("address not page aligned")]
    Unaligned,
    /// Address is outside the layout's canonical range, or a level index is out of range.
    #[error("address out of range")]
    OutOfRange,
    /// Mapping collides with an existing entry.
    #[error("mapping overlaps an existing entry")]
    Overlap,
    /// Flags do not describe a valid leaf entry.
    #[error("invalid leaf flags")]
    InvalidFlags,
    /// No free frame was left for a table or page.
    #[error("out of frames")]
    OutOfFrames,
    /// Nothing is mapped at the address.
    #[error("nothing mapped")]
    NotMapped,
}

/// Builder for one address space.
#[derive(Debug)]
pub struct Mapper<'a> {
    store: &'a FrameStore,
    layout: &'a PagingLayout,
    root: AddressSpaceRoot,
}

impl<'a> Mapper<'a> {
    /// Allocates an empty root table.
    pub fn create(store: &'a FrameStore, layout: &'a PagingLayout) -> Result<Self, MapError> {
        let root = store.alloc_frame().ok_or(MapError::OutOfFrames)?;
        Ok(Self { store, layout, root: AddressSpaceRoot::new(root) })
    }

    /// Reopens an existing address space.
    pub fn attach(store: &'a FrameStore, layout: &'a PagingLayout, root: AddressSpaceRoot) -> Self {
        Self { store, layout, root }
    }

    /// Root of the space being built.
    pub fn root(&self) -> AddressSpaceRoot {
        self.root
    }

    /// Installs a base-page mapping from `vaddr` to `pfn`.
    pub fn map(&self, vaddr: u64, pfn: Pfn, flags: PageFlags) -> Result<(), MapError> {
        self.check(vaddr)?;
        if !flags.contains(PageFlags::VALID) || flags.contains(PageFlags::HUGE) {
            return Err(MapError::InvalidFlags);
        }
        let leaf_table = self.descend(vaddr, true)?;
        let index = self.leaf_index(vaddr);
        if self.load(leaf_table, index)?.is_valid() {
            return Err(MapError::Overlap);
        }
        self.store_entry(leaf_table, index, PageTableEntry::new(pfn, flags))?;
        log::trace!("mapped {vaddr:#x} -> pfn {pfn:#x} ({flags:?})");
        Ok(())
    }

    /// Allocates a fresh frame and maps it at `vaddr`.
    pub fn map_new(&self, vaddr: u64, flags: PageFlags) -> Result<Pfn, MapError> {
        let pfn = self.store.alloc_frame().ok_or(MapError::OutOfFrames)?;
        self.map(vaddr, pfn, flags)?;
        Ok(pfn)
    }

    /// Clears the leaf entry at `vaddr`, returning the frame it pointed at.
    pub fn unmap(&self, vaddr: u64) -> Result<Pfn, MapError> {
        self.check(vaddr)?;
        let leaf_table = self.descend(vaddr, false)?;
        let index = self.leaf_index(vaddr);
        let entry = self.load(leaf_table, index)?;
        if !entry.is_valid() {
            return Err(MapError::NotMapped);
        }
        self.store_entry(leaf_table, index, PageTableEntry::from_raw(0))?;
        Ok(entry.frame())
    }

    /// Overwrites the entry for `vaddr` at level `depth` (0 = top) with a raw value.
    ///
    /// Intermediate tables above `depth` must already exist.
    pub fn set_entry(&self, depth: usize, vaddr: u64, entry: PageTableEntry) -> Result<(), MapError> {
        let levels = self.layout.levels();
        let level = levels.get(depth).ok_or(MapError::OutOfRange)?;
        let mut table = self.root.pfn();
        for upper in &levels[..depth] {
            let next = self.load(table, upper.index(vaddr))?;
            if !next.is_valid() {
                return Err(MapError::NotMapped);
            }
            table = next.frame();
        }
        self.store_entry(table, level.index(vaddr), entry)
    }

    fn check(&self, vaddr: u64) -> Result<(), MapError> {
        if vaddr % PAGE_SIZE as u64 != 0 {
            return Err(MapError::Unaligned);
        }
        if !self.layout.is_canonical(vaddr) {
            return Err(MapError::OutOfRange);
        }
        Ok(())
    }

    fn leaf_index(&self, vaddr: u64) -> usize {
        self.layout.levels().last().map(|leaf| leaf.index(vaddr)).unwrap_or(0)
    }

    /// Returns the leaf table for `vaddr`, creating missing levels when `allocate` is set.
    fn descend(&self, vaddr: u64, allocate: bool) -> Result<Pfn, MapError> {
        let levels = self.layout.levels();
        let upper = &levels[..levels.len().saturating_sub(1)];
        let mut table = self.root.pfn();
        for level in upper {
            let index = level.index(vaddr);
            let entry = self.load(table, index)?;
            if entry.is_valid() {
                if entry.is_bad_table() {
                    return Err(MapError::Overlap);
                }
                table = entry.frame();
                continue;
            }
            if !allocate {
                return Err(MapError::NotMapped);
            }
            let next = self.store.alloc_frame().ok_or(MapError::OutOfFrames)?;
            let link = PageTableEntry::new(next, PageFlags::VALID | PageFlags::WRITABLE | PageFlags::USER);
            self.store_entry(table, index, link)?;
            table = next;
        }
        Ok(table)
    }

    fn load(&self, table: Pfn, index: usize) -> Result<PageTableEntry, MapError> {
        let frame = self.store.map_frame(table).ok_or(MapError::OutOfRange)?;
        let at = index * ENTRY_SIZE;
        let raw: [u8; ENTRY_SIZE] = frame
            .get(at..at + ENTRY_SIZE)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(MapError::OutOfRange)?;
        Ok(PageTableEntry::from_raw(u64::from_le_bytes(raw)))
    }

    fn store_entry(&self, table: Pfn, index: usize, entry: PageTableEntry) -> Result<(), MapError> {
        let mut frame = self.store.map_frame(table).ok_or(MapError::OutOfRange)?;
        let at = index * ENTRY_SIZE;
        frame
            .get_mut(at..at + ENTRY_SIZE)
            .ok_or(MapError::OutOfRange)?
            .copy_from_slice(&entry.raw().to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unaligned_and_bad_flags() {
        let store = FrameStore::new(16);
        let layout = PagingLayout::sv39();
        let mapper = Mapper::create(&store, &layout).unwrap();
        assert_eq!(mapper.map(0x1001, 5, PageFlags::VALID), Err(MapError::Unaligned));
        assert_eq!(mapper.map(0x1000, 5, PageFlags::WRITABLE), Err(MapError::InvalidFlags));
        assert_eq!(mapper.map(1 << 45, 5, PageFlags::VALID), Err(MapError::OutOfRange));
    }

    #[test]
    fn overlap_detected() {
        let store = FrameStore::new(16);
        let layout = PagingLayout::sv39();
        let mapper = Mapper::create(&store, &layout).unwrap();
        mapper.map(0x4000, 9, PageFlags::VALID).unwrap();
        assert_eq!(mapper.map(0x4000, 10, PageFlags::VALID), Err(MapError::Overlap));
    }

    #[test]
    fn intermediate_levels_allocated_once() {
        let store = FrameStore::new(16);
        let layout = PagingLayout::sv39();
        let mapper = Mapper::create(&store, &layout).unwrap();
        mapper.map_new(0x1000, PageFlags::VALID).unwrap();
        mapper.map_new(0x2000, PageFlags::VALID).unwrap();
        // root + two intermediate tables + two pages
        assert_eq!(store.alloc_frame(), Some(6));
    }

    #[test]
    fn out_of_frames_reported() {
        let store = FrameStore::new(3);
        let layout = PagingLayout::sv39();
        let mapper = Mapper::create(&store, &layout).unwrap();
        assert_eq!(mapper.map_new(0x1000, PageFlags::VALID), Err(MapError::OutOfFrames));
    }

    #[test]
    fn unmap_returns_frame() {
        let store = FrameStore::new(16);
        let layout = PagingLayout::sv39();
        let mapper = Mapper::create(&store, &layout).unwrap();
        let pfn = mapper.map_new(0x1000, PageFlags::VALID).unwrap();
        assert_eq!(mapper.unmap(0x1000), Ok(pfn));
        assert_eq!(mapper.unmap(0x1000), Err(MapError::NotMapped));
        assert_eq!(mapper.unmap(0x4000_0000), Err(MapError::NotMapped));
    }
}
