// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! 64-bit page-table entry format (x86-64 style, shared by every layout).

use bitflags::bitflags;

use crate::{Pfn, PAGE_SHIFT};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// Flags stored in a page-table entry.
    pub struct PageFlags: u64 {
        /// Entry is present and may be followed.
        const VALID = 1 << 0;
        /// Writes are permitted.
        const WRITABLE = 1 << 1;
        /// Accessible from user mode.
        const USER = 1 << 2;
        /// Write-through caching.
        const WRITE_THROUGH = 1 << 3;
        /// Caching disabled.
        const NO_CACHE = 1 << 4;
        /// Set by hardware on access.
        const ACCESSED = 1 << 5;
        /// Set by hardware on write.
        const DIRTY = 1 << 6;
        /// Entry maps a large page instead of a table.
        const HUGE = 1 << 7;
        /// Not flushed on address-space switch.
        const GLOBAL = 1 << 8;
        /// Instruction fetches are refused.
        const NO_EXECUTE = 1 << 63;
    }
}

const FRAME_MASK: u64 = 0x000f_ffff_ffff_f000;
const RESERVED_MASK: u64 = 0x7ff0_0000_0000_0000;

/// Raw page-table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// Builds an entry pointing at `pfn`.
    pub const fn new(pfn: Pfn, flags: PageFlags) -> Self {
        Self(((pfn << PAGE_SHIFT) & FRAME_MASK) | flags.bits())
    }

    /// Wraps a raw value read from a table.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value as stored in a table.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Entry was never populated.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Entry has its valid/present bit set.
    pub const fn is_valid(self) -> bool {
        self.0 & PageFlags::VALID.bits() != 0
    }

    /// Entry cannot be followed as a table pointer: reserved bits set or a huge mapping.
    pub const fn is_bad_table(self) -> bool {
        self.0 & RESERVED_MASK != 0 || self.0 & PageFlags::HUGE.bits() != 0
    }

    /// Frame the entry points at.
    pub const fn frame(self) -> Pfn {
        (self.0 & FRAME_MASK) >> PAGE_SHIFT
    }

    /// Flag bits of the entry.
    pub const fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }
}
