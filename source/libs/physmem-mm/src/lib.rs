// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Privileged memory primitives: page-table walk + scoped physical page access
//! OWNERS: @kernel-mm-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module + `tests/translate_props.rs` (property tests)
//!
//! PUBLIC API:
//!   - `AddressTranslator`: (task, vaddr) → physical address via an N-level walk
//!   - `AccessEngine`: bounded copy to/from one physical page under a scoped mapping
//!   - `PagingLayout` / `LevelDescriptor`: walk geometry (x86-64 5/4-level, Sv39)
//!   - `PhysicalMemory` / `ProcessLookup`: seams to the platform
//!   - `FrameStore`, `ProcessTable`, `Mapper`, `Machine`: simulated platform for host builds
//!
//! INVARIANTS:
//!   - Translation never allocates, never faults pages in, never guesses past an invalid entry
//!   - A frame mapping lives only for the duration of one copy and is released on drop

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod access;
mod entry;
mod layout;
mod machine;
mod mapper;
mod memory;
mod task;
mod translate;

pub use access::{AccessEngine, AccessError, Transfer};
pub use entry::{PageFlags, PageTableEntry};
pub use layout::{LayoutError, LayoutKind, LevelDescriptor, PagingLayout};
pub use machine::{Machine, SpawnError};
pub use mapper::{MapError, Mapper};
pub use memory::{FrameMapping, FrameStore, PhysicalMemory};
pub use task::{ProcessLookup, ProcessTable, Task, TaskError, TaskHandle, TaskRef};
pub use translate::{AddressTranslator, TranslateError};

/// Base page shift.
pub const PAGE_SHIFT: u32 = 12;
/// Base page size in bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
/// Hard ceiling of a single copy, matching the fixed request buffer.
pub const MAX_TRANSFER: usize = 256;

/// Physical frame number.
pub type Pfn = u64;

/// Physical byte address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    /// Combines a frame number with the page-offset bits of `vaddr`.
    pub const fn compose(pfn: Pfn, vaddr: u64) -> Self {
        Self((pfn << PAGE_SHIFT) | (vaddr & (PAGE_SIZE as u64 - 1)))
    }

    /// Frame containing this address.
    pub const fn pfn(self) -> Pfn {
        self.0 >> PAGE_SHIFT
    }

    /// Offset of this address inside its frame.
    pub const fn page_offset(self) -> usize {
        (self.0 & (PAGE_SIZE as u64 - 1)) as usize
    }
}

/// Root table of one address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressSpaceRoot(Pfn);

impl AddressSpaceRoot {
    /// Wraps the frame holding the top-level table.
    pub const fn new(pfn: Pfn) -> Self {
        Self(pfn)
    }

    /// Frame holding the top-level table.
    pub const fn pfn(self) -> Pfn {
        self.0
    }
}
