// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded copy to or from one physical page.
//!
//! Every access maps exactly one frame, performs exactly one copy and releases the mapping
//! before returning, on success and on failure alike. Bounds are checked before mapping.

use crate::memory::PhysicalMemory;
use crate::{PhysAddr, Pfn, MAX_TRANSFER, PAGE_SIZE};

/// Direction and buffer of one copy.
#[derive(Debug)]
pub enum Transfer<'b> {
    /// Copy from physical memory into the buffer.
    Read(&'b mut [u8]),
    /// Copy the buffer into physical memory.
    Write(&'b [u8]),
}

impl Transfer<'_> {
    /// Number of bytes to copy.
    pub fn len(&self) -> usize {
        match self {
            Self::Read(buf) => buf.len(),
            Self::Write(buf) => buf.len(),
        }
    }

    /// Whether the copy is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reasons an access is refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// More than [`MAX_TRANSFER`] bytes requested.
    #[error("transfer of {len} bytes exceeds {MAX_TRANSFER}")]
    SizeExceeded {
        /// Requested size.
        len: usize,
    },
    /// The target frame is not backed.
    #[error("frame {pfn:#x} is not backed")]
    FrameInvalid {
        /// Offending frame number.
        pfn: Pfn,
    },
    /// The copy would run past the end of the page.
    #[error("{len} bytes at page offset {offset:#x} cross the page end")]
    PageOverrun {
        /// Offset inside the page.
        offset: usize,
        /// Requested size.
        len: usize,
    },
}

/// Copies bytes through short-lived frame mappings.
#[derive(Debug)]
pub struct AccessEngine<'a, M> {
    memory: &'a M,
}

impl<'a, M: PhysicalMemory> AccessEngine<'a, M> {
    /// Creates an engine over `memory`.
    pub fn new(memory: &'a M) -> Self {
        Self { memory }
    }

    /// Performs `transfer` at `pa`.
    pub fn access(&self, pa: PhysAddr, transfer: Transfer<'_>) -> Result<(), AccessError> {
        let len = transfer.len();
        if len > MAX_TRANSFER {
            return Err(AccessError::SizeExceeded { len });
        }
        let pfn = pa.pfn();
        if !self.memory.is_backed(pfn) {
            return Err(AccessError::FrameInvalid { pfn });
        }
        let offset = pa.page_offset();
        if offset + len > PAGE_SIZE {
            return Err(AccessError::PageOverrun { offset, len });
        }
        let mut page = self.memory.map_frame(pfn).ok_or(AccessError::FrameInvalid { pfn })?;
        let window = &mut page[offset..offset + len];
        match transfer {
            Transfer::Read(buf) => buf.copy_from_slice(window),
            Transfer::Write(buf) => window.copy_from_slice(buf),
        }
        Ok(())
    }
}
