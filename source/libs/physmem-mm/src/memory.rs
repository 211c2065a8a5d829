// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Physical memory seam and the frame store backing host builds.
//!
//! A mapping is a guard: the frame stays reachable through it until the guard drops, and
//! dropping it is the release. Mapping never sleeps; contention on one frame spins.

use core::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use crate::{Pfn, PAGE_SIZE};

/// Access to physical frames.
pub trait PhysicalMemory: Sync {
    /// Scoped view of one frame, released on drop.
    type Mapping<'a>: DerefMut<Target = [u8]>
    where
        Self: 'a;

    /// Whether `pfn` is backed by real memory.
    fn is_backed(&self, pfn: Pfn) -> bool;

    /// Maps `pfn` for the lifetime of the returned guard; `None` when not backed.
    fn map_frame(&self, pfn: Pfn) -> Option<Self::Mapping<'_>>;
}

/// Simulated physical memory: a fixed array of frames, optionally with holes.
///
/// Frame 0 is never handed out by [`FrameStore::alloc_frame`] so that a zero entry can never
/// alias a live table.
pub struct FrameStore {
    frames: Vec<Option<spin::Mutex<Box<[u8]>>>>,
    next: Mutex<Pfn>,
}

impl FrameStore {
    /// Creates `count` zeroed frames.
    pub fn new(count: usize) -> Self {
        let frames = (0..count)
            .map(|_| Some(spin::Mutex::new(vec![0u8; PAGE_SIZE].into_boxed_slice())))
            .collect();
        Self { frames, next: Mutex::new(1) }
    }

    /// Removes backing for `pfn`, modelling an MMIO hole or offline memory.
    pub fn with_hole(mut self, pfn: Pfn) -> Self {
        if let Some(slot) = self.frames.get_mut(pfn as usize) {
            *slot = None;
        }
        self
    }

    /// Hands out the next unused backed frame.
    pub fn alloc_frame(&self) -> Option<Pfn> {
        let mut next = self.next.lock();
        while (*next as usize) < self.frames.len() {
            let pfn = *next;
            *next += 1;
            if self.is_backed(pfn) {
                return Some(pfn);
            }
        }
        None
    }
}

impl core::fmt::Debug for FrameStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameStore")
            .field("frames", &self.frames.len())
            .field("next", &*self.next.lock())
            .finish()
    }
}

/// Guard over one mapped frame of a [`FrameStore`].
pub struct FrameMapping<'a> {
    pfn: Pfn,
    guard: spin::MutexGuard<'a, Box<[u8]>>,
}

impl FrameMapping<'_> {
    /// Frame behind this mapping.
    pub fn pfn(&self) -> Pfn {
        self.pfn
    }
}

impl Deref for FrameMapping<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl DerefMut for FrameMapping<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard
    }
}

impl PhysicalMemory for FrameStore {
    type Mapping<'a> = FrameMapping<'a>;

    fn is_backed(&self, pfn: Pfn) -> bool {
        matches!(self.frames.get(pfn as usize), Some(Some(_)))
    }

    fn map_frame(&self, pfn: Pfn) -> Option<FrameMapping<'_>> {
        let frame = self.frames.get(pfn as usize)?.as_ref()?;
        Some(FrameMapping { pfn, guard: frame.lock() })
    }
}
