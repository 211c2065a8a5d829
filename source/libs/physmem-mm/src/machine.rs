// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Simulated platform bundling frames, processes and the paging layout.

use crate::access::AccessEngine;
use crate::layout::PagingLayout;
use crate::mapper::{MapError, Mapper};
use crate::memory::FrameStore;
use crate::task::{ProcessTable, TaskError};
use crate::translate::AddressTranslator;
use crate::AddressSpaceRoot;

/// Errors raised by [`Machine::spawn`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    /// The root table could not be allocated.
    #[error(transparent)]
    Map(#[from] MapError),
    /// The pid is taken.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Host-side stand-in for the privileged environment.
#[derive(Debug)]
pub struct Machine {
    layout: PagingLayout,
    memory: FrameStore,
    tasks: ProcessTable,
}

impl Machine {
    /// Creates a machine with `frames` backed frames and no processes.
    pub fn new(layout: PagingLayout, frames: usize) -> Self {
        Self::with_store(layout, FrameStore::new(frames))
    }

    /// Creates a machine over a prepared frame store.
    pub fn with_store(layout: PagingLayout, memory: FrameStore) -> Self {
        Self { layout, memory, tasks: ProcessTable::new() }
    }

    /// Paging layout.
    pub fn layout(&self) -> &PagingLayout {
        &self.layout
    }

    /// Physical memory.
    pub fn memory(&self) -> &FrameStore {
        &self.memory
    }

    /// Process table.
    pub fn tasks(&self) -> &ProcessTable {
        &self.tasks
    }

    /// Starts a process with an empty address space.
    pub fn spawn(&self, pid: u32, name: &str) -> Result<AddressSpaceRoot, SpawnError> {
        let root = Mapper::create(&self.memory, &self.layout)?.root();
        self.tasks.insert(pid, name, Some(root))?;
        Ok(root)
    }

    /// Opens the address space rooted at `root` for building.
    pub fn mapper(&self, root: AddressSpaceRoot) -> Mapper<'_> {
        Mapper::attach(&self.memory, &self.layout, root)
    }

    /// Translator over this machine.
    pub fn translator(&self) -> AddressTranslator<'_, FrameStore> {
        AddressTranslator::new(&self.memory, &self.layout)
    }

    /// Access engine over this machine.
    pub fn engine(&self) -> AccessEngine<'_, FrameStore> {
        AccessEngine::new(&self.memory)
    }
}
