// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process lookup seam plus the in-memory process table used on host builds.
//!
//! Handles are reference counted; dropping the last handle returned by a lookup is the
//! release of that lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::AddressSpaceRoot;

/// A process whose address space can be walked.
pub trait TaskHandle {
    /// Process id.
    fn pid(&self) -> u32;
    /// Root of the user address space; `None` for kernel threads or exited tasks.
    fn address_space(&self) -> Option<AddressSpaceRoot>;
}

/// Resolves process ids to handles.
pub trait ProcessLookup: Sync {
    /// Handle type; dropping it releases the lookup.
    type Handle: TaskHandle;

    /// Finds `pid` in the initial namespace.
    fn find(&self, pid: u32) -> Option<Self::Handle>;
}

/// Simulated process.
#[derive(Debug)]
pub struct Task {
    pid: u32,
    name: String,
    space: Option<AddressSpaceRoot>,
}

impl Task {
    /// Command name the task was started with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Reference-counted handle to a [`Task`].
#[derive(Clone, Debug)]
pub struct TaskRef(Arc<Task>);

impl core::ops::Deref for TaskRef {
    type Target = Task;

    fn deref(&self) -> &Task {
        &self.0
    }
}

impl TaskHandle for TaskRef {
    fn pid(&self) -> u32 {
        self.0.pid
    }

    fn address_space(&self) -> Option<AddressSpaceRoot> {
        self.0.space
    }
}

/// Errors raised by [`ProcessTable`] mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The pid is already in use.
    #[error("pid {0} already exists")]
    PidInUse(u32),
    /// The pid does not exist.
    #[error("pid {0} not found")]
    NotFound(u32),
}

/// Process table keyed by pid.
#[derive(Debug, Default)]
pub struct ProcessTable {
    tasks: RwLock<BTreeMap<u32, Arc<Task>>>,
}

impl ProcessTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task; `space` is `None` for kernel threads.
    pub fn insert(
        &self,
        pid: u32,
        name: &str,
        space: Option<AddressSpaceRoot>,
    ) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&pid) {
            return Err(TaskError::PidInUse(pid));
        }
        tasks.insert(pid, Arc::new(Task { pid, name: name.to_owned(), space }));
        log::debug!("task {pid} ({name}) registered");
        Ok(())
    }

    /// Removes a task; outstanding handles stay valid.
    pub fn exit(&self, pid: u32) -> Result<(), TaskError> {
        self.tasks.write().remove(&pid).map(|_| ()).ok_or(TaskError::NotFound(pid))
    }

    /// Number of handles to `pid` currently held outside the table.
    pub fn outstanding_handles(&self, pid: u32) -> usize {
        self.tasks
            .read()
            .get(&pid)
            .map(|task| Arc::strong_count(task) - 1)
            .unwrap_or(0)
    }
}

impl ProcessLookup for ProcessTable {
    type Handle = TaskRef;

    fn find(&self, pid: u32) -> Option<TaskRef> {
        self.tasks.read().get(&pid).cloned().map(TaskRef)
    }
}
