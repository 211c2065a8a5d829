//! CONTEXT: physmem end-to-end test harness library
//! INTENT: Client library against the physmem service over the loopback transport
//! DEPS: physmemd (service), physmem-mm (simulated machine), physmem-client
//! READINESS: Host backend ready; loopback transport established
//! TESTS: Lookup, reads, writes across pages, error mapping, timeouts
// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use std::time::Duration;

use physmem_client::ServiceClient;
use physmem_ipc::{loopback_channel, LoopbackClient};
use physmem_mm::{Machine, PageFlags, PagingLayout, Pfn, PhysicalMemory, PAGE_SIZE};
use physmemd::{serve, Service, ServiceConfig};

/// Timeout generous enough for a loaded CI host.
pub const E2E_TIMEOUT: Duration = Duration::from_millis(500);

/// Machine with one target process whose pages are mapped consecutively from a base address.
pub struct Target {
    /// Simulated platform.
    pub machine: Machine,
    /// Target pid.
    pub pid: u32,
    /// Frames backing the mapped pages, in address order.
    pub frames: Vec<Pfn>,
}

impl Target {
    /// Spawns `pid` and maps `pages` writable user pages starting at the page-aligned `base`.
    pub fn new(layout: PagingLayout, pid: u32, base: u64, pages: usize) -> Self {
        let machine = Machine::new(layout, 64 + pages);
        let root = machine.spawn(pid, "target").expect("spawn target");
        let mapper = machine.mapper(root);
        let flags = PageFlags::VALID | PageFlags::WRITABLE | PageFlags::USER;
        let frames = (0..pages)
            .map(|i| mapper.map_new(base + (i * PAGE_SIZE) as u64, flags).expect("map page"))
            .collect();
        Self { machine, pid, frames }
    }

    /// Copies `bytes` into page `page` at `offset`.
    pub fn poke(&self, page: usize, offset: usize, bytes: &[u8]) {
        let mut frame = self.machine.memory().map_frame(self.frames[page]).expect("frame");
        frame[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Reads `len` bytes of page `page` at `offset`.
    pub fn peek(&self, page: usize, offset: usize, len: usize) -> Vec<u8> {
        let frame = self.machine.memory().map_frame(self.frames[page]).expect("frame");
        frame[offset..offset + len].to_vec()
    }

    /// Runs the service on a scoped thread and hands `body` a client bound to it.
    ///
    /// The service stops once `body` returns and every client is dropped.
    pub fn with_service<R>(&self, body: impl FnOnce(ServiceClient<LoopbackClient>) -> R) -> R {
        let config = ServiceConfig::default();
        let service = Service::new(
            config.family(),
            self.machine.memory(),
            self.machine.tasks(),
            self.machine.layout(),
        );
        let (transport, server) = loopback_channel();
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| serve(&server, &service));
            let out = body(ServiceClient::new(transport).timeout(E2E_TIMEOUT));
            let served = handle.join().expect("serve thread");
            assert!(served.is_ok(), "serve failed: {served:?}");
            out
        })
    }
}
