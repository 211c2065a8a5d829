// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Memory request dispatcher (read/write against a target process)
//! OWNERS: @services-team
//!
//! INVARIANTS:
//!   - The process is resolved first: an unknown pid is ProcessNotFound whatever the length
//!   - Reads clamp to MAX_PAYLOAD; writes longer than MAX_PAYLOAD are refused
//!   - Every page the range touches is translated before any byte is copied
//!   - The process handle is dropped on every exit path (RAII)
//!   - A failed operation copies nothing: no partial success
//!
//! ERROR CONDITIONS:
//!   - MissingPayload / Malformed / SizeExceeded → EINVAL
//!   - ProcessNotFound → ESRCH
//!   - TranslationFailed / Access → EFAULT

use physmem_mm::{
    AccessEngine, AccessError, AddressTranslator, PagingLayout, PhysAddr, PhysicalMemory,
    ProcessLookup, TaskHandle, TranslateError, Transfer, MAX_TRANSFER, PAGE_SIZE,
};
use physmem_wire::{errno, Command, MemoryRequest, WireError, MAX_PAYLOAD};
use static_assertions::const_assert_eq;

const_assert_eq!(MAX_TRANSFER, MAX_PAYLOAD);

/// Reasons a request is refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The message carried no data attribute.
    #[error("request carries no payload")]
    MissingPayload,
    /// The data attribute could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(WireError),
    /// No process with this id exists.
    #[error("process {0} not found")]
    ProcessNotFound(u32),
    /// A write asked for more than the payload can hold.
    #[error("write of {0} bytes exceeds {MAX_PAYLOAD}")]
    SizeExceeded(u64),
    /// A page of the range could not be translated.
    #[error("translation failed: {0}")]
    TranslationFailed(TranslateError),
    /// The physical access was refused.
    #[error("access failed: {0}")]
    Access(AccessError),
}

impl DispatchError {
    /// Positive errno carried in the error reply.
    pub fn errno(&self) -> i32 {
        match self {
            Self::MissingPayload | Self::Malformed(_) | Self::SizeExceeded(_) => errno::EINVAL,
            Self::ProcessNotFound(_) => errno::ESRCH,
            Self::TranslationFailed(_) | Self::Access(_) => errno::EFAULT,
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Read reply: the request echoed back with the bytes read in its payload.
    Read(MemoryRequest),
    /// Write completed; no reply body.
    Written,
}

/// One page-bounded piece of a request.
#[derive(Clone, Copy, Debug)]
struct Chunk {
    pa: PhysAddr,
    at: usize,
    len: usize,
}

/// Routes read and write requests to the translator and access engine.
#[derive(Debug)]
pub struct Dispatcher<'a, M, P> {
    memory: &'a M,
    tasks: &'a P,
    layout: &'a PagingLayout,
}

impl<'a, M: PhysicalMemory, P: ProcessLookup> Dispatcher<'a, M, P> {
    /// Creates a dispatcher over one platform.
    pub fn new(memory: &'a M, tasks: &'a P, layout: &'a PagingLayout) -> Self {
        Self { memory, tasks, layout }
    }

    /// Executes `command` with the raw data attribute `body`.
    pub fn dispatch(&self, command: Command, body: Option<&[u8]>) -> Result<Reply, DispatchError> {
        let raw = body.ok_or(DispatchError::MissingPayload)?;
        let request = MemoryRequest::decode(raw).map_err(DispatchError::Malformed)?;
        match command {
            Command::Read => self.read(&request).map(Reply::Read),
            Command::Write => self.write(&request).map(|()| Reply::Written),
        }
    }

    fn read(&self, request: &MemoryRequest) -> Result<MemoryRequest, DispatchError> {
        let len = request.length.min(MAX_PAYLOAD as u64) as usize;
        let task = self.tasks.find(request.pid).ok_or(DispatchError::ProcessNotFound(request.pid))?;
        let chunks = self.plan(&task, request.vaddr, len)?;
        let mut reply = request.clone();
        reply.payload = [0u8; MAX_PAYLOAD];
        let engine = AccessEngine::new(self.memory);
        for chunk in chunks {
            let window = &mut reply.payload[chunk.at..chunk.at + chunk.len];
            engine.access(chunk.pa, Transfer::Read(window)).map_err(DispatchError::Access)?;
        }
        log::debug!("read {len} bytes from pid {} at {:#x}", request.pid, request.vaddr);
        Ok(reply)
    }

    fn write(&self, request: &MemoryRequest) -> Result<(), DispatchError> {
        let task = self.tasks.find(request.pid).ok_or(DispatchError::ProcessNotFound(request.pid))?;
        if request.length > MAX_PAYLOAD as u64 {
            return Err(DispatchError::SizeExceeded(request.length));
        }
        let len = request.length as usize;
        let chunks = self.plan(&task, request.vaddr, len)?;
        let engine = AccessEngine::new(self.memory);
        for chunk in chunks {
            let window = &request.payload[chunk.at..chunk.at + chunk.len];
            engine.access(chunk.pa, Transfer::Write(window)).map_err(DispatchError::Access)?;
        }
        log::debug!("wrote {len} bytes to pid {} at {:#x}", request.pid, request.vaddr);
        Ok(())
    }

    /// Translates every page `[vaddr, vaddr + len)` touches; the start page is translated even
    /// for empty ranges.
    fn plan<T: TaskHandle>(&self, task: &T, vaddr: u64, len: usize) -> Result<Vec<Chunk>, DispatchError> {
        let translator = AddressTranslator::new(self.memory, self.layout);
        let mut chunks = Vec::with_capacity(2);
        let mut at = 0;
        loop {
            // A range running past the top of the address space never wraps to page zero.
            let va = vaddr
                .checked_add(at as u64)
                .ok_or(DispatchError::TranslationFailed(TranslateError::NonCanonical(vaddr)))?;
            let pa = translator.translate(task, va).map_err(DispatchError::TranslationFailed)?;
            let take = (len - at).min(PAGE_SIZE - pa.page_offset());
            chunks.push(Chunk { pa, at, len: take });
            at += take;
            if at >= len {
                return Ok(chunks);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physmem_mm::{Machine, PageFlags};

    const PID: u32 = 1234;
    const VA: u64 = 0x7f00_0000_1000;

    fn setup() -> Machine {
        let m = Machine::new(PagingLayout::x86_64_five_level(), 64);
        let root = m.spawn(PID, "game").unwrap();
        let mapper = m.mapper(root);
        mapper.map_new(VA, PageFlags::VALID | PageFlags::USER | PageFlags::WRITABLE).unwrap();
        mapper.map_new(VA + 0x1000, PageFlags::VALID | PageFlags::USER | PageFlags::WRITABLE).unwrap();
        m
    }

    fn dispatcher(m: &Machine) -> Dispatcher<'_, physmem_mm::FrameStore, physmem_mm::ProcessTable> {
        Dispatcher::new(m.memory(), m.tasks(), m.layout())
    }

    fn write(d: &Dispatcher<'_, physmem_mm::FrameStore, physmem_mm::ProcessTable>, va: u64, data: &[u8]) {
        let req = MemoryRequest::with_data(PID, va, data).unwrap();
        assert_eq!(d.dispatch(Command::Write, Some(&req.to_bytes())), Ok(Reply::Written));
    }

    fn read(
        d: &Dispatcher<'_, physmem_mm::FrameStore, physmem_mm::ProcessTable>,
        pid: u32,
        va: u64,
        len: u64,
    ) -> Result<MemoryRequest, DispatchError> {
        let req = MemoryRequest::new(pid, va, len);
        match d.dispatch(Command::Read, Some(&req.to_bytes()))? {
            Reply::Read(reply) => Ok(reply),
            Reply::Written => panic!("read produced a write reply"),
        }
    }

    #[test]
    fn read_returns_written_bytes() {
        let m = setup();
        let d = dispatcher(&m);
        write(&d, VA + 0x10, b"0123456789abcdef");
        let reply = read(&d, PID, VA + 0x10, 16).unwrap();
        assert_eq!(&reply.payload[..16], b"0123456789abcdef");
        assert_eq!(reply.pid, PID);
        assert_eq!(reply.length, 16);
    }

    #[test]
    fn read_clamps_write_rejects() {
        let m = setup();
        let d = dispatcher(&m);
        let reply = read(&d, PID, VA, 300).unwrap();
        assert_eq!(reply.length, 300);
        let mut req = MemoryRequest::new(PID, VA, 300);
        req.payload = [0x11; MAX_PAYLOAD];
        assert_eq!(
            d.dispatch(Command::Write, Some(&req.to_bytes())),
            Err(DispatchError::SizeExceeded(300))
        );
    }

    #[test]
    fn oversized_write_to_missing_pid_is_process_not_found() {
        let m = setup();
        let d = dispatcher(&m);
        let req = MemoryRequest::new(999_999, 0x1000, 300);
        let err = d.dispatch(Command::Write, Some(&req.to_bytes())).unwrap_err();
        assert_eq!(err, DispatchError::ProcessNotFound(999_999));
        assert_eq!(err.errno(), errno::ESRCH);
    }

    #[test]
    fn range_past_top_of_address_space_does_not_wrap() {
        let m = setup();
        let d = dispatcher(&m);
        let root = m.tasks().find(PID).unwrap().address_space().unwrap();
        let mapper = m.mapper(root);
        let flags = PageFlags::VALID | PageFlags::USER | PageFlags::WRITABLE;
        mapper.map_new(0xffff_ffff_ffff_f000, flags).unwrap();
        mapper.map_new(0, flags).unwrap();
        write(&d, 0, b"LOW!");
        let top = 0xffff_ffff_ffff_fffc;
        assert_eq!(
            read(&d, PID, top, 8),
            Err(DispatchError::TranslationFailed(TranslateError::NonCanonical(top)))
        );
        let req = MemoryRequest::with_data(PID, top, &[0xaa; 8]).unwrap();
        assert!(d.dispatch(Command::Write, Some(&req.to_bytes())).is_err());
        assert_eq!(&read(&d, PID, 0, 4).unwrap().payload[..4], b"LOW!");
        assert_eq!(&read(&d, PID, top, 4).unwrap().payload[..4], &[0; 4]);
    }

    #[test]
    fn straddling_request_spans_two_frames() {
        let m = setup();
        let d = dispatcher(&m);
        write(&d, VA + 0xff8, b"ABCDEFGHIJKLMNOP");
        assert_eq!(&read(&d, PID, VA + 0xff8, 16).unwrap().payload[..16], b"ABCDEFGHIJKLMNOP");
        assert_eq!(&read(&d, PID, VA + 0x1000, 8).unwrap().payload[..8], b"IJKLMNOP");
    }

    #[test]
    fn unmapped_tail_fails_without_partial_write() {
        let m = setup();
        let d = dispatcher(&m);
        let req = MemoryRequest::with_data(PID, VA + 0x1ffc, &[0xee; 8]).unwrap();
        assert!(matches!(
            d.dispatch(Command::Write, Some(&req.to_bytes())),
            Err(DispatchError::TranslationFailed(_))
        ));
        assert_eq!(&read(&d, PID, VA + 0x1ffc, 4).unwrap().payload[..4], &[0; 4]);
    }

    #[test]
    fn missing_and_malformed_payloads() {
        let m = setup();
        let d = dispatcher(&m);
        assert_eq!(d.dispatch(Command::Read, None), Err(DispatchError::MissingPayload));
        assert_eq!(
            d.dispatch(Command::Read, Some(&[0u8; 10])),
            Err(DispatchError::Malformed(WireError::BadRequestSize(10)))
        );
    }

    #[test]
    fn unknown_pid_and_errnos() {
        let m = setup();
        let d = dispatcher(&m);
        let err = read(&d, 999_999, VA, 4).unwrap_err();
        assert_eq!(err, DispatchError::ProcessNotFound(999_999));
        assert_eq!(err.errno(), errno::ESRCH);
        assert_eq!(DispatchError::MissingPayload.errno(), errno::EINVAL);
        let err = read(&d, PID, 0x1000, 4).unwrap_err();
        assert_eq!(err.errno(), errno::EFAULT);
    }

    #[test]
    fn handles_released_on_success_and_failure() {
        let m = setup();
        let d = dispatcher(&m);
        read(&d, PID, VA, 8).unwrap();
        read(&d, PID, 0x1000, 8).unwrap_err();
        assert_eq!(m.tasks().outstanding_handles(PID), 0);
    }

    #[test]
    fn zero_length_read_still_translates() {
        let m = setup();
        let d = dispatcher(&m);
        assert!(read(&d, PID, VA, 0).unwrap().payload.iter().all(|b| *b == 0));
        assert!(matches!(read(&d, PID, 0x1000, 0), Err(DispatchError::TranslationFailed(_))));
    }

    #[test]
    fn concurrent_dispatch_on_shared_frames() {
        let m = setup();
        let d = dispatcher(&m);
        std::thread::scope(|scope| {
            for i in 0..4u8 {
                let d = &d;
                scope.spawn(move || {
                    let va = VA + u64::from(i) * 64;
                    for _ in 0..50 {
                        write(d, va, &[i; 64]);
                        assert_eq!(read(d, PID, va, 64).unwrap().payload[..64], [i; 64]);
                    }
                });
            }
        });
    }
}
