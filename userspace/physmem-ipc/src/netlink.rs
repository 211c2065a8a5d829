// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Generic netlink client socket (Linux)
//!
//! OWNERS: @runtime
//!
//! SAFETY INVARIANTS:
//!   - The descriptor is owned by `OwnedFd` and closed exactly once
//!   - Every raw call is given a pointer/length pair derived from a live Rust buffer
//!
//! NOTES:
//!   - The kernel assigns the local port at bind time
//!   - Requests are addressed to port 0 (the kernel)
//!   - Receive buffer is 8 KiB; longer datagrams are truncated by the kernel

#![allow(unsafe_code)]

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::{Client, IpcError, Result, Wait};

const RECV_BUFFER: usize = 8192;

fn last_os_error() -> IpcError {
    IpcError::Os(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO))
}

fn kernel_addr() -> libc::sockaddr_nl {
    // SAFETY: sockaddr_nl is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_nl = unsafe { core::mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    addr
}

/// Datagram client on a `NETLINK_GENERIC` socket.
#[derive(Debug)]
pub struct NetlinkClient {
    fd: OwnedFd,
}

impl NetlinkClient {
    /// Opens and binds a generic netlink socket.
    pub fn open() -> Result<Self> {
        // SAFETY: plain socket(2) call; the result is checked before use.
        let raw = unsafe {
            libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_CLOEXEC, libc::NETLINK_GENERIC)
        };
        if raw < 0 {
            return Err(last_os_error());
        }
        // SAFETY: `raw` is a freshly created descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        let local = kernel_addr();
        // SAFETY: `local` outlives the call and the length matches its type.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&local as *const libc::sockaddr_nl).cast(),
                core::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(last_os_error());
        }
        log::debug!("netlink socket bound (fd {})", fd.as_raw_fd());
        Ok(Self { fd })
    }

    fn poll_readable(&self, timeout_ms: libc::c_int) -> Result<()> {
        let mut pfd = libc::pollfd { fd: self.fd.as_raw_fd(), events: libc::POLLIN, revents: 0 };
        // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        match rc {
            0 => Err(IpcError::Timeout),
            n if n < 0 => Err(last_os_error()),
            _ => Ok(()),
        }
    }
}

impl Client for NetlinkClient {
    fn send(&self, frame: &[u8], wait: Wait) -> Result<()> {
        let dest = kernel_addr();
        let flags = if wait.is_non_blocking() { libc::MSG_DONTWAIT } else { 0 };
        // SAFETY: `frame` and `dest` are live for the call; lengths match the buffers.
        let sent = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                frame.as_ptr().cast(),
                frame.len(),
                flags,
                (&dest as *const libc::sockaddr_nl).cast(),
                core::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(match std::io::Error::last_os_error().raw_os_error() {
                Some(libc::EAGAIN) => IpcError::WouldBlock,
                Some(code) => IpcError::Os(code),
                None => IpcError::Os(libc::EIO),
            });
        }
        Ok(())
    }

    fn recv(&self, wait: Wait) -> Result<Vec<u8>> {
        let mut flags = 0;
        match wait {
            Wait::Blocking => {}
            Wait::NonBlocking => flags = libc::MSG_DONTWAIT,
            Wait::Timeout(timeout) => {
                let ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
                self.poll_readable(ms)?;
                flags = libc::MSG_DONTWAIT;
            }
        }
        let mut buf = vec![0u8; RECV_BUFFER];
        // SAFETY: `buf` is a live, writable allocation of `buf.len()` bytes.
        let got = unsafe {
            libc::recv(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len(), flags)
        };
        if got < 0 {
            return Err(match std::io::Error::last_os_error().raw_os_error() {
                Some(libc::EAGAIN) if wait.timeout().is_some() => IpcError::Timeout,
                Some(libc::EAGAIN) => IpcError::WouldBlock,
                Some(code) => IpcError::Os(code),
                None => IpcError::Os(libc::EIO),
            });
        }
        buf.truncate(got as usize);
        Ok(buf)
    }
}
