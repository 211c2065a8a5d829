// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Datagram transport abstractions for the physmem channel
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (host loopback, sequence generator)
//!
//! PUBLIC API:
//!   - Client trait: sends request datagrams, receives reply datagrams
//!   - Server trait: receives datagrams tagged with the sender port, replies to a port
//!   - Wait enum: blocking behaviour of a call
//!   - IpcError: transport failures
//!   - SeqGen: sequence numbers for request/reply correlation
//!
//! DEPENDENCIES:
//!   - std::sync::mpsc + parking_lot: in-process loopback
//!   - libc (linux only): generic netlink socket

#![deny(unsafe_code)]
#![deny(clippy::all, missing_docs)]

use core::time::Duration;

mod host;
#[cfg(target_os = "linux")]
mod netlink;
mod seq;

pub use host::{loopback_channel, LoopbackClient, LoopbackServer};
#[cfg(target_os = "linux")]
pub use netlink::NetlinkClient;
pub use seq::SeqGen;

/// Result type returned by transport operations.
pub type Result<T> = core::result::Result<T, IpcError>;

/// Behaviour of a blocking call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Block until the operation completes.
    Blocking,
    /// Return immediately if no progress can be made.
    NonBlocking,
    /// Block until either the operation completes or the timeout expires.
    Timeout(Duration),
}

impl Wait {
    /// Returns `true` when the caller requested a non-blocking attempt.
    pub const fn is_non_blocking(self) -> bool {
        matches!(self, Self::NonBlocking)
    }

    /// Converts a [`Wait::Timeout`] variant into its [`Duration`].
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Timeout(duration) => Some(duration),
            Self::Blocking | Self::NonBlocking => None,
        }
    }
}

/// Errors produced by a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IpcError {
    /// Operation could not progress without blocking.
    #[error("operation would block")]
    WouldBlock,
    /// The caller exceeded the requested timeout.
    #[error("operation timed out")]
    Timeout,
    /// The opposite endpoint disconnected.
    #[error("peer disconnected")]
    Disconnected,
    /// The operating system rejected the call.
    #[error("os error {0}")]
    Os(i32),
    /// The transport is not available on this platform.
    #[error("transport not supported for this configuration")]
    Unsupported,
}

/// One datagram received by a server, tagged with the sender's port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
    /// Port of the sending client; replies are addressed to it.
    pub port: u32,
    /// Raw datagram bytes.
    pub bytes: Vec<u8>,
}

/// Client side of a channel sending requests and receiving replies.
pub trait Client {
    /// Sends one request datagram.
    fn send(&self, frame: &[u8], wait: Wait) -> Result<()>;

    /// Receives the next datagram addressed to this client.
    fn recv(&self, wait: Wait) -> Result<Vec<u8>>;
}

impl<C: Client + ?Sized> Client for &C {
    fn send(&self, frame: &[u8], wait: Wait) -> Result<()> {
        (**self).send(frame, wait)
    }

    fn recv(&self, wait: Wait) -> Result<Vec<u8>> {
        (**self).recv(wait)
    }
}

/// Server side of a channel receiving requests and delivering replies.
pub trait Server {
    /// Receives the next request datagram.
    fn recv(&self, wait: Wait) -> Result<Datagram>;

    /// Sends a reply datagram to `port`.
    fn send(&self, port: u32, frame: &[u8], wait: Wait) -> Result<()>;
}
