// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Client library for the physmem service
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + `tests/client.rs` (scripted transport)
//!
//! PUBLIC API:
//!   - ServiceClient: resolve the family, read/write target memory
//!   - WireValue: typed reads of plain numeric values
//!   - find_pid() / module_base(): proc filesystem helpers
//!   - ClientConfig: TOML configuration (`PHYSMEM_CONFIG`)
//!   - cli: the `physmem` command-line front-end
//!
//! INVARIANTS:
//!   - Oversized requests are refused before anything is transmitted
//!   - Automatic resolution is attempted once per client; failures are sticky until an
//!     explicit `resolve_channel()`
//!   - Replies are matched by sequence number; stale frames are discarded

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

pub mod cli;
mod client;
mod config;
mod proc;
mod value;

pub use client::{ServiceClient, DEFAULT_TIMEOUT};
pub use config::{ClientConfig, ConfigError, CONFIG_ENV, DEFAULT_CONFIG_PATH};
pub use proc::{find_pid, module_base, ProcError};
pub use value::WireValue;

use physmem_ipc::IpcError;
use physmem_wire::{WireError, MAX_PAYLOAD};

/// Result alias for client operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Failures surfaced by [`ServiceClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// More than [`MAX_PAYLOAD`] bytes were requested; nothing was sent.
    #[error("{0} bytes exceeds the {MAX_PAYLOAD}-byte limit")]
    SizeExceeded(usize),
    /// The family name could not be resolved to a channel id.
    #[error("service family could not be resolved")]
    ServiceUnresolved,
    /// The transport failed or no reply arrived in time.
    #[error("service unavailable: {0}")]
    Unavailable(IpcError),
    /// A reply could not be decoded.
    #[error("malformed reply: {0}")]
    MalformedMessage(#[from] WireError),
    /// The service refused the request.
    #[error("request rejected with errno {errno}")]
    Rejected {
        /// Positive errno from the error reply.
        errno: i32,
    },
}
