// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: physmem wire protocol (generic-netlink style framing + packed memory request)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + `tests/codec.rs` (property tests for the round-trip laws)
//!
//! PUBLIC API:
//!   - `MemoryRequest`: packed 276-byte request/reply body
//!   - `MessageBuilder` / `Message`: message header + command header + attribute frames
//!   - `messages()`: iterate every message packed into one datagram
//!   - `control`: family-name → family-id handshake
//!   - `encode_error()`: negative-errno reply used by the privileged side
//!
//! INVARIANTS:
//!   - Never panics on malformed/truncated input
//!   - Attribute frames start on 4-byte boundaries; declared lengths exclude padding
//!   - Header and request fields use host byte order, like the netlink transport they ride on

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

pub mod control;
mod frame;
mod request;

pub use frame::{
    align4, encode_error, find_attr, messages, Attribute, Attributes, GenlHeader, Message,
    MessageBuilder, MessageHeader, Messages, Payload, GENL_HDRLEN, NLA_HDRLEN, NLMSG_DONE,
    NLMSG_ERROR, NLMSG_HDRLEN, NLM_F_ACK, NLM_F_REQUEST,
};
pub use request::{
    decode_memory_message, encode_memory_request, encode_read_reply, Command, MemoryRequest,
    MAX_PAYLOAD, REQUEST_WIRE_LEN,
};

/// Attribute type carrying the packed [`MemoryRequest`].
pub const ATTR_DATA: u16 = 1;
/// Version advertised in the command header of family traffic.
pub const FAMILY_VERSION: u8 = 1;
/// Service name the privileged side registers under unless configured otherwise.
pub const DEFAULT_FAMILY_NAME: &str = "PHYSMEM_GENL";

/// errno values carried by error replies.
pub mod errno {
    /// No such entry (unknown family).
    pub const ENOENT: i32 = 2;
    /// No such process.
    pub const ESRCH: i32 = 3;
    /// Bad address (translation or frame failure).
    pub const EFAULT: i32 = 14;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// Operation not supported (unknown command).
    pub const EOPNOTSUPP: i32 = 95;
}

/// Result alias for codec operations.
pub type Result<T> = core::result::Result<T, WireError>;

/// Errors produced while encoding or decoding frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Buffer ended before a header or declared payload was complete.
    #[error("frame truncated: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes the structure requires.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
    /// A declared length is smaller than the header it belongs to.
    #[error("declared length {0} is shorter than its header")]
    BadLength(usize),
    /// An attribute the message must carry is absent.
    #[error("attribute {0} missing")]
    MissingAttribute(u16),
    /// A request body did not have the fixed packed size.
    #[error("request body is {0} bytes, expected {REQUEST_WIRE_LEN}")]
    BadRequestSize(usize),
    /// Message type does not match what the caller expected.
    #[error("unexpected message type {0:#06x}")]
    UnexpectedType(u16),
    /// Command byte is not part of the protocol.
    #[error("unexpected command {0}")]
    UnexpectedCommand(u8),
    /// A string attribute was not valid UTF-8.
    #[error("attribute string is not valid utf-8")]
    BadString,
    /// A payload or name does not fit the field it is encoded into.
    #[error("value exceeds the encodable size")]
    TooLarge,
}
