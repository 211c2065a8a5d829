// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Packed memory request body and the family messages that carry it.
//!
//! Body layout (276 bytes, no padding):
//! `[pid:u32 @0, vaddr:u64 @4, length:u64 @12, payload:[u8;256] @20]`

use core::fmt;

use crate::frame::{Message, MessageBuilder, Payload, GenlHeader, find_attr, NLM_F_REQUEST};
use crate::{Result, WireError, ATTR_DATA, FAMILY_VERSION};

/// Capacity of the payload buffer and hard ceiling of one transfer.
pub const MAX_PAYLOAD: usize = 256;
/// Encoded size of a [`MemoryRequest`].
pub const REQUEST_WIRE_LEN: usize = 4 + 8 + 8 + MAX_PAYLOAD;

const PID_AT: usize = 0;
const VADDR_AT: usize = 4;
const LENGTH_AT: usize = 12;
const PAYLOAD_AT: usize = 20;

/// Operation carried in the command header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Copy bytes out of the target's memory.
    Read = 1,
    /// Copy bytes into the target's memory.
    Write = 2,
}

impl TryFrom<u8> for Command {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Read),
            2 => Ok(Self::Write),
            other => Err(WireError::UnexpectedCommand(other)),
        }
    }
}

/// Request body, reused unchanged as the read reply.
#[derive(Clone, PartialEq, Eq)]
pub struct MemoryRequest {
    /// Target process id.
    pub pid: u32,
    /// Virtual address inside the target.
    pub vaddr: u64,
    /// Requested byte count; only the first `min(length, 256)` payload bytes are meaningful.
    pub length: u64,
    /// Data written (write) or returned (read reply).
    pub payload: [u8; MAX_PAYLOAD],
}

impl fmt::Debug for MemoryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = (self.length as usize).min(16);
        f.debug_struct("MemoryRequest")
            .field("pid", &self.pid)
            .field("vaddr", &format_args!("{:#x}", self.vaddr))
            .field("length", &self.length)
            .field("payload", &&self.payload[..shown])
            .finish()
    }
}

impl MemoryRequest {
    /// Builds a request with an empty payload (reads).
    pub fn new(pid: u32, vaddr: u64, length: u64) -> Self {
        Self { pid, vaddr, length, payload: [0u8; MAX_PAYLOAD] }
    }

    /// Builds a request whose payload holds `data` (writes).
    pub fn with_data(pid: u32, vaddr: u64, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_PAYLOAD {
            return Err(WireError::TooLarge);
        }
        let mut req = Self::new(pid, vaddr, data.len() as u64);
        req.payload[..data.len()].copy_from_slice(data);
        Ok(req)
    }

    /// Serialises the packed body.
    pub fn to_bytes(&self) -> [u8; REQUEST_WIRE_LEN] {
        let mut out = [0u8; REQUEST_WIRE_LEN];
        out[PID_AT..VADDR_AT].copy_from_slice(&self.pid.to_ne_bytes());
        out[VADDR_AT..LENGTH_AT].copy_from_slice(&self.vaddr.to_ne_bytes());
        out[LENGTH_AT..PAYLOAD_AT].copy_from_slice(&self.length.to_ne_bytes());
        out[PAYLOAD_AT..].copy_from_slice(&self.payload);
        out
    }

    /// Decodes a packed body; the slice must be exactly [`REQUEST_WIRE_LEN`] bytes.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != REQUEST_WIRE_LEN {
            return Err(WireError::BadRequestSize(buf.len()));
        }
        let mut pid = [0u8; 4];
        pid.copy_from_slice(&buf[PID_AT..VADDR_AT]);
        let mut vaddr = [0u8; 8];
        vaddr.copy_from_slice(&buf[VADDR_AT..LENGTH_AT]);
        let mut length = [0u8; 8];
        length.copy_from_slice(&buf[LENGTH_AT..PAYLOAD_AT]);
        let mut payload = [0u8; MAX_PAYLOAD];
        payload.copy_from_slice(&buf[PAYLOAD_AT..]);
        Ok(Self {
            pid: u32::from_ne_bytes(pid),
            vaddr: u64::from_ne_bytes(vaddr),
            length: u64::from_ne_bytes(length),
            payload,
        })
    }
}

/// Frames `req` as a family request.
pub fn encode_memory_request(
    family: u16,
    seq: u32,
    command: Command,
    req: &MemoryRequest,
) -> Result<Vec<u8>> {
    let genl = GenlHeader { cmd: command as u8, version: FAMILY_VERSION };
    let mut msg = MessageBuilder::new(family, NLM_F_REQUEST, seq, 0, genl);
    msg.attr(ATTR_DATA, &req.to_bytes())?;
    Ok(msg.finish())
}

/// Frames a read reply addressed back to `port` with the request's sequence number.
pub fn encode_read_reply(family: u16, seq: u32, port: u32, reply: &MemoryRequest) -> Result<Vec<u8>> {
    let genl = GenlHeader { cmd: Command::Read as u8, version: FAMILY_VERSION };
    let mut msg = MessageBuilder::new(family, 0, seq, port, genl);
    msg.attr(ATTR_DATA, &reply.to_bytes())?;
    Ok(msg.finish())
}

/// Decodes a family message into its command and data body.
///
/// The body is `None` when the message carries no data attribute; callers decide whether that
/// is an error.
pub fn decode_memory_message(msg: &Message<'_>) -> Result<(Command, Option<MemoryRequest>)> {
    let Payload::Genl { header, attrs } = msg.payload()? else {
        return Err(WireError::UnexpectedType(msg.header.msg_type));
    };
    let command = Command::try_from(header.cmd)?;
    let body = find_attr(attrs, ATTR_DATA)?.map(MemoryRequest::decode).transpose()?;
    Ok((command, body))
}
