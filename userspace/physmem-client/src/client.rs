// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Stateful client context for the physmem family
//! OWNERS: @runtime
//!
//! The context owns the transport, the family name, the cached channel id, the sequence
//! generator and the receive timeout. Nothing is global.
//!
//! ERROR CONDITIONS:
//!   - Error::SizeExceeded: request larger than MAX_PAYLOAD, nothing sent
//!   - Error::ServiceUnresolved: lookup failed now or on the first automatic attempt
//!   - Error::Unavailable: send failed or no matching reply before the deadline
//!   - Error::Rejected: the service answered with an error message
//!   - Error::MalformedMessage: the reply could not be decoded

use std::time::{Duration, Instant};

use physmem_ipc::{Client, IpcError, SeqGen, Wait};
use physmem_wire::control::{encode_family_lookup, family_id_from_reply};
use physmem_wire::{
    decode_memory_message, encode_memory_request, messages, Command, MemoryRequest, Payload,
    WireError, ATTR_DATA, DEFAULT_FAMILY_NAME, MAX_PAYLOAD,
};

use crate::config::ClientConfig;
use crate::value::WireValue;
use crate::{Error, Result};

/// Receive timeout used unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Unresolved,
    Resolved(u16),
    Failed,
}

/// Client context bound to one transport.
#[derive(Debug)]
pub struct ServiceClient<C> {
    transport: C,
    family_name: String,
    timeout: Duration,
    channel: Channel,
    seq: SeqGen,
}

impl<C: Client> ServiceClient<C> {
    /// Creates a client for the default family with the default timeout.
    pub fn new(transport: C) -> Self {
        Self {
            transport,
            family_name: DEFAULT_FAMILY_NAME.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            channel: Channel::Unresolved,
            seq: SeqGen::default(),
        }
    }

    /// Creates a client from configuration.
    pub fn with_config(transport: C, config: &ClientConfig) -> Self {
        Self::new(transport).family(&config.family_name).timeout(config.timeout())
    }

    /// Overrides the family name to resolve.
    pub fn family(mut self, name: &str) -> Self {
        self.family_name = name.to_owned();
        self
    }

    /// Overrides the receive timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cached channel id, if resolved.
    pub fn channel_id(&self) -> Option<u16> {
        match self.channel {
            Channel::Resolved(id) => Some(id),
            Channel::Unresolved | Channel::Failed => None,
        }
    }

    /// Borrow of the underlying transport.
    pub fn transport(&self) -> &C {
        &self.transport
    }

    /// Resolves the family name, reusing the cached id when present.
    ///
    /// Unlike automatic resolution this retries after an earlier failure.
    pub fn resolve_channel(&mut self) -> Result<u16> {
        if let Channel::Resolved(id) = self.channel {
            return Ok(id);
        }
        match self.lookup() {
            Ok(id) => {
                log::debug!("family {:?} resolved to {id:#x}", self.family_name);
                self.channel = Channel::Resolved(id);
                Ok(id)
            }
            Err(err) => {
                log::warn!("family {:?} unresolved: {err}", self.family_name);
                self.channel = Channel::Failed;
                Err(Error::ServiceUnresolved)
            }
        }
    }

    /// Reads `len` bytes at `vaddr` in process `pid`.
    pub fn read(&mut self, pid: u32, vaddr: u64, len: usize) -> Result<Vec<u8>> {
        if len > MAX_PAYLOAD {
            return Err(Error::SizeExceeded(len));
        }
        let family = self.channel()?;
        let seq = self.seq.next_seq();
        let request = MemoryRequest::new(pid, vaddr, len as u64);
        let frame = encode_memory_request(family, seq, Command::Read, &request)?;
        self.transport.send(&frame, Wait::Timeout(self.timeout)).map_err(Error::Unavailable)?;
        let datagram = self.await_reply(seq)?;
        let reply = decode_read_reply(family, seq, &datagram)?;
        Ok(reply.payload[..len].to_vec())
    }

    /// Writes `bytes` at `vaddr` in process `pid`; no reply is awaited.
    pub fn write(&mut self, pid: u32, vaddr: u64, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_PAYLOAD {
            return Err(Error::SizeExceeded(bytes.len()));
        }
        let family = self.channel()?;
        let seq = self.seq.next_seq();
        let request = MemoryRequest::with_data(pid, vaddr, bytes)?;
        let frame = encode_memory_request(family, seq, Command::Write, &request)?;
        self.transport.send(&frame, Wait::Timeout(self.timeout)).map_err(Error::Unavailable)
    }

    /// Reads one plain value.
    pub fn read_value<T: WireValue>(&mut self, pid: u32, vaddr: u64) -> Result<T> {
        let bytes = self.read(pid, vaddr, T::SIZE)?;
        T::from_ne_slice(&bytes).ok_or(Error::MalformedMessage(WireError::BadLength(bytes.len())))
    }

    /// Writes one plain value.
    pub fn write_value<T: WireValue>(&mut self, pid: u32, vaddr: u64, value: T) -> Result<()> {
        self.write(pid, vaddr, &value.to_ne_vec())
    }

    fn channel(&mut self) -> Result<u16> {
        match self.channel {
            Channel::Resolved(id) => Ok(id),
            Channel::Failed => Err(Error::ServiceUnresolved),
            Channel::Unresolved => self.resolve_channel(),
        }
    }

    fn lookup(&mut self) -> Result<u16> {
        let seq = self.seq.next_seq();
        let frame = encode_family_lookup(&self.family_name, seq)?;
        self.transport.send(&frame, Wait::Timeout(self.timeout)).map_err(Error::Unavailable)?;
        let datagram = self.await_reply(seq)?;
        family_id_from_reply(&datagram)?.ok_or(Error::ServiceUnresolved)
    }

    /// Receives until a datagram carrying a message with `seq` arrives or the deadline passes.
    fn await_reply(&self, seq: u32) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Unavailable(IpcError::Timeout));
            }
            let datagram = self.transport.recv(Wait::Timeout(remaining)).map_err(Error::Unavailable)?;
            let mut matched = false;
            for msg in messages(&datagram) {
                if msg?.header.seq == seq {
                    matched = true;
                    break;
                }
            }
            if matched {
                return Ok(datagram);
            }
            log::debug!("discarding stale reply while waiting for seq {seq}");
        }
    }
}

fn decode_read_reply(family: u16, seq: u32, datagram: &[u8]) -> Result<MemoryRequest> {
    for msg in messages(datagram) {
        let msg = msg?;
        if msg.header.seq != seq {
            continue;
        }
        match msg.payload()? {
            Payload::Error { errno } if errno != 0 => return Err(Error::Rejected { errno: -errno }),
            Payload::Error { .. } | Payload::Done => continue,
            Payload::Genl { .. } => {
                if msg.header.msg_type != family {
                    return Err(WireError::UnexpectedType(msg.header.msg_type).into());
                }
                let (_, body) = decode_memory_message(&msg)?;
                return body.ok_or(Error::MalformedMessage(WireError::MissingAttribute(ATTR_DATA)));
            }
        }
    }
    Err(WireError::MissingAttribute(ATTR_DATA).into())
}
