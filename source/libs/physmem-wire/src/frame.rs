// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Message and attribute framing.
//!
//! Message shape: `[len:u32, type:u16, flags:u16, seq:u32, port:u32] [cmd:u8, version:u8, 0:u16] attrs...`
//! Attribute shape: `[len:u16, type:u16] payload pad-to-4`, with `len = 4 + payload.len()`.

use crate::{Result, WireError};

/// Size of the message header.
pub const NLMSG_HDRLEN: usize = 16;
/// Size of the command header that follows the message header.
pub const GENL_HDRLEN: usize = 4;
/// Size of an attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Message type of an error / acknowledgement message.
pub const NLMSG_ERROR: u16 = 2;
/// Message type terminating a multi-part dump.
pub const NLMSG_DONE: u16 = 3;
/// Flag set on every client request.
pub const NLM_F_REQUEST: u16 = 1;
/// Flag asking the receiver to acknowledge a request with a zero errno.
pub const NLM_F_ACK: u16 = 4;

const NLA_TYPE_MASK: u16 = 0x3fff;

/// Rounds `len` up to the next 4-byte boundary.
pub const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Fixed message header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message length including this header, excluding trailing alignment.
    pub len: u32,
    /// Channel the message is addressed to (family id, control or error).
    pub msg_type: u16,
    /// Request flags.
    pub flags: u16,
    /// Sequence number echoed by replies.
    pub seq: u32,
    /// Sender port.
    pub port: u32,
}

impl MessageHeader {
    /// Parses the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < NLMSG_HDRLEN {
            return Err(WireError::Truncated { needed: NLMSG_HDRLEN, have: buf.len() });
        }
        Ok(Self {
            len: read_u32(buf, 0),
            msg_type: read_u16(buf, 4),
            flags: read_u16(buf, 6),
            seq: read_u32(buf, 8),
            port: read_u32(buf, 12),
        })
    }

    /// Serialises the header.
    pub fn to_bytes(&self) -> [u8; NLMSG_HDRLEN] {
        let mut out = [0u8; NLMSG_HDRLEN];
        out[0..4].copy_from_slice(&self.len.to_ne_bytes());
        out[4..6].copy_from_slice(&self.msg_type.to_ne_bytes());
        out[6..8].copy_from_slice(&self.flags.to_ne_bytes());
        out[8..12].copy_from_slice(&self.seq.to_ne_bytes());
        out[12..16].copy_from_slice(&self.port.to_ne_bytes());
        out
    }
}

/// Command header carried by family and control messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenlHeader {
    /// Command identifier.
    pub cmd: u8,
    /// Interface version.
    pub version: u8,
}

impl GenlHeader {
    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < GENL_HDRLEN {
            return Err(WireError::Truncated { needed: GENL_HDRLEN, have: buf.len() });
        }
        Ok(Self { cmd: buf[0], version: buf[1] })
    }
}

/// One attribute frame borrowed from a message body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attribute<'a> {
    /// Attribute type with the nested/byte-order flag bits stripped.
    pub kind: u16,
    /// Unpadded payload.
    pub payload: &'a [u8],
}

/// Iterator over the attribute frames of a message.
///
/// Yields an error once and then stops when the stream is malformed.
#[derive(Clone, Debug)]
pub struct Attributes<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> Attributes<'a> {
    /// Wraps a raw attribute stream.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Result<Attribute<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        let buf = self.buf;
        if buf.len() < NLA_HDRLEN {
            self.failed = true;
            return Some(Err(WireError::Truncated { needed: NLA_HDRLEN, have: buf.len() }));
        }
        let len = read_u16(buf, 0) as usize;
        let kind = read_u16(buf, 2) & NLA_TYPE_MASK;
        if len < NLA_HDRLEN {
            self.failed = true;
            return Some(Err(WireError::BadLength(len)));
        }
        if len > buf.len() {
            self.failed = true;
            return Some(Err(WireError::Truncated { needed: len, have: buf.len() }));
        }
        // The final attribute may omit its padding.
        let advance = align4(len).min(buf.len());
        self.buf = &buf[advance..];
        Some(Ok(Attribute { kind, payload: &buf[NLA_HDRLEN..len] }))
    }
}

/// Returns the payload of the first attribute of type `kind`.
pub fn find_attr(attrs: Attributes<'_>, kind: u16) -> Result<Option<&[u8]>> {
    for attr in attrs {
        let attr = attr?;
        if attr.kind == kind {
            return Ok(Some(attr.payload));
        }
    }
    Ok(None)
}

/// Decoded body of a message.
#[derive(Clone, Debug)]
pub enum Payload<'a> {
    /// Family or control traffic.
    Genl {
        /// Command header.
        header: GenlHeader,
        /// Attribute stream following the command header.
        attrs: Attributes<'a>,
    },
    /// Error reply; `errno` is negative, zero is a plain acknowledgement.
    Error {
        /// Errno as sent by the peer.
        errno: i32,
    },
    /// End of a multi-part reply.
    Done,
}

/// One message borrowed from a datagram.
#[derive(Clone, Copy, Debug)]
pub struct Message<'a> {
    /// Parsed message header.
    pub header: MessageHeader,
    body: &'a [u8],
}

impl<'a> Message<'a> {
    /// Parses the message at the start of `buf`, validating its declared length.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let header = MessageHeader::parse(buf)?;
        let len = header.len as usize;
        if len < NLMSG_HDRLEN {
            return Err(WireError::BadLength(len));
        }
        if len > buf.len() {
            return Err(WireError::Truncated { needed: len, have: buf.len() });
        }
        Ok(Self { header, body: &buf[NLMSG_HDRLEN..len] })
    }

    /// Raw bytes following the message header.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Interprets the body according to the message type.
    pub fn payload(&self) -> Result<Payload<'a>> {
        match self.header.msg_type {
            NLMSG_ERROR => {
                if self.body.len() < 4 {
                    return Err(WireError::Truncated { needed: 4, have: self.body.len() });
                }
                let errno = read_u32(self.body, 0) as i32;
                Ok(Payload::Error { errno })
            }
            NLMSG_DONE => Ok(Payload::Done),
            _ => {
                let header = GenlHeader::parse(self.body)?;
                Ok(Payload::Genl { header, attrs: Attributes::new(&self.body[GENL_HDRLEN..]) })
            }
        }
    }
}

/// Iterator over the messages packed into one datagram.
#[derive(Clone, Debug)]
pub struct Messages<'a> {
    buf: &'a [u8],
    failed: bool,
}

/// Iterates every message in `datagram`; stops after the first malformed one.
pub fn messages(datagram: &[u8]) -> Messages<'_> {
    Messages { buf: datagram, failed: false }
}

impl<'a> Iterator for Messages<'a> {
    type Item = Result<Message<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        match Message::parse(self.buf) {
            Ok(msg) => {
                let advance = align4(msg.header.len as usize).min(self.buf.len());
                self.buf = &self.buf[advance..];
                Some(Ok(msg))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Incrementally builds one message; the length field is patched by [`MessageBuilder::finish`].
#[derive(Debug)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    /// Starts a message with the given header fields and command header.
    pub fn new(msg_type: u16, flags: u16, seq: u32, port: u32, genl: GenlHeader) -> Self {
        let header = MessageHeader { len: 0, msg_type, flags, seq, port };
        let mut buf = Vec::with_capacity(NLMSG_HDRLEN + GENL_HDRLEN + 64);
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&[genl.cmd, genl.version, 0, 0]);
        Self { buf }
    }

    /// Appends one attribute frame plus its alignment padding.
    pub fn attr(&mut self, kind: u16, payload: &[u8]) -> Result<&mut Self> {
        let len = NLA_HDRLEN + payload.len();
        let len16 = u16::try_from(len).map_err(|_| WireError::TooLarge)?;
        self.buf.extend_from_slice(&len16.to_ne_bytes());
        self.buf.extend_from_slice(&(kind & NLA_TYPE_MASK).to_ne_bytes());
        self.buf.extend_from_slice(payload);
        self.buf.resize(align4(self.buf.len()), 0);
        Ok(self)
    }

    /// Patches the length field and returns the encoded message.
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }
}

/// Encodes an error reply for `offending`; `errno` is a positive errno value.
pub fn encode_error(errno: i32, offending: &MessageHeader) -> Vec<u8> {
    let len = NLMSG_HDRLEN + 4 + NLMSG_HDRLEN;
    let header = MessageHeader {
        len: len as u32,
        msg_type: NLMSG_ERROR,
        flags: 0,
        seq: offending.seq,
        port: offending.port,
    };
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&(-errno).to_ne_bytes());
    out.extend_from_slice(&offending.to_bytes());
    out
}
