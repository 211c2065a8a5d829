// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Control handshake: resolve a family name to its numeric channel id.
//!
//! Request: type [`GENL_ID_CTRL`], cmd [`CTRL_CMD_GETFAMILY`], attr `FAMILY_NAME` = name + NUL.
//! Reply: type [`GENL_ID_CTRL`], cmd [`CTRL_CMD_NEWFAMILY`], attrs `FAMILY_ID` (u16) and
//! `FAMILY_NAME`.

use crate::frame::{find_attr, messages, GenlHeader, Message, MessageBuilder, Payload, NLM_F_REQUEST};
use crate::{Result, WireError};

/// Message type of the control family.
pub const GENL_ID_CTRL: u16 = 0x10;
/// Control command announcing a family (reply).
pub const CTRL_CMD_NEWFAMILY: u8 = 1;
/// Control command looking up a family.
pub const CTRL_CMD_GETFAMILY: u8 = 3;
/// Attribute holding the 2-byte family id.
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
/// Attribute holding the NUL-terminated family name.
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
/// Version used in control command headers.
pub const CTRL_VERSION: u8 = 1;
/// Maximum family name size including the terminating NUL.
pub const FAMILY_NAME_MAX: usize = 16;

fn name_attr(name: &str) -> Result<Vec<u8>> {
    if name.is_empty() || name.len() >= FAMILY_NAME_MAX || name.as_bytes().contains(&0) {
        return Err(WireError::TooLarge);
    }
    let mut out = Vec::with_capacity(name.len() + 1);
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    Ok(out)
}

/// Encodes a lookup request for `name`.
pub fn encode_family_lookup(name: &str, seq: u32) -> Result<Vec<u8>> {
    let genl = GenlHeader { cmd: CTRL_CMD_GETFAMILY, version: CTRL_VERSION };
    let mut msg = MessageBuilder::new(GENL_ID_CTRL, NLM_F_REQUEST, seq, 0, genl);
    msg.attr(CTRL_ATTR_FAMILY_NAME, &name_attr(name)?)?;
    Ok(msg.finish())
}

/// Extracts the requested family name from a lookup request.
pub fn parse_family_lookup(msg: &Message<'_>) -> Result<String> {
    if msg.header.msg_type != GENL_ID_CTRL {
        return Err(WireError::UnexpectedType(msg.header.msg_type));
    }
    let Payload::Genl { header, attrs } = msg.payload()? else {
        return Err(WireError::UnexpectedType(msg.header.msg_type));
    };
    if header.cmd != CTRL_CMD_GETFAMILY {
        return Err(WireError::UnexpectedCommand(header.cmd));
    }
    let raw = find_attr(attrs, CTRL_ATTR_FAMILY_NAME)?
        .ok_or(WireError::MissingAttribute(CTRL_ATTR_FAMILY_NAME))?;
    let trimmed = match raw.iter().position(|b| *b == 0) {
        Some(end) => &raw[..end],
        None => raw,
    };
    core::str::from_utf8(trimmed).map(str::to_owned).map_err(|_| WireError::BadString)
}

/// Encodes the reply announcing `name` under `id`.
pub fn encode_family_reply(id: u16, name: &str, seq: u32, port: u32) -> Result<Vec<u8>> {
    let genl = GenlHeader { cmd: CTRL_CMD_NEWFAMILY, version: CTRL_VERSION };
    let mut msg = MessageBuilder::new(GENL_ID_CTRL, 0, seq, port, genl);
    msg.attr(CTRL_ATTR_FAMILY_NAME, &name_attr(name)?)?
        .attr(CTRL_ATTR_FAMILY_ID, &id.to_ne_bytes())?;
    Ok(msg.finish())
}

/// Scans every message of a reply datagram for the family-id attribute.
///
/// Returns `Ok(None)` when the datagram is well formed but announces no id (for example an
/// error reply for an unknown family).
pub fn family_id_from_reply(datagram: &[u8]) -> Result<Option<u16>> {
    for msg in messages(datagram) {
        let msg = msg?;
        if msg.header.msg_type != GENL_ID_CTRL {
            continue;
        }
        let Payload::Genl { attrs, .. } = msg.payload()? else {
            continue;
        };
        if let Some(raw) = find_attr(attrs, CTRL_ATTR_FAMILY_ID)? {
            if raw.len() < 2 {
                return Err(WireError::Truncated { needed: 2, have: raw.len() });
            }
            return Ok(Some(u16::from_ne_bytes([raw[0], raw[1]])));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_error, MessageHeader};

    #[test]
    fn lookup_roundtrip() {
        let bytes = encode_family_lookup("PHYSMEM_GENL", 3).unwrap();
        let msg = Message::parse(&bytes).unwrap();
        assert_eq!(msg.header.flags, NLM_F_REQUEST);
        assert_eq!(parse_family_lookup(&msg).unwrap(), "PHYSMEM_GENL");
    }

    #[test]
    fn reply_carries_id() {
        let bytes = encode_family_reply(0x1f, "PHYSMEM_GENL", 3, 77).unwrap();
        assert_eq!(family_id_from_reply(&bytes).unwrap(), Some(0x1f));
    }

    #[test]
    fn reply_id_found_in_second_message() {
        let header = MessageHeader { len: 36, msg_type: 0x30, flags: 0, seq: 1, port: 0 };
        let mut datagram = encode_error(0, &header);
        datagram.extend_from_slice(&encode_family_reply(0x22, "X", 1, 0).unwrap());
        assert_eq!(family_id_from_reply(&datagram).unwrap(), Some(0x22));
    }

    #[test]
    fn error_reply_has_no_id() {
        let request = encode_family_lookup("NOPE", 9).unwrap();
        let header = Message::parse(&request).unwrap().header;
        let reply = encode_error(2, &header);
        assert_eq!(family_id_from_reply(&reply).unwrap(), None);
    }

    #[test]
    fn names_must_fit() {
        assert_eq!(encode_family_lookup("", 1).unwrap_err(), WireError::TooLarge);
        assert_eq!(encode_family_lookup("A_VERY_LONG_FAMILY", 1).unwrap_err(), WireError::TooLarge);
    }

    #[test]
    fn lookup_without_name_rejected() {
        let genl = GenlHeader { cmd: CTRL_CMD_GETFAMILY, version: CTRL_VERSION };
        let bytes = MessageBuilder::new(GENL_ID_CTRL, NLM_F_REQUEST, 1, 0, genl).finish();
        let msg = Message::parse(&bytes).unwrap();
        assert_eq!(
            parse_family_lookup(&msg).unwrap_err(),
            WireError::MissingAttribute(CTRL_ATTR_FAMILY_NAME)
        );
    }
}
