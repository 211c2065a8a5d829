// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Datagram routing for the physmem family and the control handshake
//! OWNERS: @services-team
//!
//! Every message in a received datagram is handled in order:
//!   - control lookups for our family name get a NEWFAMILY reply, other names ENOENT
//!   - family reads get a data reply, writes get nothing unless NLM_F_ACK is set
//!   - refused requests get an error message carrying the errno and the offending header
//!   - messages for other families get ENOENT; acks and dumps from peers are ignored

use physmem_mm::{PagingLayout, PhysicalMemory, ProcessLookup};
use physmem_wire::control::{encode_family_reply, parse_family_lookup, GENL_ID_CTRL};
use physmem_wire::{
    encode_error, encode_read_reply, errno, find_attr, messages, Command, Message, Payload,
    ATTR_DATA, NLMSG_DONE, NLMSG_ERROR, NLM_F_ACK,
};

use crate::dispatch::{Dispatcher, Reply};
use crate::ServerError;

/// Name and id the family is registered under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Family {
    /// Registered name.
    pub name: String,
    /// Channel id carried in the message type.
    pub id: u16,
}

/// Request router bound to one family registration.
#[derive(Debug)]
pub struct Service<'a, M, P> {
    family: Family,
    dispatcher: Dispatcher<'a, M, P>,
}

impl<'a, M: PhysicalMemory, P: ProcessLookup> Service<'a, M, P> {
    /// Registers `family` over the given platform.
    pub fn new(family: Family, memory: &'a M, tasks: &'a P, layout: &'a PagingLayout) -> Self {
        Self { family, dispatcher: Dispatcher::new(memory, tasks, layout) }
    }

    /// Family this service answers for.
    pub fn family(&self) -> &Family {
        &self.family
    }

    /// Handles every message of `datagram` sent from `port`; returns the reply datagrams.
    pub fn handle(&self, port: u32, datagram: &[u8]) -> Result<Vec<Vec<u8>>, ServerError> {
        let mut replies = Vec::new();
        for msg in messages(datagram) {
            let msg = match msg {
                Ok(msg) => msg,
                Err(err) => {
                    log::warn!("dropping malformed datagram from port {port}: {err}");
                    break;
                }
            };
            if let Some(reply) = self.handle_message(port, &msg)? {
                replies.push(reply);
            }
        }
        Ok(replies)
    }

    fn handle_message(&self, port: u32, msg: &Message<'_>) -> Result<Option<Vec<u8>>, ServerError> {
        let header = &msg.header;
        match header.msg_type {
            NLMSG_ERROR | NLMSG_DONE => Ok(None),
            GENL_ID_CTRL => self.handle_control(port, msg),
            id if id == self.family.id => self.handle_family(port, msg),
            other => {
                log::debug!("port {port}: no family with id {other:#x}");
                Ok(Some(encode_error(errno::ENOENT, header)))
            }
        }
    }

    fn handle_control(&self, port: u32, msg: &Message<'_>) -> Result<Option<Vec<u8>>, ServerError> {
        let header = &msg.header;
        let name = match parse_family_lookup(msg) {
            Ok(name) => name,
            Err(err) => {
                log::debug!("port {port}: bad control request: {err}");
                return Ok(Some(encode_error(errno::EINVAL, header)));
            }
        };
        if name != self.family.name {
            log::debug!("port {port}: unknown family {name:?}");
            return Ok(Some(encode_error(errno::ENOENT, header)));
        }
        let reply = encode_family_reply(self.family.id, &self.family.name, header.seq, port)?;
        Ok(Some(reply))
    }

    fn handle_family(&self, port: u32, msg: &Message<'_>) -> Result<Option<Vec<u8>>, ServerError> {
        let header = &msg.header;
        let Ok(Payload::Genl { header: genl, attrs }) = msg.payload() else {
            return Ok(Some(encode_error(errno::EINVAL, header)));
        };
        let Ok(command) = Command::try_from(genl.cmd) else {
            log::debug!("port {port}: unsupported command {}", genl.cmd);
            return Ok(Some(encode_error(errno::EOPNOTSUPP, header)));
        };
        let body = match find_attr(attrs, ATTR_DATA) {
            Ok(body) => body,
            Err(err) => {
                log::debug!("port {port}: bad attributes: {err}");
                return Ok(Some(encode_error(errno::EINVAL, header)));
            }
        };
        match self.dispatcher.dispatch(command, body) {
            Ok(Reply::Read(reply)) => {
                Ok(Some(encode_read_reply(self.family.id, header.seq, port, &reply)?))
            }
            Ok(Reply::Written) if header.flags & NLM_F_ACK != 0 => Ok(Some(encode_error(0, header))),
            Ok(Reply::Written) => Ok(None),
            Err(err) => {
                log::debug!("port {port}: {command:?} refused: {err}");
                Ok(Some(encode_error(err.errno(), header)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physmem_mm::{Machine, PageFlags};
    use physmem_wire::control::{encode_family_lookup, family_id_from_reply};
    use physmem_wire::{
        encode_memory_request, GenlHeader, MemoryRequest, MessageBuilder, FAMILY_VERSION,
        NLM_F_REQUEST,
    };

    const ID: u16 = 0x20;

    fn machine() -> Machine {
        let m = Machine::new(PagingLayout::sv39(), 32);
        let root = m.spawn(7, "target").unwrap();
        m.mapper(root).map_new(0x4000, PageFlags::VALID | PageFlags::USER).unwrap();
        m
    }

    fn service(m: &Machine) -> Service<'_, physmem_mm::FrameStore, physmem_mm::ProcessTable> {
        let family = Family { name: "PHYSMEM_GENL".into(), id: ID };
        Service::new(family, m.memory(), m.tasks(), m.layout())
    }

    fn errno_of(reply: &[u8]) -> i32 {
        match Message::parse(reply).unwrap().payload().unwrap() {
            Payload::Error { errno } => errno,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn control_lookup_resolves_family() {
        let m = machine();
        let svc = service(&m);
        let replies = svc.handle(5, &encode_family_lookup("PHYSMEM_GENL", 1).unwrap()).unwrap();
        assert_eq!(family_id_from_reply(&replies[0]).unwrap(), Some(ID));
    }

    #[test]
    fn unknown_family_name_is_enoent() {
        let m = machine();
        let svc = service(&m);
        let replies = svc.handle(5, &encode_family_lookup("OTHER", 1).unwrap()).unwrap();
        assert_eq!(errno_of(&replies[0]), -errno::ENOENT);
        assert_eq!(family_id_from_reply(&replies[0]).unwrap(), None);
    }

    #[test]
    fn write_is_silent_unless_acked() {
        let m = machine();
        let svc = service(&m);
        let req = MemoryRequest::with_data(7, 0x4000, b"hi").unwrap();
        let silent = encode_memory_request(ID, 2, Command::Write, &req).unwrap();
        assert!(svc.handle(5, &silent).unwrap().is_empty());

        let genl = GenlHeader { cmd: Command::Write as u8, version: FAMILY_VERSION };
        let mut acked = MessageBuilder::new(ID, NLM_F_REQUEST | NLM_F_ACK, 3, 0, genl);
        acked.attr(ATTR_DATA, &req.to_bytes()).unwrap();
        let replies = svc.handle(5, &acked.finish()).unwrap();
        assert_eq!(errno_of(&replies[0]), 0);
    }

    #[test]
    fn refused_request_carries_errno_and_seq() {
        let m = machine();
        let svc = service(&m);
        let req = MemoryRequest::new(404, 0x4000, 4);
        let replies = svc.handle(5, &encode_memory_request(ID, 9, Command::Read, &req).unwrap()).unwrap();
        assert_eq!(errno_of(&replies[0]), -errno::ESRCH);
        assert_eq!(Message::parse(&replies[0]).unwrap().header.seq, 9);
    }

    #[test]
    fn unsupported_command_and_foreign_family() {
        let m = machine();
        let svc = service(&m);
        let genl = GenlHeader { cmd: 9, version: FAMILY_VERSION };
        let bytes = MessageBuilder::new(ID, NLM_F_REQUEST, 1, 0, genl).finish();
        assert_eq!(errno_of(&svc.handle(5, &bytes).unwrap()[0]), -errno::EOPNOTSUPP);

        let req = MemoryRequest::new(7, 0x4000, 4);
        let bytes = encode_memory_request(ID + 1, 1, Command::Read, &req).unwrap();
        assert_eq!(errno_of(&svc.handle(5, &bytes).unwrap()[0]), -errno::ENOENT);
    }

    #[test]
    fn every_message_in_a_datagram_is_handled() {
        let m = machine();
        let svc = service(&m);
        let mut datagram = encode_family_lookup("PHYSMEM_GENL", 1).unwrap();
        let req = MemoryRequest::new(7, 0x4000, 4);
        datagram.extend(encode_memory_request(ID, 2, Command::Read, &req).unwrap());
        let replies = svc.handle(5, &datagram).unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(Message::parse(&replies[1]).unwrap().header.msg_type, ID);
    }
}
