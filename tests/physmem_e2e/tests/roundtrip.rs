// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Client ↔ service round trips over the loopback transport
//! OWNERS: @runtime
//!
//! TEST_SCENARIOS:
//!   - read_sixteen_bytes(): pid 1234 at 0x7f0000001000, 16 bytes of payload
//!   - unknown_pid_is_rejected(): ESRCH through the error reply
//!   - unmapped_address_is_rejected(): EFAULT, channel stays resolved
//!   - write_then_read_across_page_boundary()
//!   - failed_write_leaves_memory_untouched()
//!   - sibling_clients_get_their_own_replies()
//!   - wrong_family_name_is_unresolved()
//!   - stopped_service_leaves_channel_unresolved()
//!   - write_then_read_returns_written_bytes(): any offset over two pages, any length up to 256

use physmem_client::{Error, ServiceClient};
use physmem_e2e::{Target, E2E_TIMEOUT};
use physmem_mm::{PagingLayout, PAGE_SIZE};
use physmem_wire::errno;
use proptest::prelude::*;

const PID: u32 = 1234;
const BASE: u64 = 0x7f00_0000_1000;

fn target(pages: usize) -> Target {
    Target::new(PagingLayout::x86_64_five_level(), PID, BASE, pages)
}

#[test]
fn read_sixteen_bytes() {
    let target = target(1);
    let pattern: Vec<u8> = (0x10..0x20).collect();
    target.poke(0, 0, &pattern);
    let bytes = target.with_service(|mut client| {
        assert_eq!(client.resolve_channel(), Ok(0x20));
        client.read(PID, BASE, 16)
    });
    assert_eq!(bytes.unwrap(), pattern);
}

#[test]
fn unknown_pid_is_rejected() {
    let target = target(1);
    let result = target.with_service(|mut client| client.read(99_999, BASE, 8));
    assert_eq!(result, Err(Error::Rejected { errno: errno::ESRCH }));
}

#[test]
fn unmapped_address_is_rejected() {
    let target = target(1);
    target.with_service(|mut client| {
        let result = client.read(PID, BASE + 16 * PAGE_SIZE as u64, 8);
        assert_eq!(result, Err(Error::Rejected { errno: errno::EFAULT }));
        assert!(client.channel_id().is_some());
        assert_eq!(client.read(PID, BASE, 4).unwrap(), vec![0; 4]);
    });
}

#[test]
fn write_then_read_across_page_boundary() {
    let target = target(2);
    let data: Vec<u8> = (0..64u8).collect();
    let start = BASE + PAGE_SIZE as u64 - 32;
    let readback = target.with_service(|mut client| {
        client.write(PID, start, &data).unwrap();
        client.read(PID, start, data.len()).unwrap()
    });
    assert_eq!(readback, data);
    assert_eq!(target.peek(0, PAGE_SIZE - 32, 32), data[..32].to_vec());
    assert_eq!(target.peek(1, 0, 32), data[32..].to_vec());
}

#[test]
fn failed_write_leaves_memory_untouched() {
    // Second page of the range is unmapped.
    let target = target(1);
    target.poke(0, PAGE_SIZE - 8, &[0xaa; 8]);
    let start = BASE + PAGE_SIZE as u64 - 8;
    target.with_service(|mut client| {
        client.write(PID, start, &[0x55; 16]).unwrap();
        // A later read on the same channel proves the write was processed first.
        assert_eq!(client.read(PID, start, 8).unwrap(), vec![0xaa; 8]);
    });
    assert_eq!(target.peek(0, PAGE_SIZE - 8, 8), vec![0xaa; 8]);
}

#[test]
fn typed_values_roundtrip() {
    let target = target(1);
    let value = target.with_service(|mut client| {
        client.write_value(PID, BASE + 0x40, -12_345_i64).unwrap();
        client.read_value::<i64>(PID, BASE + 0x40).unwrap()
    });
    assert_eq!(value, -12_345);
}

#[test]
fn sibling_clients_get_their_own_replies() {
    let target = target(1);
    target.poke(0, 0, b"first");
    target.poke(0, 0x800, b"second");
    target.with_service(|mut first| {
        let mut second = ServiceClient::new(first.transport().sibling()).timeout(E2E_TIMEOUT);
        std::thread::scope(|scope| {
            let other = scope.spawn(move || second.read(PID, BASE + 0x800, 6));
            assert_eq!(first.read(PID, BASE, 5).unwrap(), b"first".to_vec());
            assert_eq!(other.join().unwrap().unwrap(), b"second".to_vec());
        });
    });
}

#[test]
fn wrong_family_name_is_unresolved() {
    let target = target(1);
    target.with_service(|client| {
        let mut client = client.family("NOT_PHYSMEM");
        assert_eq!(client.read(PID, BASE, 4), Err(Error::ServiceUnresolved));
        assert_eq!(client.resolve_channel(), Err(Error::ServiceUnresolved));
    });
}

#[test]
fn oversized_read_never_reaches_the_service() {
    let target = target(1);
    target.with_service(|mut client| {
        assert_eq!(client.read(PID, BASE, 257), Err(Error::SizeExceeded(257)));
        assert_eq!(client.channel_id(), None);
    });
}

#[test]
fn stopped_service_leaves_channel_unresolved() {
    let (transport, server) = physmem_ipc::loopback_channel();
    drop(server);
    let mut client = ServiceClient::new(transport).timeout(E2E_TIMEOUT);
    assert_eq!(client.read(PID, BASE, 4), Err(Error::ServiceUnresolved));
    assert_eq!(client.write(PID, BASE, &[1]), Err(Error::ServiceUnresolved));
    assert_eq!(client.resolve_channel(), Err(Error::ServiceUnresolved));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn reads_see_what_was_poked(offset in 0usize..PAGE_SIZE - 256, len in 0usize..=256) {
        let target = target(1);
        let data: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
        target.poke(0, offset, &data);
        let read = target.with_service(|mut client| client.read(PID, BASE + offset as u64, len));
        prop_assert_eq!(read.unwrap(), data);
    }

    #[test]
    fn write_then_read_returns_written_bytes(
        offset in 0usize..2 * PAGE_SIZE - 256,
        data in proptest::collection::vec(any::<u8>(), 0..=256),
    ) {
        let target = target(2);
        let vaddr = BASE + offset as u64;
        let read = target.with_service(|mut client| {
            client.write(PID, vaddr, &data)?;
            client.read(PID, vaddr, data.len())
        });
        prop_assert_eq!(read.unwrap(), data);
    }
}
