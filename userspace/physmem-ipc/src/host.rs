// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-process datagram emulation for host-based testing
//!
//! OWNERS: @runtime
//!
//! PUBLIC API:
//!   - loopback_channel(): client/server pair backed by in-memory channels
//!   - LoopbackClient::sibling(): additional clients on the same server
//!
//! INVARIANTS:
//!   - Datagram boundaries are preserved
//!   - Each client gets a distinct non-zero port; replies reach only that client
//!   - Replies to a port whose client was dropped are discarded silently
//!
//! ERROR CONDITIONS:
//!   - IpcError::Disconnected: the other side was dropped
//!   - IpcError::WouldBlock: nothing queued in non-blocking mode
//!   - IpcError::Timeout: nothing arrived before the deadline
//!
//! TEST SCENARIOS:
//!   - loopback_roundtrip(): request tagged with port, reply routed back
//!   - recv_timeout(): empty reply queue times out
//!   - replies_are_routed_per_client(): two clients never see each other's replies

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Client, Datagram, IpcError, Result, Server, Wait};

#[derive(Default)]
struct Routes {
    ports: Mutex<HashMap<u32, Sender<Vec<u8>>>>,
    next_port: Mutex<u32>,
}

impl Routes {
    fn attach(self: &Arc<Self>, request_tx: Sender<Datagram>) -> LoopbackClient {
        let port = {
            let mut next = self.next_port.lock();
            *next = next.wrapping_add(1).max(1);
            *next
        };
        let (rsp_tx, rsp_rx) = mpsc::channel::<Vec<u8>>();
        self.ports.lock().insert(port, rsp_tx);
        LoopbackClient {
            port,
            request_tx,
            response_rx: Mutex::new(rsp_rx),
            routes: Arc::clone(self),
        }
    }
}

/// Creates a loopback client/server pair backed by in-memory channels.
///
/// The server holds no request sender: once every client is dropped its `recv` reports
/// [`IpcError::Disconnected`].
pub fn loopback_channel() -> (LoopbackClient, LoopbackServer) {
    let (req_tx, req_rx) = mpsc::channel::<Datagram>();
    let routes = Arc::new(Routes::default());
    let client = routes.attach(req_tx);
    (client, LoopbackServer { request_rx: Mutex::new(req_rx), routes })
}

fn recv_with<T>(receiver: &Receiver<T>, wait: Wait) -> Result<T> {
    let try_once = |receiver: &Receiver<T>| {
        receiver.try_recv().map_err(|err| match err {
            TryRecvError::Empty => IpcError::WouldBlock,
            TryRecvError::Disconnected => IpcError::Disconnected,
        })
    };
    match wait {
        Wait::Blocking => receiver.recv().map_err(|_| IpcError::Disconnected),
        Wait::NonBlocking => try_once(receiver),
        Wait::Timeout(timeout) if timeout.is_zero() => try_once(receiver),
        Wait::Timeout(timeout) => receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => IpcError::Timeout,
            RecvTimeoutError::Disconnected => IpcError::Disconnected,
        }),
    }
}

/// Client implementation backed by in-memory channels.
pub struct LoopbackClient {
    port: u32,
    request_tx: Sender<Datagram>,
    response_rx: Mutex<Receiver<Vec<u8>>>,
    routes: Arc<Routes>,
}

impl LoopbackClient {
    /// Port the server sees for this client.
    pub fn port(&self) -> u32 {
        self.port
    }

    /// Attaches another client with its own port to the same server.
    pub fn sibling(&self) -> LoopbackClient {
        self.routes.attach(self.request_tx.clone())
    }
}

impl Drop for LoopbackClient {
    fn drop(&mut self) {
        self.routes.ports.lock().remove(&self.port);
    }
}

impl Client for LoopbackClient {
    fn send(&self, frame: &[u8], _wait: Wait) -> Result<()> {
        let datagram = Datagram { port: self.port, bytes: frame.to_vec() };
        self.request_tx.send(datagram).map_err(|_| IpcError::Disconnected)
    }

    fn recv(&self, wait: Wait) -> Result<Vec<u8>> {
        recv_with(&self.response_rx.lock(), wait)
    }
}

/// Server implementation backed by in-memory channels.
pub struct LoopbackServer {
    request_rx: Mutex<Receiver<Datagram>>,
    routes: Arc<Routes>,
}

impl Server for LoopbackServer {
    fn recv(&self, wait: Wait) -> Result<Datagram> {
        recv_with(&self.request_rx.lock(), wait)
    }

    fn send(&self, port: u32, frame: &[u8], _wait: Wait) -> Result<()> {
        let Some(tx) = self.routes.ports.lock().get(&port).cloned() else {
            log::debug!("reply to unknown port {port} dropped");
            return Ok(());
        };
        if tx.send(frame.to_vec()).is_err() {
            log::debug!("reply to closed port {port} dropped");
        }
        Ok(())
    }
}
