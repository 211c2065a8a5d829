// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: physmem service: family routing, memory dispatch and the serve loop
//! OWNERS: @services-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module + `tests/serve.rs` (loopback)
//!
//! PUBLIC API:
//!   - serve(): receive → route → reply loop over any `physmem_ipc::Server`
//!   - Service: family/control routing for one registration
//!   - Dispatcher: read/write execution against a platform
//!   - ServiceConfig: TOML configuration

#![forbid(unsafe_code)]

use std::path::Path;

use physmem_ipc::{IpcError, Server, Wait};
use physmem_mm::{PhysicalMemory, ProcessLookup};
use physmem_wire::WireError;

mod config;
mod dispatch;
mod service;

pub use config::{ConfigError, ServiceConfig, DEFAULT_CONFIG_PATH};
pub use dispatch::{DispatchError, Dispatcher, Reply};
pub use service::{Family, Service};

/// Errors that stop the service.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport level failure.
    #[error("transport error: {0}")]
    Transport(#[from] IpcError),
    /// A reply could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] WireError),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Serves datagrams from `server` until every client has disconnected.
pub fn serve<S, M, P>(server: &S, service: &Service<'_, M, P>) -> Result<(), ServerError>
where
    S: Server,
    M: PhysicalMemory,
    P: ProcessLookup,
{
    log::info!("serving family {:?} as {:#x}", service.family().name, service.family().id);
    loop {
        let datagram = match server.recv(Wait::Blocking) {
            Ok(datagram) => datagram,
            Err(IpcError::Disconnected) => break,
            Err(err) => return Err(err.into()),
        };
        if datagram.bytes.is_empty() {
            continue;
        }
        for reply in service.handle(datagram.port, &datagram.bytes)? {
            server.send(datagram.port, &reply, Wait::Blocking)?;
        }
    }
    log::info!("all clients gone, stopping");
    Ok(())
}

/// Loads the configuration and serves on the platform's default transport.
///
/// The server end of a generic netlink family lives in the kernel; no user-space default
/// transport exists yet, so this reports [`IpcError::Unsupported`] after validating the config.
pub fn run_default(config_path: &Path) -> Result<(), ServerError> {
    let config = ServiceConfig::load(config_path)?;
    log::info!("family {:?} id {:#x} layout {:?}", config.family_name, config.family_id, config.layout);
    Err(ServerError::Transport(IpcError::Unsupported))
}
