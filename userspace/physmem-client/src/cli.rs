// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! User-facing CLI helpers for the `physmem` binary.

use std::process::ExitCode;

use physmem_ipc::{Client, IpcError};

use crate::config::{ClientConfig, ConfigError};
use crate::proc::{find_pid, module_base, ProcError};
use crate::{Error, ServiceClient};

/// Errors reported by the CLI.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Arguments did not match any command.
    #[error("usage error: {0}\n{usage}", usage = help())]
    Usage(String),
    /// The service call failed.
    #[error(transparent)]
    Client(#[from] Error),
    /// The proc filesystem could not be read.
    #[error(transparent)]
    Proc(#[from] ProcError),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The transport could not be opened.
    #[error("transport unavailable: {0}")]
    Transport(IpcError),
    /// Write data was not valid hex.
    #[error("invalid hex data: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Returns the CLI usage string.
pub fn help() -> &'static str {
    "physmem reads and writes process memory through the physmem service.\n\
     Usage:\n  \
       physmem pid <name>\n  \
       physmem base <pid> <module>\n  \
       physmem read <pid> <addr> <len>\n  \
       physmem write <pid> <addr> <hex-bytes>\n  \
       physmem resolve\n  \
       physmem --help"
}

fn parse_u64(text: &str) -> Result<u64, CliError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| CliError::Usage(format!("not a number: {text}")))
}

fn parse_pid(text: &str) -> Result<u32, CliError> {
    text.parse().map_err(|_| CliError::Usage(format!("not a pid: {text}")))
}

/// Executes one command against `client`.
pub fn execute<C: Client>(
    args: &[&str],
    config: &ClientConfig,
    client: &mut ServiceClient<C>,
) -> Result<String, CliError> {
    match args {
        [] | ["--help", ..] | ["help", ..] => Ok(help().to_string()),
        ["pid", name] => match find_pid(&config.proc_root, name)? {
            Some(pid) => Ok(pid.to_string()),
            None => Ok(format!("no process matches {name:?}")),
        },
        ["base", pid, module] => match module_base(&config.proc_root, parse_pid(pid)?, module)? {
            Some(base) => Ok(format!("{base:#x}")),
            None => Ok(format!("{module} is not mapped")),
        },
        ["read", pid, addr, len] => {
            let len = usize::try_from(parse_u64(len)?)
                .map_err(|_| CliError::Usage(format!("length too large: {len}")))?;
            let bytes = client.read(parse_pid(pid)?, parse_u64(addr)?, len)?;
            Ok(hex::encode(bytes))
        }
        ["write", pid, addr, data] => {
            let bytes = hex::decode(data)?;
            client.write(parse_pid(pid)?, parse_u64(addr)?, &bytes)?;
            Ok(format!("sent {} bytes", bytes.len()))
        }
        ["resolve"] => Ok(format!("{:#x}", client.resolve_channel()?)),
        other => Err(CliError::Usage(other.join(" "))),
    }
}

#[cfg(target_os = "linux")]
fn open_transport() -> Result<physmem_ipc::NetlinkClient, CliError> {
    physmem_ipc::NetlinkClient::open().map_err(CliError::Transport)
}

#[cfg(not(target_os = "linux"))]
fn open_transport() -> Result<physmem_ipc::LoopbackClient, CliError> {
    Err(CliError::Transport(IpcError::Unsupported))
}

fn run_args(args: &[&str]) -> Result<String, CliError> {
    let config = ClientConfig::load()?;
    if matches!(args, [] | ["--help", ..] | ["help", ..]) {
        return Ok(help().to_string());
    }
    let mut client = ServiceClient::with_config(open_transport()?, &config);
    execute(args, &config, &mut client)
}

/// Parses `std::env::args` and prints the execution result.
pub fn run() -> ExitCode {
    let owned: Vec<String> = std::env::args().skip(1).collect();
    let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
    match run_args(&refs) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            eprintln!("physmem: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_contains_name() {
        assert!(help().contains("physmem read"));
    }

    #[test]
    fn parses_hex_and_decimal_addresses() {
        assert_eq!(parse_u64("0x7f0000001000").unwrap(), 0x7f00_0000_1000);
        assert_eq!(parse_u64("4096").unwrap(), 4096);
        assert!(matches!(parse_u64("0xzz"), Err(CliError::Usage(_))));
        assert!(matches!(parse_pid("-1"), Err(CliError::Usage(_))));
    }
}
