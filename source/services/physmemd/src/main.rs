// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: physmem daemon entrypoint wiring the default transport to the shared service logic

use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(physmemd::DEFAULT_CONFIG_PATH));
    match physmemd::run_default(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("physmemd: {err}");
            eprintln!("physmemd: {err}");
            ExitCode::FAILURE
        }
    }
}
