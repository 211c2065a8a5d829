// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process discovery through a proc filesystem.
//!
//! `find_pid` matches a substring of the raw `cmdline` bytes (NUL separators included) and
//! returns the lowest matching pid. `module_base` returns the start of the first `maps` line
//! that mentions the module.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while reading the proc filesystem.
#[derive(Debug, thiserror::Error)]
pub enum ProcError {
    /// A proc file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File or directory that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// A matching maps line has no parsable start address.
    #[error("malformed maps line: {0}")]
    BadMapsLine(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ProcError + '_ {
    move |source| ProcError::Io { path: path.to_owned(), source }
}

/// Finds the lowest pid whose command line contains `name`.
pub fn find_pid(proc_root: &Path, name: &str) -> Result<Option<u32>, ProcError> {
    let mut pids: Vec<u32> = fs::read_dir(proc_root)
        .map_err(io_error(proc_root))?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| *pid > 0)
        .collect();
    pids.sort_unstable();
    let needle = name.as_bytes();
    for pid in pids {
        // Processes may exit between listing and reading.
        let Ok(cmdline) = fs::read(proc_root.join(pid.to_string()).join("cmdline")) else {
            continue;
        };
        if needle.is_empty() || cmdline.windows(needle.len()).any(|w| w == needle) {
            return Ok(Some(pid));
        }
    }
    Ok(None)
}

/// Start address of the first mapping of `pid` whose line mentions `module`.
pub fn module_base(proc_root: &Path, pid: u32, module: &str) -> Result<Option<u64>, ProcError> {
    let path = proc_root.join(pid.to_string()).join("maps");
    let maps = fs::read_to_string(&path).map_err(io_error(&path))?;
    let Some(line) = maps.lines().find(|line| line.contains(module)) else {
        return Ok(None);
    };
    let start = line.split('-').next().unwrap_or_default();
    u64::from_str_radix(start, 16)
        .map(Some)
        .map_err(|_| ProcError::BadMapsLine(line.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (pid, cmdline) in [("1", "/sbin/init\0"), ("812", "com.example.game\0--fast\0"), ("90", "sh\0")] {
            fs::create_dir(dir.path().join(pid)).unwrap();
            fs::write(dir.path().join(pid).join("cmdline"), cmdline).unwrap();
        }
        fs::create_dir(dir.path().join("self")).unwrap();
        fs::write(
            dir.path().join("812").join("maps"),
            "5600000000-5600001000 r--p 00000000 fd:01 1 /system/bin/app_process\n\
             7f10000000-7f10020000 r-xp 00000000 fd:01 2 /data/app/libgame.so\n\
             7f10020000-7f10030000 rw-p 00020000 fd:01 2 /data/app/libgame.so\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn finds_pid_by_cmdline_substring() {
        let proc = proc_tree();
        assert_eq!(find_pid(proc.path(), "example.game").unwrap(), Some(812));
        assert_eq!(find_pid(proc.path(), "init").unwrap(), Some(1));
        assert_eq!(find_pid(proc.path(), "missing").unwrap(), None);
    }

    #[test]
    fn module_base_uses_first_matching_line() {
        let proc = proc_tree();
        assert_eq!(module_base(proc.path(), 812, "libgame.so").unwrap(), Some(0x7f1000_0000));
        assert_eq!(module_base(proc.path(), 812, "libnone.so").unwrap(), None);
        assert!(matches!(module_base(proc.path(), 90, "x"), Err(ProcError::Io { .. })));
    }
}
