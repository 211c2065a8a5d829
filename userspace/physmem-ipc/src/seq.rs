// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic sequence numbers for request/reply correlation.

/// Monotonic sequence generator (no randomness; deterministic). Zero is never produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeqGen {
    next: u32,
}

impl SeqGen {
    /// Create a generator starting at `start` (zero is bumped to one).
    pub const fn new(start: u32) -> Self {
        Self { next: if start == 0 { 1 } else { start } }
    }

    /// Returns the next sequence number and advances, skipping zero on wrap.
    pub fn next_seq(&mut self) -> u32 {
        let out = self.next;
        self.next = match self.next.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        out
    }
}

impl Default for SeqGen {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Iterator for SeqGen {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_seq())
    }
}
