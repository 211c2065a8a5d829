// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Walk geometry: an ordered list of (level, shift, width) descriptors, top level first.

use serde::{Deserialize, Serialize};

use crate::{PAGE_SHIFT, PAGE_SIZE};

const ENTRY_SIZE: usize = 8;
/// Index width of one table frame: 512 eight-byte entries.
const MAX_LEVEL_BITS: u32 = (PAGE_SIZE / ENTRY_SIZE).trailing_zeros();

/// One level of the page-table hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelDescriptor {
    /// Short name used in diagnostics (`pgd`, `pmd`, ...).
    pub name: &'static str,
    /// Position of the lowest virtual-address bit indexing this level.
    pub shift: u32,
    /// Number of virtual-address bits indexing this level.
    pub bits: u32,
}

impl LevelDescriptor {
    /// Creates a descriptor.
    pub const fn new(name: &'static str, shift: u32, bits: u32) -> Self {
        Self { name, shift, bits }
    }

    /// Table index selected by `vaddr` at this level.
    pub const fn index(&self, vaddr: u64) -> usize {
        ((vaddr >> self.shift) & ((1u64 << self.bits) - 1)) as usize
    }
}

/// Errors raised by [`PagingLayout::new`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// No levels were supplied.
    #[error("layout has no levels")]
    Empty,
    /// The leaf level does not index base pages.
    #[error("leaf level {0} must start at bit {PAGE_SHIFT}")]
    LeafShift(&'static str),
    /// A level's index bits do not abut the next level's.
    #[error("level {0} does not abut the level below it")]
    Gap(&'static str),
    /// A level has more entries than fit in one table frame.
    #[error("level {0} has an unsupported width")]
    Width(&'static str),
}

/// Geometry of a page-table hierarchy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagingLayout {
    levels: Vec<LevelDescriptor>,
}

impl PagingLayout {
    /// Validates and wraps `levels` (top level first).
    pub fn new(levels: Vec<LevelDescriptor>) -> Result<Self, LayoutError> {
        let leaf = levels.last().ok_or(LayoutError::Empty)?;
        if leaf.shift != PAGE_SHIFT {
            return Err(LayoutError::LeafShift(leaf.name));
        }
        for level in &levels {
            if level.bits == 0 || level.bits > MAX_LEVEL_BITS {
                return Err(LayoutError::Width(level.name));
            }
        }
        for pair in levels.windows(2) {
            if Some(pair[0].shift) != pair[1].shift.checked_add(pair[1].bits) {
                return Err(LayoutError::Gap(pair[0].name));
            }
        }
        if levels[0].shift.saturating_add(levels[0].bits) > u64::BITS {
            return Err(LayoutError::Width(levels[0].name));
        }
        Ok(Self { levels })
    }

    /// x86-64 with 5-level paging (57-bit virtual addresses).
    pub fn x86_64_five_level() -> Self {
        Self {
            levels: vec![
                LevelDescriptor::new("pgd", 48, 9),
                LevelDescriptor::new("p4d", 39, 9),
                LevelDescriptor::new("pud", 30, 9),
                LevelDescriptor::new("pmd", 21, 9),
                LevelDescriptor::new("pte", 12, 9),
            ],
        }
    }

    /// x86-64 with 4-level paging (48-bit virtual addresses).
    pub fn x86_64_four_level() -> Self {
        Self {
            levels: vec![
                LevelDescriptor::new("pgd", 39, 9),
                LevelDescriptor::new("pud", 30, 9),
                LevelDescriptor::new("pmd", 21, 9),
                LevelDescriptor::new("pte", 12, 9),
            ],
        }
    }

    /// RISC-V Sv39.
    pub fn sv39() -> Self {
        Self {
            levels: vec![
                LevelDescriptor::new("vpn2", 30, 9),
                LevelDescriptor::new("vpn1", 21, 9),
                LevelDescriptor::new("vpn0", 12, 9),
            ],
        }
    }

    /// Levels, top first.
    pub fn levels(&self) -> &[LevelDescriptor] {
        &self.levels
    }

    /// Number of virtual-address bits the walk consumes.
    pub fn va_bits(&self) -> u32 {
        self.levels[0].shift + self.levels[0].bits
    }

    /// Whether `vaddr` is sign-extended from the top translated bit.
    pub fn is_canonical(&self, vaddr: u64) -> bool {
        let bits = self.va_bits();
        if bits >= 64 {
            return true;
        }
        let sign = (vaddr >> (bits - 1)) & 1;
        let upper = vaddr >> bits;
        if sign == 0 {
            upper == 0
        } else {
            upper == u64::MAX >> bits
        }
    }
}

impl From<LayoutKind> for PagingLayout {
    fn from(kind: LayoutKind) -> Self {
        match kind {
            LayoutKind::X86_64FiveLevel => Self::x86_64_five_level(),
            LayoutKind::X86_64FourLevel => Self::x86_64_four_level(),
            LayoutKind::Sv39 => Self::sv39(),
        }
    }
}

/// Named layouts selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutKind {
    /// [`PagingLayout::x86_64_five_level`].
    #[default]
    #[serde(rename = "x86_64-5level")]
    X86_64FiveLevel,
    /// [`PagingLayout::x86_64_four_level`].
    #[serde(rename = "x86_64-4level")]
    X86_64FourLevel,
    /// [`PagingLayout::sv39`].
    #[serde(rename = "sv39")]
    Sv39,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for layout in [
            PagingLayout::x86_64_five_level(),
            PagingLayout::x86_64_four_level(),
            PagingLayout::sv39(),
        ] {
            assert_eq!(PagingLayout::new(layout.levels().to_vec()), Ok(layout));
        }
    }

    #[test]
    fn five_level_indices() {
        let layout = PagingLayout::x86_64_five_level();
        let va = 0x7f00_0000_1000u64;
        let idx: Vec<usize> = layout.levels().iter().map(|l| l.index(va)).collect();
        assert_eq!(idx, vec![0, 254, 0, 0, 1]);
        assert_eq!(layout.va_bits(), 57);
    }

    #[test]
    fn rejects_gaps_and_bad_leaf() {
        let gap = vec![LevelDescriptor::new("a", 31, 9), LevelDescriptor::new("b", 12, 9)];
        assert_eq!(PagingLayout::new(gap), Err(LayoutError::Gap("a")));
        let leaf = vec![LevelDescriptor::new("a", 13, 9)];
        assert_eq!(PagingLayout::new(leaf), Err(LayoutError::LeafShift("a")));
        let wide = vec![LevelDescriptor::new("a", 12, 10)];
        assert_eq!(PagingLayout::new(wide), Err(LayoutError::Width("a")));
        assert_eq!(PagingLayout::new(Vec::new()), Err(LayoutError::Empty));
    }

    #[test]
    fn rejects_oversized_widths_without_overflow() {
        for bits in [64, 65, u32::MAX] {
            let huge = vec![LevelDescriptor::new("a", 12, bits)];
            assert_eq!(PagingLayout::new(huge), Err(LayoutError::Width("a")));
        }
        let top = vec![LevelDescriptor::new("top", u32::MAX, 9), LevelDescriptor::new("pte", 12, 9)];
        assert_eq!(PagingLayout::new(top), Err(LayoutError::Gap("top")));
    }

    #[test]
    fn canonical_checks_sign_extension() {
        let layout = PagingLayout::sv39();
        assert!(layout.is_canonical(0x3f_ffff_f000));
        assert!(layout.is_canonical(0xffff_ffc0_0000_0000));
        assert!(!layout.is_canonical(1 << 50));
    }
}
