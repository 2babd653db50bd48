#![forbid(unsafe_code)]

use crate::protection::Protection;

const MEM_COMMIT: u32 = 0x1000;
const MEM_RESERVE: u32 = 0x2000;
const MEM_FREE: u32 = 0x10000;

const MEM_PRIVATE: u32 = 0x20000;
const MEM_MAPPED: u32 = 0x40000;
const MEM_IMAGE: u32 = 0x100_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionState {
    Committed,
    Reserved,
    Free,
    Other(u32),
}

impl RegionState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            MEM_COMMIT => Self::Committed,
            MEM_RESERVE => Self::Reserved,
            MEM_FREE => Self::Free,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Committed => MEM_COMMIT,
            Self::Reserved => MEM_RESERVE,
            Self::Free => MEM_FREE,
            Self::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionType {
    Image,
    Mapped,
    Private,
    /// Free regions have no type.
    None,
    Other(u32),
}

impl RegionType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::None,
            MEM_IMAGE => Self::Image,
            MEM_MAPPED => Self::Mapped,
            MEM_PRIVATE => Self::Private,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Image => MEM_IMAGE,
            Self::Mapped => MEM_MAPPED,
            Self::Private => MEM_PRIVATE,
            Self::Other(raw) => raw,
        }
    }
}

/// Snapshot of one region of a foreign address space.
///
/// The target keeps running while we look at it, so this is only ever a
/// best-effort view. Query again whenever staleness matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRegionInfo {
    pub base: usize,
    pub allocation_base: usize,
    pub allocation_protect: Protection,
    pub size: usize,
    pub state: RegionState,
    pub protect: Protection,
    pub kind: RegionType,
}

impl MemoryRegionInfo {
    pub fn end(&self) -> usize {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn is_committed(&self) -> bool {
        self.state == RegionState::Committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_roundtrip() {
        for raw in [MEM_COMMIT, MEM_RESERVE, MEM_FREE, 0x4242] {
            assert_eq!(RegionState::from_raw(raw).raw(), raw);
        }
        for raw in [0, MEM_IMAGE, MEM_MAPPED, MEM_PRIVATE, 0x8] {
            assert_eq!(RegionType::from_raw(raw).raw(), raw);
        }
    }

    #[test]
    fn contains_is_half_open() {
        let region = MemoryRegionInfo {
            base: 0x1000,
            allocation_base: 0x1000,
            allocation_protect: Protection::READONLY,
            size: 0x1000,
            state: RegionState::Committed,
            protect: Protection::READONLY,
            kind: RegionType::Private,
        };
        assert!(region.contains(0x1000));
        assert!(region.contains(0x1fff));
        assert!(!region.contains(0x2000));
        assert_eq!(region.end(), 0x2000);
    }
}
