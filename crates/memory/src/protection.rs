#![forbid(unsafe_code)]

use bitflags::bitflags;

bitflags! {
    /// Page protection flags as reported by the region inspector. The values
    /// are the Windows `PAGE_*` constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Protection: u32 {
        const NOACCESS = 0x01;
        const READONLY = 0x02;
        const READWRITE = 0x04;
        const WRITECOPY = 0x08;
        const EXECUTE = 0x10;
        const EXECUTE_READ = 0x20;
        const EXECUTE_READWRITE = 0x40;
        const EXECUTE_WRITECOPY = 0x80;
        const GUARD = 0x100;
        const NOCACHE = 0x200;
        const WRITECOMBINE = 0x400;

        const _ = !0;
    }
}

/// What the caller intends to do with a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessIntent {
    Read,
    Write,
}

impl Protection {
    const READABLE: Self = Self::READONLY
        .union(Self::READWRITE)
        .union(Self::WRITECOPY)
        .union(Self::EXECUTE_READ)
        .union(Self::EXECUTE_READWRITE)
        .union(Self::EXECUTE_WRITECOPY);

    const WRITABLE: Self = Self::READWRITE
        .union(Self::WRITECOPY)
        .union(Self::EXECUTE_READWRITE)
        .union(Self::EXECUTE_WRITECOPY);

    /// Guard pages and no-access pages must never be touched: reading a guard
    /// page disarms it, and no-access pages are meaningless to escalate.
    pub fn is_bad(self) -> bool {
        self.contains(Self::GUARD) || self.contains(Self::NOACCESS)
    }

    pub fn can_read(self) -> bool {
        self.intersects(Self::READABLE)
    }

    pub fn can_write(self) -> bool {
        self.intersects(Self::WRITABLE)
    }

    pub fn permits(self, intent: AccessIntent) -> bool {
        match intent {
            AccessIntent::Read => self.can_read(),
            AccessIntent::Write => self.can_write(),
        }
    }
}
