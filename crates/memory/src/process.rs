#![forbid(unsafe_code)]

use crate::{Error, region::MemoryRegionInfo, protection::Protection};
use std::path::PathBuf;

/// An opened foreign process.
///
/// `query` is the region inspector; `protect` is the raw protection-change
/// primitive and returns the protection that was in place before the call.
/// `read_raw` and `write_raw` do not touch protections. Go through
/// [`crate::read`]/[`crate::write`] or a [`crate::ProtectGuard`] instead of
/// calling them directly.
pub trait Process: Send + Sync {
    fn pid(&self) -> u32;

    fn query(&self, address: usize) -> Result<MemoryRegionInfo, Error>;

    fn protect(&self, region: &MemoryRegionInfo, protection: Protection)
    -> Result<Protection, Error>;

    fn read_raw(&self, address: usize, buf: &mut [u8]) -> Result<(), Error>;

    fn write_raw(&self, address: usize, buf: &[u8]) -> Result<(), Error>;

    /// Win32 path of the main image. Fails for zombie processes.
    fn image_path(&self) -> Result<PathBuf, Error>;

    fn is_wow64(&self) -> Result<bool, Error>;
}

/// Iterator over every region of a process, lowest address first.
///
/// Stops at the first failed query, which is how the end of the user
/// address space shows up.
pub struct Regions<'a, P: Process + ?Sized> {
    process: &'a P,
    next: Option<usize>,
}

impl<P: Process + ?Sized> Iterator for Regions<'_, P> {
    type Item = MemoryRegionInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.next?;
        let region = self.process.query(address).ok()?;
        self.next = region
            .base
            .checked_add(region.size)
            .filter(|next| *next > address);
        Some(region)
    }
}

pub fn regions<P: Process + ?Sized>(process: &P) -> Regions<'_, P> {
    Regions {
        process,
        next: Some(0),
    }
}
