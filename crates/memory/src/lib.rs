//! Safe access to the memory of another process.
//!
//! The [`ProtectGuard`] is the only way this crate touches page protections:
//! it refuses guard/no-access pages, escalates protection only when the
//! current one does not already permit the access, and restores it exactly
//! once.

mod access;
mod error;
mod guard;
mod process;
mod protection;
mod region;
mod system;

#[cfg(not(windows))]
mod portable;
#[cfg(windows)]
mod windows;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use access::{read, read_vec, write};
pub use error::Error;
pub use guard::{GuardState, ProtectGuard};
pub use process::{Process, Regions, regions};
pub use protection::{AccessIntent, Protection};
pub use region::{MemoryRegionInfo, RegionState, RegionType};
pub use system::{
    ModuleEntry, ProcessEntry, SystemInspector, ThreadEntry, find_process_by_name, native,
};

#[cfg(windows)]
pub use windows::{WindowsProcess, WindowsSystem};
#[cfg(not(windows))]
pub use portable::PortableSystem;
