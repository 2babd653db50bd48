//! PE image model and structure walkers.
//!
//! An image is read through an [`ImageSource`]: a memory-mapped file or a
//! module inside another process, the latter read through
//! `memory::ProtectGuard`. [`PeFile::parse`] validates the DOS and NT headers
//! and loads the section table; the [`walkers`] then dump one substructure
//! each into a [`ScanContext`].

mod context;
mod error;
mod file;
mod image;
pub mod layout;
mod report;
pub mod sanitize;
pub mod walkers;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use context::ScanContext;
pub use error::Error;
pub use file::{OptionalHeader, PeFile};
pub use image::{FileImage, ImageKind, ImageSource, ProcessImage};
pub use report::ReportWriter;
