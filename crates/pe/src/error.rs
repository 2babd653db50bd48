#![forbid(unsafe_code)]

use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to open image {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Memory(#[from] memory::Error),

    #[error("Malformed structure: {0}")]
    Scroll(#[from] scroll::Error),

    #[error("Read of {len:#x} bytes at offset {offset:#x} is outside an image of {size:#x} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("Invalid DOS signature {0:#06x}")]
    InvalidDosSignature(u16),

    #[error("Invalid NT signature {0:#010x}")]
    InvalidNtSignature(u32),

    #[error("Unknown optional header magic {0:#06x}")]
    UnknownOptionalMagic(u16),

    #[error("RVA {0:#x} does not map into the image")]
    InvalidRva(u32),
}
