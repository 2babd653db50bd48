use std::io;

/// Errors raised while inspecting or touching another process' memory.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The region carries a guard-page or no-access marker; touching it is
    /// refused before any protection change is attempted.
    #[error("Attempt to access region at {base:#x} with a 'bad' protection mask ({protect:#x})")]
    BadProtection { base: usize, protect: u32 },

    #[error("Failed to query region at {address:#x}: {source}")]
    Query {
        address: usize,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set protection {protect:#x} on region at {base:#x}: {source}")]
    Protect {
        base: usize,
        protect: u32,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {len:#x} bytes at {address:#x}: {source}")]
    Read {
        address: usize,
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {len:#x} bytes at {address:#x}: {source}")]
    Write {
        address: usize,
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("Address range starting at {address:#x} with length {len:#x} overflows")]
    AddressOverflow { address: usize, len: usize },

    #[error("Failed to open process {pid}: {source}")]
    OpenProcess {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Failed to take a system snapshot: {0}")]
    Snapshot(#[source] io::Error),

    #[error("Failed to query process information: {0}")]
    ProcessInfo(#[source] io::Error),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}
