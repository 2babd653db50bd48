#![forbid(unsafe_code)]

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::Error),

    #[error(transparent)]
    Diagnostics(#[from] diagnostics::Error),

    #[error(transparent)]
    Memory(#[from] memory::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("No target selected. Use exactly one of --pid, --name, --path or --all.")]
    NoTarget,

    #[error("Conflicting targets selected ({0}). Use exactly one.")]
    AmbiguousTarget(String),

    #[error("Failed to find requested process {0}.")]
    ProcessNotFound(u32),

    #[error("Failed to find requested process `{0}`.")]
    ProcessNameNotFound(String),

    #[error("Failed to locate the running executable: {0}")]
    SelfPath(#[source] io::Error),

    #[error("worker pool is shut down")]
    PoolClosed,
}
