#![forbid(unsafe_code)]

use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid warnings configuration: {0}")]
    Config(#[from] config::Error),

    #[error("Failed to open warned file {path:?} for output: {source}")]
    OpenSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write warned report: {0}")]
    Write(#[from] io::Error),
}
