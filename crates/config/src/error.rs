#![forbid(unsafe_code)]

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("failed to serialize TOML: {0}")]
    TomlSer(#[from] toml_edit::ser::Error),

    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error("Unknown warned type: `{0}`")]
    UnknownWarnedType(String),

    #[error("Please specify a file path for dynamic warnings.")]
    StreamingWithoutSink,

    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("queue factor must be at least 1")]
    ZeroQueueFactor,
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}
