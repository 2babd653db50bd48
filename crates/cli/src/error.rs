use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),

    #[error(transparent)]
    Orchestrator(#[from] orchestrator::Error),

    #[error("Failed to write to standard output: {0}")]
    Stdout(#[source] io::Error),
}
