#![forbid(unsafe_code)]

mod error;
mod scan;
mod scheduler;
mod warned_type;
mod warnings;

pub use error::Error;
pub use scan::Scan;
pub use scheduler::Scheduler;
pub use warned_type::WarnedType;
pub use warnings::Warnings;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables overriding config keys, e.g.
/// `PEDUMP_SCHEDULER__THREADS=8`.
pub const ENV_PREFIX: &str = "PEDUMP_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub scan: Scan,
    pub warnings: Warnings,
    pub scheduler: Scheduler,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config file, layering it over the defaults and under the
    /// environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::InvalidPath(path.to_owned()));
        }
        let config: Self = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Defaults overridden by the environment only.
    pub fn from_env() -> Result<Self, Error> {
        let config: Self = Self::figment()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    /// Reject combinations that cannot run. Called once at startup, before
    /// any scanning begins.
    pub fn validate(&self) -> Result<(), Error> {
        if self.warnings.dynamic && self.warnings.file.is_none() {
            return Err(Error::StreamingWithoutSink);
        }
        if self.scheduler.threads == 0 {
            return Err(Error::ZeroThreads);
        }
        if self.scheduler.queue_factor == 0 {
            return Err(Error::ZeroQueueFactor);
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }
}
