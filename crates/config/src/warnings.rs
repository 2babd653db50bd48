#![forbid(unsafe_code)]

use crate::warned_type::WarnedType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Warnings {
    /// Collect the list of files which caused warnings.
    pub enabled: bool,

    /// Write the warned list to this file instead of stdout.
    pub file: Option<PathBuf>,

    /// Append each warning to `file` as it is produced instead of writing the
    /// whole list at the end of the run.
    pub dynamic: bool,

    pub warned_type: WarnedType,
}
