#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Scan {
    /// Discard all normal report output. Warnings are still collected.
    pub quiet: bool,

    /// Dump embedded strings. Ignored when `quiet` is set.
    pub strings: bool,

    /// Skip thread, module and region listings for processes; only scan
    /// memory-resident images.
    pub memonly: bool,
}

impl Scan {
    /// String extraction only makes sense when the output is visible.
    pub fn dump_strings(&self) -> bool {
        self.strings && !self.quiet
    }
}
