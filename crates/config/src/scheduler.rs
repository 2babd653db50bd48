#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scheduler {
    /// Number of worker threads.
    pub threads: usize,

    /// Queue capacity is `threads * queue_factor`.
    pub queue_factor: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            threads: 1,
            queue_factor: 1,
        }
    }
}

impl Scheduler {
    pub fn queue_capacity(&self) -> usize {
        self.threads.saturating_mul(self.queue_factor).max(1)
    }
}
