//! Scan orchestration: target resolution, the worker pool, file and
//! process scans, and the run driver tying them to the diagnostics
//! registry.

mod error;
mod files;
mod output;
mod pool;
mod process;
mod run;
mod scanner;
mod target;

pub use error::Error;
pub use files::{scan_file, submit_path};
pub use output::Output;
pub use pool::{Spawn, ThreadPool, WorkerScope};
pub use process::{dump_process, dump_processes, dump_threads};
pub use run::run;
pub use scanner::{
    NOT_VALID, OVERSIZE_THRESHOLD, PeScanner, ScanOutcome, ScanStatus, is_oversized,
};
pub use target::{Resolved, ScanTarget, TargetSelection, resolve, root_of};

use diagnostics::Diagnostics;

/// Everything a scan job needs, shared by every worker for one run.
pub struct RunContext {
    pub options: config::Scan,
    pub diagnostics: Diagnostics,
    pub output: Output,
}
