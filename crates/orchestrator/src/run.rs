//! One complete run: resolve the target, scan it, drain the pool and
//! write the warned report.

#![forbid(unsafe_code)]

use crate::{
    Error, RunContext,
    files::submit_path,
    output::Output,
    pool::ThreadPool,
    process::{dump_process, dump_processes, dump_threads},
    target::{Resolved, ScanTarget, resolve},
};
use config::Config;
use diagnostics::{Diagnostics, Summary};
use memory::SystemInspector;
use std::{io::Write, path::PathBuf, sync::Arc};
use tracing::{debug, info};

/// Scan `target`, writing per-image reports to `output`. A batched warned
/// report without a file goes to `stdout`, which stays live under
/// `--quiet`.
pub fn run(
    config: &Config,
    target: ScanTarget,
    system: &dyn SystemInspector,
    output: Output,
    stdout: &mut dyn Write,
) -> Result<Summary, Error> {
    let diagnostics = Diagnostics::new(&config.warnings)?;
    let resolved = resolve(target, system)?;
    debug!(?resolved, "target resolved");

    let run = Arc::new(RunContext {
        options: config.scan.clone(),
        diagnostics,
        output,
    });

    match resolved {
        Resolved::Process(entry) => dump_process(&run, system, &entry)?,
        Resolved::Paths(paths) => scan_paths(&run, &config.scheduler, paths)?,
        Resolved::Everything { root } => {
            dump_threads(&run, system, None)?;
            dump_processes(&run, system)?;
            run.output.emit("\nFiles:\n");
            info!(root = %root.display(), "scanning volume");
            scan_paths(&run, &config.scheduler, vec![root])?;
        }
    }

    let summary = run.diagnostics.finish(stdout)?;
    info!(
        records = summary.records,
        files = summary.files,
        "run complete"
    );
    Ok(summary)
}

fn scan_paths(
    run: &Arc<RunContext>,
    scheduler: &config::Scheduler,
    paths: Vec<PathBuf>,
) -> Result<(), Error> {
    let pool = ThreadPool::from_config(scheduler)?;
    for path in paths {
        submit_path(&pool, run, path)?;
    }
    pool.wait_for_empty();
    Ok(())
}
