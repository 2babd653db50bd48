//! Directory and file scan jobs. Directories are expanded when their job
//! runs, and each entry becomes a job of its own.

#![forbid(unsafe_code)]

use crate::{
    Error, RunContext,
    pool::{Spawn, WorkerScope},
    scanner::PeScanner,
};
use pe::{FileImage, ImageKind, ReportWriter};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, warn};

/// Submit a scan of `path`, a file or a directory tree.
pub fn submit_path<S: Spawn + ?Sized>(
    spawner: &S,
    run: &Arc<RunContext>,
    path: PathBuf,
) -> Result<(), Error> {
    let run = Arc::clone(run);
    if path.is_dir() {
        spawner.spawn(move |scope: &WorkerScope| {
            if let Err(err) = expand_dir(scope, &run, &path) {
                warn!(path = %path.display(), %err, "failed to expand directory");
            }
        })
    } else {
        spawner.spawn(move |_: &WorkerScope| {
            if let Err(err) = scan_file(&run, &path) {
                warn!(path = %path.display(), %err, "failed to scan file");
            }
        })
    }
}

fn expand_dir<S: Spawn + ?Sized>(
    spawner: &S,
    run: &Arc<RunContext>,
    dir: &Path,
) -> Result<(), Error> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            // Access denied is routine when walking a whole volume.
            debug!(path = %dir.display(), %err, "skipping unreadable directory");
            return Ok(());
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(path = %dir.display(), %err, "skipping unreadable entry");
                continue;
            }
        };
        // Links are not followed, so junction loops cannot recurse forever.
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() || file_type.is_file() {
            submit_path(spawner, run, entry.path())?;
        }
    }
    Ok(())
}

/// Scan one file on disk and emit its report.
pub fn scan_file(run: &RunContext, path: &Path) -> Result<(), Error> {
    let shown = path.display().to_string();
    let mut out = ReportWriter::new(run.options.quiet);
    out.write_newline();
    out.write_named_normal("Current File", &shown, 0);

    match FileImage::open(path) {
        Ok(image) => {
            let outcome = PeScanner::new(&run.options, &run.diagnostics).scan(
                &image,
                ImageKind::Data,
                &shown,
            )?;
            out.append(&outcome.report);
        }
        Err(err) => {
            debug!(path = %shown, %err, "could not open file");
            out.write_newline();
            out.write_normal("WARNING! Could not open file.", 1);
        }
    }

    run.output.emit(out.as_str());
    Ok(())
}
