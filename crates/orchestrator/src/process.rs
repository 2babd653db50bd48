//! Process, thread, module and region dumps.

#![forbid(unsafe_code)]

use crate::{Error, RunContext, scanner::PeScanner};
use memory::{
    ModuleEntry, Process, ProcessEntry, RegionState, SystemInspector, ThreadEntry, regions,
};
use pe::{ImageKind, ProcessImage, ReportWriter};
use tracing::{debug, info_span, warn};

/// Dump threads owned by `pid`, or all threads in the system.
pub fn dump_threads(
    run: &RunContext,
    system: &dyn SystemInspector,
    pid: Option<u32>,
) -> Result<(), Error> {
    let mut out = ReportWriter::new(run.options.quiet);
    write_threads(&mut out, system, pid);
    run.output.emit(out.as_str());
    Ok(())
}

fn write_threads(out: &mut ReportWriter, system: &dyn SystemInspector, pid: Option<u32>) {
    out.write_newline();
    out.write_normal("Threads:", 0);
    match system.threads(pid) {
        Ok(threads) => threads.iter().for_each(|thread| write_thread(out, thread)),
        Err(err) => {
            warn!(?pid, %err, "failed to enumerate threads");
            out.write_newline();
            out.write_normal("WARNING! Could not enumerate threads.", 1);
        }
    }
}

fn write_thread(out: &mut ReportWriter, thread: &ThreadEntry) {
    out.write_newline();
    out.write_named_hex("Usage", thread.usage, 1);
    out.write_named_hex("ID", thread.id, 1);
    out.write_named_hex("Owner ID", thread.owner_id, 1);
    out.write_named_hex("Base Priority", thread.base_priority, 1);
    out.write_named_hex("Delta Priority", thread.delta_priority, 1);
    out.write_named_hex("Flags", thread.flags, 1);
}

/// Dump every running process.
pub fn dump_processes(run: &RunContext, system: &dyn SystemInspector) -> Result<(), Error> {
    let mut out = ReportWriter::new(run.options.quiet);
    out.write_newline();
    out.write_normal("Processes:", 0);
    run.output.emit(out.as_str());

    for entry in system.processes()? {
        dump_process(run, system, &entry)?;
    }
    Ok(())
}

/// Dump one process. A process that cannot be opened only gets its
/// snapshot entry printed.
pub fn dump_process(
    run: &RunContext,
    system: &dyn SystemInspector,
    entry: &ProcessEntry,
) -> Result<(), Error> {
    let _span = info_span!("process_dump", pid = entry.id, name = %entry.name).entered();
    let memonly = run.options.memonly;
    let mut out = ReportWriter::new(run.options.quiet);

    out.write_newline();
    out.write_named_hex("ID", entry.id, 0);
    out.write_named_hex("Threads", entry.threads, 0);
    out.write_named_hex("Parent", entry.parent_id, 0);
    out.write_named_hex("Priority", entry.priority, 0);
    out.write_named_normal("Name", &entry.name, 0);

    if !memonly {
        write_threads(&mut out, system, Some(entry.id));
    }

    let process = match system.open(entry.id) {
        Ok(process) => process,
        Err(err) => {
            debug!(%err, "could not open process");
            out.write_newline();
            out.write_normal("Could not open process for further inspection.", 0);
            out.write_newline();
            run.output.emit(out.as_str());
            return Ok(());
        }
    };

    if !memonly {
        out.write_newline();
        match process.image_path() {
            Ok(path) => out.write_named_normal("Path (Win32)", path.display(), 0),
            // Zombie processes have no queryable path.
            Err(err) => {
                debug!(%err, "could not query process path");
                out.write_normal("WARNING! Could not get Win32 path to process.", 0);
            }
        }
        match process.is_wow64() {
            Ok(wow64) => out.write_named_normal("WoW64", if wow64 { "Yes" } else { "No" }, 0),
            Err(err) => {
                debug!(%err, "could not query WoW64 state");
                out.write_normal("WoW64: Unknown", 0);
            }
        }

        match system.modules(entry.id) {
            Ok(modules) => write_modules(run, &*process, &modules, &mut out)?,
            Err(err) => {
                warn!(%err, "failed to enumerate modules");
                out.write_newline();
                out.write_normal("WARNING! Could not enumerate modules.", 0);
            }
        }

        write_regions(&*process, &mut out);
    }

    write_memory_images(run, &*process, &entry.name, &mut out)?;

    run.output.emit(out.as_str());
    Ok(())
}

fn write_modules<P: Process + ?Sized>(
    run: &RunContext,
    process: &P,
    modules: &[ModuleEntry],
    out: &mut ReportWriter,
) -> Result<(), Error> {
    let scanner = PeScanner::new(&run.options, &run.diagnostics);

    out.write_newline();
    out.write_normal("Modules:", 0);
    for module in modules {
        out.write_newline();
        out.write_named_hex("Handle", module.base, 1);
        out.write_named_hex("Size", module.size, 1);
        out.write_named_normal("Name", &module.name, 1);
        out.write_named_normal("Path", module.path.display(), 1);

        let image = ProcessImage::new(process, module.base, module.size);
        let outcome = scanner.scan(&image, ImageKind::Image, &module.path.display().to_string())?;
        out.append(&outcome.report);
    }
    Ok(())
}

fn write_regions<P: Process + ?Sized>(process: &P, out: &mut ReportWriter) {
    out.write_newline();
    out.write_normal("Regions:", 0);
    for region in regions(process) {
        out.write_newline();
        out.write_named_hex("Base", region.base, 1);
        out.write_named_hex("Allocation Base", region.allocation_base, 1);
        out.write_named_hex("Allocation Protect", region.allocation_protect.bits(), 1);
        out.write_named_hex("Size", region.size, 1);
        out.write_named_hex("State", region.state.raw(), 1);
        out.write_named_hex("Protect", region.protect.bits(), 1);
        out.write_named_hex("Type", region.kind.raw(), 1);
    }
}

/// Scan every committed allocation whose base carries valid DOS and NT
/// headers. This finds manually mapped images the module list misses.
fn write_memory_images<P: Process + ?Sized>(
    run: &RunContext,
    process: &P,
    process_name: &str,
    out: &mut ReportWriter,
) -> Result<(), Error> {
    let scanner = PeScanner::new(&run.options, &run.diagnostics);

    out.write_newline();
    out.write_normal("Memory Images:", 0);
    for region in regions(process) {
        if region.state != RegionState::Committed
            || region.base != region.allocation_base
            || region.protect.is_bad()
        {
            continue;
        }
        let image = match ProcessImage::probe(process, region.base) {
            Ok(image) => image,
            Err(err) => {
                debug!(base = region.base, %err, "no image at allocation base");
                continue;
            }
        };

        out.write_newline();
        out.write_named_hex("Base", image.base(), 1);
        let path = format!("{process_name} @ {:#X}", image.base());
        let outcome = scanner.scan(&image, ImageKind::Image, &path)?;
        out.append(&outcome.report);
    }
    Ok(())
}
