#![forbid(unsafe_code)]

use crate::Error;
use memory::{ProcessEntry, SystemInspector, find_process_by_name};
use std::path::{Path, PathBuf};

/// Raw target flags as they come from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelection {
    pub pid: Option<u32>,
    pub name: Option<String>,
    pub paths: Vec<PathBuf>,
    pub all: bool,
}

/// What one run scans. Exactly one is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    ProcessId(u32),
    ProcessName(String),
    Paths(Vec<PathBuf>),
    All,
}

impl ScanTarget {
    pub fn from_selection(selection: TargetSelection) -> Result<Self, Error> {
        let mut chosen = Vec::new();
        if selection.pid.is_some() {
            chosen.push("--pid");
        }
        if selection.name.is_some() {
            chosen.push("--name");
        }
        if !selection.paths.is_empty() {
            chosen.push("--path");
        }
        if selection.all {
            chosen.push("--all");
        }
        if chosen.len() > 1 {
            return Err(Error::AmbiguousTarget(chosen.join(", ")));
        }

        match selection {
            TargetSelection { pid: Some(pid), .. } => Ok(Self::ProcessId(pid)),
            TargetSelection { name: Some(name), .. } => Ok(Self::ProcessName(name)),
            TargetSelection { all: true, .. } => Ok(Self::All),
            TargetSelection { paths, .. } if !paths.is_empty() => Ok(Self::Paths(paths)),
            _ => Err(Error::NoTarget),
        }
    }
}

/// A target turned into concrete things to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Process(ProcessEntry),
    Paths(Vec<PathBuf>),
    /// Every thread and process, then the volume holding `root`.
    Everything { root: PathBuf },
}

pub fn resolve(target: ScanTarget, system: &dyn SystemInspector) -> Result<Resolved, Error> {
    match target {
        ScanTarget::ProcessId(pid) => system
            .processes()?
            .into_iter()
            .find(|entry| entry.id == pid)
            .map(Resolved::Process)
            .ok_or(Error::ProcessNotFound(pid)),
        ScanTarget::ProcessName(name) => {
            let processes = system.processes()?;
            find_process_by_name(&processes, &name)
                .cloned()
                .map(Resolved::Process)
                .ok_or(Error::ProcessNameNotFound(name))
        }
        ScanTarget::Paths(paths) => Ok(Resolved::Paths(paths)),
        ScanTarget::All => {
            let exe = std::env::current_exe().map_err(Error::SelfPath)?;
            Ok(Resolved::Everything {
                root: root_of(&exe),
            })
        }
    }
}

/// Root of the volume holding `path`. Only this one volume is covered by
/// `--all`.
pub fn root_of(path: &Path) -> PathBuf {
    path.ancestors().last().unwrap_or(path).to_path_buf()
}
