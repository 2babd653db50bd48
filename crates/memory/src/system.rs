#![forbid(unsafe_code)]

use crate::{Error, process::Process};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub id: u32,
    pub threads: u32,
    pub parent_id: u32,
    pub priority: i32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadEntry {
    pub usage: u32,
    pub id: u32,
    pub owner_id: u32,
    pub base_priority: i32,
    pub delta_priority: i32,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub base: usize,
    pub size: usize,
    pub name: String,
    pub path: PathBuf,
}

/// Process, thread and module enumeration plus process opening.
pub trait SystemInspector: Send + Sync {
    fn processes(&self) -> Result<Vec<ProcessEntry>, Error>;

    /// Threads owned by `pid`, or every thread in the system when `None`.
    fn threads(&self, pid: Option<u32>) -> Result<Vec<ThreadEntry>, Error>;

    fn modules(&self, pid: u32) -> Result<Vec<ModuleEntry>, Error>;

    fn open(&self, pid: u32) -> Result<Box<dyn Process>, Error>;
}

/// Find a process by image name, ignoring ASCII case.
pub fn find_process_by_name<'a>(
    processes: &'a [ProcessEntry],
    name: &str,
) -> Option<&'a ProcessEntry> {
    processes
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(name))
}

/// Inspector for the platform we are running on.
pub fn native() -> Box<dyn SystemInspector> {
    #[cfg(windows)]
    {
        Box::new(crate::windows::WindowsSystem)
    }
    #[cfg(not(windows))]
    {
        Box::new(crate::portable::PortableSystem::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_ignores_case() {
        let processes = vec![
            ProcessEntry {
                id: 4,
                threads: 100,
                parent_id: 0,
                priority: 8,
                name: "System".into(),
            },
            ProcessEntry {
                id: 1234,
                threads: 3,
                parent_id: 4,
                priority: 8,
                name: "Notepad.exe".into(),
            },
        ];

        assert_eq!(find_process_by_name(&processes, "notepad.EXE").map(|e| e.id), Some(1234));
        assert!(find_process_by_name(&processes, "calc.exe").is_none());
    }
}
