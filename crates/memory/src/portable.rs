//! Fallback enumeration for hosts without the Windows memory APIs. Process
//! listings come from `sysinfo`; opening a process for memory access is not
//! available.

#![forbid(unsafe_code)]

use crate::{
    Error,
    process::Process,
    system::{ModuleEntry, ProcessEntry, SystemInspector, ThreadEntry},
};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Default)]
pub struct PortableSystem;

impl PortableSystem {
    fn snapshot() -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_tasks(),
        );
        system
    }
}

impl SystemInspector for PortableSystem {
    fn processes(&self) -> Result<Vec<ProcessEntry>, Error> {
        let system = Self::snapshot();
        let mut entries: Vec<_> = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                id: pid.as_u32(),
                threads: process
                    .tasks()
                    .map_or(1, |tasks| u32::try_from(tasks.len()).unwrap_or(u32::MAX)),
                parent_id: process.parent().map_or(0, |parent| parent.as_u32()),
                priority: 0,
                name: process.name().to_string_lossy().into_owned(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }

    fn threads(&self, pid: Option<u32>) -> Result<Vec<ThreadEntry>, Error> {
        let system = Self::snapshot();
        let mut threads = Vec::new();
        for (owner, process) in system.processes() {
            if pid.is_some_and(|pid| pid != owner.as_u32()) {
                continue;
            }
            let Some(tasks) = process.tasks() else {
                continue;
            };
            threads.extend(tasks.iter().map(|tid| ThreadEntry {
                usage: 0,
                id: tid.as_u32(),
                owner_id: owner.as_u32(),
                base_priority: 0,
                delta_priority: 0,
                flags: 0,
            }));
        }
        threads.sort_by_key(|thread| (thread.owner_id, thread.id));
        Ok(threads)
    }

    fn modules(&self, _pid: u32) -> Result<Vec<ModuleEntry>, Error> {
        Err(Error::Unsupported("module enumeration"))
    }

    fn open(&self, _pid: u32) -> Result<Box<dyn Process>, Error> {
        Err(Error::Unsupported("opening foreign processes"))
    }
}
