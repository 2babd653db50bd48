//! Windows backend over `windows-sys`: Toolhelp snapshots for enumeration,
//! `VirtualQueryEx`/`VirtualProtectEx` for regions and
//! `ReadProcessMemory`/`WriteProcessMemory` for data.

#![allow(unsafe_code)]

use crate::{
    Error, MemoryRegionInfo, Protection, RegionState, RegionType,
    process::Process,
    system::{ModuleEntry, ProcessEntry, SystemInspector, ThreadEntry},
};
use std::{ffi::c_void, io, mem, path::PathBuf};
use windows_sys::Win32::{
    Foundation::{CloseHandle, FALSE, HANDLE, INVALID_HANDLE_VALUE},
    System::{
        Diagnostics::{
            Debug::{ReadProcessMemory, WriteProcessMemory},
            ToolHelp::{
                CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW,
                PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPMODULE,
                TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS, TH32CS_SNAPTHREAD, THREADENTRY32,
                Thread32First, Thread32Next,
            },
        },
        Memory::{MEMORY_BASIC_INFORMATION, VirtualProtectEx, VirtualQueryEx},
        Threading::{
            IsWow64Process, OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_INFORMATION,
            PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE, QueryFullProcessImageNameW,
        },
    },
};

/// Owned kernel handle, closed on drop.
#[derive(Debug)]
struct OwnedHandle(HANDLE);

// SAFETY: kernel handles are process-wide values and the APIs used on them
// are thread-safe.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: we own the handle and close it exactly once.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn snapshot(flags: u32, pid: u32) -> Result<OwnedHandle, Error> {
    // SAFETY: plain FFI call, the result is checked below.
    let handle = unsafe { CreateToolhelp32Snapshot(flags, pid) };
    if handle == INVALID_HANDLE_VALUE {
        return Err(Error::Snapshot(io::Error::last_os_error()));
    }
    Ok(OwnedHandle(handle))
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|c| *c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

#[derive(Debug, Default)]
pub struct WindowsSystem;

impl SystemInspector for WindowsSystem {
    fn processes(&self) -> Result<Vec<ProcessEntry>, Error> {
        let snap = snapshot(TH32CS_SNAPPROCESS, 0)?;
        // SAFETY: PROCESSENTRY32W is plain data; zero is a valid bit pattern.
        let mut entry: PROCESSENTRY32W = unsafe { mem::zeroed() };
        entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

        let mut out = Vec::new();
        // SAFETY: `entry` is a properly sized out parameter.
        let mut ok = unsafe { Process32FirstW(snap.0, &mut entry) };
        while ok != 0 {
            out.push(ProcessEntry {
                id: entry.th32ProcessID,
                threads: entry.cntThreads,
                parent_id: entry.th32ParentProcessID,
                priority: entry.pcPriClassBase,
                name: wide_to_string(&entry.szExeFile),
            });
            // SAFETY: as above.
            ok = unsafe { Process32NextW(snap.0, &mut entry) };
        }
        Ok(out)
    }

    fn threads(&self, pid: Option<u32>) -> Result<Vec<ThreadEntry>, Error> {
        let snap = snapshot(TH32CS_SNAPTHREAD, 0)?;
        // SAFETY: THREADENTRY32 is plain data.
        let mut entry: THREADENTRY32 = unsafe { mem::zeroed() };
        entry.dwSize = mem::size_of::<THREADENTRY32>() as u32;

        let mut out = Vec::new();
        // SAFETY: `entry` is a properly sized out parameter.
        let mut ok = unsafe { Thread32First(snap.0, &mut entry) };
        while ok != 0 {
            if pid.is_none_or(|pid| pid == entry.th32OwnerProcessID) {
                out.push(ThreadEntry {
                    usage: entry.cntUsage,
                    id: entry.th32ThreadID,
                    owner_id: entry.th32OwnerProcessID,
                    base_priority: entry.tpBasePri,
                    delta_priority: entry.tpDeltaPri,
                    flags: entry.dwFlags,
                });
            }
            // SAFETY: as above.
            ok = unsafe { Thread32Next(snap.0, &mut entry) };
        }
        Ok(out)
    }

    fn modules(&self, pid: u32) -> Result<Vec<ModuleEntry>, Error> {
        let snap = snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid)?;
        // SAFETY: MODULEENTRY32W is plain data.
        let mut entry: MODULEENTRY32W = unsafe { mem::zeroed() };
        entry.dwSize = mem::size_of::<MODULEENTRY32W>() as u32;

        let mut out = Vec::new();
        // SAFETY: `entry` is a properly sized out parameter.
        let mut ok = unsafe { Module32FirstW(snap.0, &mut entry) };
        while ok != 0 {
            out.push(ModuleEntry {
                base: entry.modBaseAddr as usize,
                size: entry.modBaseSize as usize,
                name: wide_to_string(&entry.szModule),
                path: PathBuf::from(wide_to_string(&entry.szExePath)),
            });
            // SAFETY: as above.
            ok = unsafe { Module32NextW(snap.0, &mut entry) };
        }
        Ok(out)
    }

    fn open(&self, pid: u32) -> Result<Box<dyn Process>, Error> {
        Ok(Box::new(WindowsProcess::open(pid)?))
    }
}

#[derive(Debug)]
pub struct WindowsProcess {
    pid: u32,
    handle: OwnedHandle,
}

impl WindowsProcess {
    pub fn open(pid: u32) -> Result<Self, Error> {
        let access =
            PROCESS_QUERY_INFORMATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION;
        // SAFETY: plain FFI call, the result is checked below.
        let handle = unsafe { OpenProcess(access, FALSE, pid) };
        if handle.is_null() {
            return Err(Error::OpenProcess {
                pid,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self {
            pid,
            handle: OwnedHandle(handle),
        })
    }
}

impl Process for WindowsProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn query(&self, address: usize) -> Result<MemoryRegionInfo, Error> {
        // SAFETY: MEMORY_BASIC_INFORMATION is plain data.
        let mut mbi: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };
        // SAFETY: `mbi` is a properly sized out parameter.
        let written = unsafe {
            VirtualQueryEx(
                self.handle.0,
                address as *const c_void,
                &mut mbi,
                mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            return Err(Error::Query {
                address,
                source: io::Error::last_os_error(),
            });
        }
        Ok(MemoryRegionInfo {
            base: mbi.BaseAddress as usize,
            allocation_base: mbi.AllocationBase as usize,
            allocation_protect: Protection::from_bits_retain(mbi.AllocationProtect),
            size: mbi.RegionSize,
            state: RegionState::from_raw(mbi.State),
            protect: Protection::from_bits_retain(mbi.Protect),
            kind: RegionType::from_raw(mbi.Type),
        })
    }

    fn protect(
        &self,
        region: &MemoryRegionInfo,
        protection: Protection,
    ) -> Result<Protection, Error> {
        let mut old = 0u32;
        // SAFETY: the call only changes page attributes of the target; `old`
        // is a valid out parameter.
        let ok = unsafe {
            VirtualProtectEx(
                self.handle.0,
                region.base as *const c_void,
                region.size,
                protection.bits(),
                &mut old,
            )
        };
        if ok == 0 {
            return Err(Error::Protect {
                base: region.base,
                protect: protection.bits(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(Protection::from_bits_retain(old))
    }

    fn read_raw(&self, address: usize, buf: &mut [u8]) -> Result<(), Error> {
        let mut read = 0usize;
        // SAFETY: `buf` is valid for `buf.len()` bytes of writes.
        let ok = unsafe {
            ReadProcessMemory(
                self.handle.0,
                address as *const c_void,
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut read,
            )
        };
        if ok == 0 || read != buf.len() {
            return Err(Error::Read {
                address,
                len: buf.len(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn write_raw(&self, address: usize, data: &[u8]) -> Result<(), Error> {
        let mut written = 0usize;
        // SAFETY: `data` is valid for `data.len()` bytes of reads.
        let ok = unsafe {
            WriteProcessMemory(
                self.handle.0,
                address as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                &mut written,
            )
        };
        if ok == 0 || written != data.len() {
            return Err(Error::Write {
                address,
                len: data.len(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn image_path(&self) -> Result<PathBuf, Error> {
        let mut buf = vec![0u16; 32 * 1024];
        let mut len = buf.len() as u32;
        // SAFETY: `buf` holds `len` wide characters.
        let ok = unsafe {
            QueryFullProcessImageNameW(
                self.handle.0,
                PROCESS_NAME_WIN32,
                buf.as_mut_ptr(),
                &mut len,
            )
        };
        if ok == 0 {
            return Err(Error::ProcessInfo(io::Error::last_os_error()));
        }
        Ok(PathBuf::from(String::from_utf16_lossy(&buf[..len as usize])))
    }

    fn is_wow64(&self) -> Result<bool, Error> {
        let mut wow64 = FALSE;
        // SAFETY: `wow64` is a valid out parameter.
        let ok = unsafe { IsWow64Process(self.handle.0, &mut wow64) };
        if ok == 0 {
            return Err(Error::ProcessInfo(io::Error::last_os_error()));
        }
        Ok(wow64 != 0)
    }
}
