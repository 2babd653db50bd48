//! Scripted in-memory process for exercising guards and walkers without a
//! live target.

#![forbid(unsafe_code)]

use crate::{
    Error, MemoryRegionInfo, ModuleEntry, Process, ProcessEntry, Protection, RegionState,
    RegionType, SystemInspector, ThreadEntry,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

#[derive(Debug)]
struct FakeRegion {
    base: usize,
    data: Vec<u8>,
    protect: Protection,
    allocation_base: usize,
    kind: RegionType,
}

impl FakeRegion {
    fn end(&self) -> usize {
        self.base + self.data.len()
    }

    fn info(&self) -> MemoryRegionInfo {
        MemoryRegionInfo {
            base: self.base,
            allocation_base: self.allocation_base,
            allocation_protect: self.protect,
            size: self.data.len(),
            state: RegionState::Committed,
            protect: self.protect,
            kind: self.kind,
        }
    }
}

/// A process whose address space is a sorted list of committed regions.
/// Gaps between regions report as free. Reads and writes honour the current
/// protection, so unguarded access to a non-readable page fails just like it
/// would against a real target.
#[derive(Debug)]
pub struct FakeProcess {
    pid: u32,
    image_path: PathBuf,
    regions: Mutex<Vec<FakeRegion>>,
    refused: Mutex<HashSet<Protection>>,
    history: Mutex<Vec<(usize, Protection)>>,
    protect_calls: AtomicUsize,
}

impl FakeProcess {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            image_path: PathBuf::from(format!("C:\\fake\\{pid}.exe")),
            regions: Mutex::new(Vec::new()),
            refused: Mutex::new(HashSet::new()),
            history: Mutex::new(Vec::new()),
            protect_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_region(self, base: usize, size: usize, protect: Protection) -> Self {
        self.with_region_data(base, vec![0; size], protect)
    }

    pub fn with_region_data(self, base: usize, data: Vec<u8>, protect: Protection) -> Self {
        self.push_region(base, data, protect, base, RegionType::Private)
    }

    /// Map `data` as an image allocation split into page-sized regions that
    /// all share `base` as their allocation base.
    pub fn with_image(self, base: usize, data: &[u8], protect: Protection) -> Self {
        const PAGE: usize = 0x1000;
        let mut this = self;
        for (i, chunk) in data.chunks(PAGE).enumerate() {
            let mut page = chunk.to_vec();
            page.resize(PAGE, 0);
            this = this.push_region(base + i * PAGE, page, protect, base, RegionType::Image);
        }
        this
    }

    fn push_region(
        self,
        base: usize,
        data: Vec<u8>,
        protect: Protection,
        allocation_base: usize,
        kind: RegionType,
    ) -> Self {
        {
            let mut regions = self.regions.lock();
            regions.push(FakeRegion {
                base,
                data,
                protect,
                allocation_base,
                kind,
            });
            regions.sort_by_key(|r| r.base);
        }
        self
    }

    /// Make every future `protect` call requesting `protection` fail.
    pub fn refuse(&self, protection: Protection) {
        self.refused.lock().insert(protection);
    }

    pub fn allow(&self, protection: Protection) {
        self.refused.lock().remove(&protection);
    }

    /// Number of `protect` attempts, including refused ones.
    pub fn protect_calls(&self) -> usize {
        self.protect_calls.load(Ordering::SeqCst)
    }

    /// Successful protection changes as `(region base, new protection)`.
    pub fn protect_history(&self) -> Vec<(usize, Protection)> {
        self.history.lock().clone()
    }

    pub fn protection_at(&self, address: usize) -> Protection {
        self.regions
            .lock()
            .iter()
            .find(|r| address >= r.base && address < r.end())
            .map(|r| r.protect)
            .unwrap_or(Protection::NOACCESS)
    }

    fn with_span<T>(
        &self,
        address: usize,
        len: usize,
        access: impl FnOnce(&mut FakeRegion, usize) -> Result<T, String>,
    ) -> Result<T, io::Error> {
        let mut regions = self.regions.lock();
        let region = regions
            .iter_mut()
            .find(|r| address >= r.base && address < r.end())
            .ok_or_else(|| io::Error::other("address not mapped"))?;
        if address.saturating_add(len) > region.end() {
            return Err(io::Error::other("access crosses region end"));
        }
        let offset = address - region.base;
        access(region, offset).map_err(io::Error::other)
    }
}

impl Process for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn query(&self, address: usize) -> Result<MemoryRegionInfo, Error> {
        let regions = self.regions.lock();
        if let Some(region) = regions.iter().find(|r| address >= r.base && address < r.end()) {
            return Ok(region.info());
        }
        // Report the gap up to the next region as free.
        let next = regions.iter().find(|r| r.base > address).map(|r| r.base);
        match next {
            Some(next) => Ok(MemoryRegionInfo {
                base: address,
                allocation_base: 0,
                allocation_protect: Protection::empty(),
                size: next - address,
                state: RegionState::Free,
                protect: Protection::NOACCESS,
                kind: RegionType::None,
            }),
            None => Err(Error::Query {
                address,
                source: io::Error::other("beyond the end of the address space"),
            }),
        }
    }

    fn protect(
        &self,
        region: &MemoryRegionInfo,
        protection: Protection,
    ) -> Result<Protection, Error> {
        self.protect_calls.fetch_add(1, Ordering::SeqCst);
        if self.refused.lock().contains(&protection) {
            return Err(Error::Protect {
                base: region.base,
                protect: protection.bits(),
                source: io::Error::other("protection refused by target"),
            });
        }

        let mut regions = self.regions.lock();
        let target = regions
            .iter_mut()
            .find(|r| r.base == region.base)
            .ok_or_else(|| Error::Protect {
                base: region.base,
                protect: protection.bits(),
                source: io::Error::other("region not mapped"),
            })?;
        let old = std::mem::replace(&mut target.protect, protection);
        self.history.lock().push((region.base, protection));
        Ok(old)
    }

    fn read_raw(&self, address: usize, buf: &mut [u8]) -> Result<(), Error> {
        let len = buf.len();
        self.with_span(address, len, |region, offset| {
            if !region.protect.can_read() || region.protect.is_bad() {
                return Err(format!("page not readable ({:#x})", region.protect.bits()));
            }
            buf.copy_from_slice(&region.data[offset..offset + buf.len()]);
            Ok(())
        })
        .map_err(|source| Error::Read {
            address,
            len,
            source,
        })
    }

    fn write_raw(&self, address: usize, buf: &[u8]) -> Result<(), Error> {
        let len = buf.len();
        self.with_span(address, len, |region, offset| {
            if !region.protect.can_write() || region.protect.is_bad() {
                return Err(format!("page not writable ({:#x})", region.protect.bits()));
            }
            region.data[offset..offset + buf.len()].copy_from_slice(buf);
            Ok(())
        })
        .map_err(|source| Error::Write {
            address,
            len,
            source,
        })
    }

    fn image_path(&self) -> Result<PathBuf, Error> {
        Ok(self.image_path.clone())
    }

    fn is_wow64(&self) -> Result<bool, Error> {
        Ok(false)
    }
}

/// Scripted system snapshot. Processes registered without a live
/// [`FakeProcess`] fail to open, like protected processes do.
#[derive(Debug, Default)]
pub struct FakeSystem {
    processes: Vec<ProcessEntry>,
    threads: Vec<ThreadEntry>,
    modules: HashMap<u32, Vec<ModuleEntry>>,
    live: HashMap<u32, Arc<FakeProcess>>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, entry: ProcessEntry, process: Option<FakeProcess>) -> Self {
        if let Some(process) = process {
            self.live.insert(entry.id, Arc::new(process));
        }
        self.processes.push(entry);
        self
    }

    pub fn with_thread(mut self, thread: ThreadEntry) -> Self {
        self.threads.push(thread);
        self
    }

    pub fn with_module(mut self, pid: u32, module: ModuleEntry) -> Self {
        self.modules.entry(pid).or_default().push(module);
        self
    }

    /// The live process behind `pid`, to inspect guard activity afterwards.
    pub fn process(&self, pid: u32) -> Option<Arc<FakeProcess>> {
        self.live.get(&pid).cloned()
    }
}

struct Shared(Arc<FakeProcess>);

impl Process for Shared {
    fn pid(&self) -> u32 {
        self.0.pid()
    }

    fn query(&self, address: usize) -> Result<MemoryRegionInfo, Error> {
        self.0.query(address)
    }

    fn protect(
        &self,
        region: &MemoryRegionInfo,
        protection: Protection,
    ) -> Result<Protection, Error> {
        self.0.protect(region, protection)
    }

    fn read_raw(&self, address: usize, buf: &mut [u8]) -> Result<(), Error> {
        self.0.read_raw(address, buf)
    }

    fn write_raw(&self, address: usize, buf: &[u8]) -> Result<(), Error> {
        self.0.write_raw(address, buf)
    }

    fn image_path(&self) -> Result<PathBuf, Error> {
        self.0.image_path()
    }

    fn is_wow64(&self) -> Result<bool, Error> {
        self.0.is_wow64()
    }
}

impl SystemInspector for FakeSystem {
    fn processes(&self) -> Result<Vec<ProcessEntry>, Error> {
        Ok(self.processes.clone())
    }

    fn threads(&self, pid: Option<u32>) -> Result<Vec<ThreadEntry>, Error> {
        Ok(self
            .threads
            .iter()
            .filter(|t| pid.is_none_or(|pid| t.owner_id == pid))
            .copied()
            .collect())
    }

    fn modules(&self, pid: u32) -> Result<Vec<ModuleEntry>, Error> {
        Ok(self.modules.get(&pid).cloned().unwrap_or_default())
    }

    fn open(&self, pid: u32) -> Result<Box<dyn Process>, Error> {
        match self.live.get(&pid) {
            Some(process) => Ok(Box::new(Shared(Arc::clone(process)))),
            None => Err(Error::OpenProcess {
                pid,
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            }),
        }
    }
}
