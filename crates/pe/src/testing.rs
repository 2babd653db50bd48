//! Builder for small, well-formed PE images used by tests.
//!
//! File and section alignment are both 0x200 and every section's raw
//! pointer equals its RVA, so the bytes parse the same as [`ImageKind::Data`]
//! and [`ImageKind::Image`].
//!
//! [`ImageKind::Data`]: crate::ImageKind::Data
//! [`ImageKind::Image`]: crate::ImageKind::Image

#![forbid(unsafe_code)]

use crate::layout::{
    self, DataDirectory, DirectoryEntry, DosHeader, FileHeader, OptionalHeader32,
    OptionalHeader64, SectionHeader,
};
use scroll::{LE, Pwrite};

const HEADERS_SIZE: u32 = 0x400;
const ALIGNMENT: u32 = 0x200;
const NT_OFFSET: u32 = 0x40;

pub const IMAGE_BASE_32: u64 = 0x1000_0000;
pub const IMAGE_BASE_64: u64 = 0x1_8000_0000;

#[derive(Debug, Clone)]
struct Import {
    module: Vec<u8>,
    names: Vec<Vec<u8>>,
    new_bound: bool,
}

#[derive(Debug, Clone)]
pub struct PeBuilder {
    is_64: bool,
    time_date_stamp: u32,
    sections: Vec<(Vec<u8>, Vec<u8>)>,
    exports: Option<(Vec<u8>, Vec<Vec<u8>>)>,
    imports: Vec<Import>,
    relocations: Vec<(u32, Vec<u16>)>,
    bad_relocation_size: bool,
    tls_callbacks: Option<Vec<u32>>,
    overlay: Vec<u8>,
    corrupt_nt: bool,
}

/// Growable little-endian buffer with patching.
#[derive(Default)]
struct Blob(Vec<u8>);

impl Blob {
    fn reserve(&mut self, len: usize) -> u32 {
        let at = self.0.len();
        self.0.resize(at + len, 0);
        at as u32
    }

    fn push(&mut self, bytes: &[u8]) -> u32 {
        let at = self.0.len();
        self.0.extend_from_slice(bytes);
        at as u32
    }

    fn cstr(&mut self, bytes: &[u8]) -> u32 {
        let at = self.push(bytes);
        self.0.push(0);
        at
    }

    fn put(&mut self, at: u32, bytes: &[u8]) {
        let at = at as usize;
        self.0[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn put_u16(&mut self, at: u32, value: u16) {
        self.put(at, &value.to_le_bytes());
    }

    fn put_u32(&mut self, at: u32, value: u32) {
        self.put(at, &value.to_le_bytes());
    }

    fn put_ptr(&mut self, at: u32, value: u64, is_64: bool) {
        if is_64 {
            self.put(at, &value.to_le_bytes());
        } else {
            self.put_u32(at, value as u32);
        }
    }
}

fn align(value: u32) -> u32 {
    value.div_ceil(ALIGNMENT) * ALIGNMENT
}

impl PeBuilder {
    pub fn new(is_64: bool) -> Self {
        Self {
            is_64,
            time_date_stamp: 0x5E0B_E100,
            sections: Vec::new(),
            exports: None,
            imports: Vec::new(),
            relocations: Vec::new(),
            bad_relocation_size: false,
            tls_callbacks: None,
            overlay: Vec::new(),
            corrupt_nt: false,
        }
    }

    pub fn time_date_stamp(mut self, stamp: u32) -> Self {
        self.time_date_stamp = stamp;
        self
    }

    /// Add a section. Names longer than eight bytes are cut.
    pub fn section(mut self, name: impl AsRef<[u8]>, data: Vec<u8>) -> Self {
        self.sections.push((name.as_ref().to_vec(), data));
        self
    }

    pub fn exports<N: AsRef<[u8]>>(mut self, module: impl AsRef<[u8]>, names: &[N]) -> Self {
        self.exports = Some((
            module.as_ref().to_vec(),
            names.iter().map(|n| n.as_ref().to_vec()).collect(),
        ));
        self
    }

    pub fn import<N: AsRef<[u8]>>(mut self, module: impl AsRef<[u8]>, names: &[N]) -> Self {
        self.imports.push(Import {
            module: module.as_ref().to_vec(),
            names: names.iter().map(|n| n.as_ref().to_vec()).collect(),
            new_bound: false,
        });
        self
    }

    /// An import descriptor carrying the new-style bound stamp. No bound
    /// import directory is written.
    pub fn new_bound_import<N: AsRef<[u8]>>(
        mut self,
        module: impl AsRef<[u8]>,
        names: &[N],
    ) -> Self {
        self = self.import(module, names);
        if let Some(last) = self.imports.last_mut() {
            last.new_bound = true;
        }
        self
    }

    pub fn relocation_block(mut self, page_rva: u32, entries: &[u16]) -> Self {
        self.relocations.push((page_rva, entries.to_vec()));
        self
    }

    /// Write an impossible `SizeOfBlock` into the first relocation block.
    pub fn corrupt_relocation_size(mut self) -> Self {
        self.bad_relocation_size = true;
        self
    }

    /// TLS directory with callbacks at the given RVAs.
    pub fn tls_callbacks(mut self, rvas: &[u32]) -> Self {
        self.tls_callbacks = Some(rvas.to_vec());
        self
    }

    pub fn overlay(mut self, bytes: &[u8]) -> Self {
        self.overlay = bytes.to_vec();
        self
    }

    pub fn corrupt_nt_signature(mut self) -> Self {
        self.corrupt_nt = true;
        self
    }

    fn image_base(&self) -> u64 {
        if self.is_64 { IMAGE_BASE_64 } else { IMAGE_BASE_32 }
    }

    fn ptr_size(&self) -> u32 {
        if self.is_64 { 8 } else { 4 }
    }

    fn export_blob(&self, base: u32, module: &[u8], names: &[Vec<u8>]) -> Blob {
        let count = names.len() as u32;
        let mut blob = Blob::default();
        let dir = blob.reserve(40);
        let functions = blob.reserve(names.len() * 4);
        let name_table = blob.reserve(names.len() * 4);
        let ordinals = blob.reserve(names.len() * 2);
        let module_at = blob.cstr(module);

        for (i, name) in names.iter().enumerate() {
            let i = i as u32;
            // Points into the headers, outside the export directory.
            blob.put_u32(functions + i * 4, 0x200 + i * 0x10);
            let at = blob.cstr(name);
            blob.put_u32(name_table + i * 4, base + at);
            blob.put_u16(ordinals + i * 2, i as u16);
        }

        blob.put_u32(dir + 12, base + module_at);
        blob.put_u32(dir + 16, 1);
        blob.put_u32(dir + 20, count);
        blob.put_u32(dir + 24, count);
        blob.put_u32(dir + 28, base + functions);
        blob.put_u32(dir + 32, base + name_table);
        blob.put_u32(dir + 36, base + ordinals);
        blob
    }

    fn import_blob(&self, base: u32) -> Blob {
        let ptr = self.ptr_size();
        let mut blob = Blob::default();
        let descriptors = blob.reserve((self.imports.len() + 1) * 20);

        for (i, import) in self.imports.iter().enumerate() {
            let desc = descriptors + i as u32 * 20;
            let thunks = (import.names.len() + 1) * ptr as usize;
            let int = blob.reserve(thunks);
            let iat = blob.reserve(thunks);
            for (j, name) in import.names.iter().enumerate() {
                let hint_name = blob.reserve(2);
                blob.cstr(name);
                if blob.0.len() % 2 != 0 {
                    blob.0.push(0);
                }
                let entry = u64::from(base + hint_name);
                blob.put_ptr(int + j as u32 * ptr, entry, self.is_64);
                blob.put_ptr(iat + j as u32 * ptr, entry, self.is_64);
            }
            let module = blob.cstr(&import.module);

            blob.put_u32(desc, base + int);
            if import.new_bound {
                blob.put_u32(desc + 4, layout::ImportDescriptor::NEW_BOUND_STAMP);
            }
            blob.put_u32(desc + 12, base + module);
            blob.put_u32(desc + 16, base + iat);
        }
        blob
    }

    fn tls_blob(&self, base: u32, callbacks: &[u32]) -> Blob {
        let ptr = self.ptr_size();
        let mut blob = Blob::default();
        let dir_size = if self.is_64 { 40 } else { 24 };
        let dir = blob.reserve(dir_size);
        let list = blob.reserve((callbacks.len() + 1) * ptr as usize);
        for (i, rva) in callbacks.iter().enumerate() {
            blob.put_ptr(list + i as u32 * ptr, self.image_base() + u64::from(*rva), self.is_64);
        }
        let callbacks_va = self.image_base() + u64::from(base + list);
        // AddressOfCallBacks is the fourth pointer-sized field.
        blob.put_ptr(dir + 3 * ptr, callbacks_va, self.is_64);
        blob
    }

    fn relocation_blob(&self) -> Blob {
        let mut blob = Blob::default();
        for (i, (page, entries)) in self.relocations.iter().enumerate() {
            let header = blob.reserve(8);
            let size = if self.bad_relocation_size && i == 0 {
                3
            } else {
                8 + entries.len() as u32 * 2
            };
            blob.put_u32(header, *page);
            blob.put_u32(header + 4, size);
            for entry in entries {
                blob.push(&entry.to_le_bytes());
            }
        }
        blob
    }

    pub fn build(self) -> Vec<u8> {
        let mut sections: Vec<(Vec<u8>, Vec<u8>)> = self.sections.clone();
        let mut directories = [DataDirectory::default(); layout::MAX_DATA_DIRECTORIES];

        let mut cursor = HEADERS_SIZE;
        for (_, data) in &sections {
            cursor += align(data.len().max(1) as u32);
        }

        let mut generated = |name: &[u8], blob: Blob, entry: DirectoryEntry, cursor: &mut u32| {
            directories[entry as usize] = DataDirectory {
                virtual_address: *cursor,
                size: blob.0.len() as u32,
            };
            *cursor += align(blob.0.len().max(1) as u32);
            sections.push((name.to_vec(), blob.0));
        };

        if let Some((module, names)) = &self.exports {
            let blob = self.export_blob(cursor, module, names);
            generated(b".edata", blob, DirectoryEntry::Export, &mut cursor);
        }
        if !self.imports.is_empty() {
            let blob = self.import_blob(cursor);
            generated(b".idata", blob, DirectoryEntry::Import, &mut cursor);
        }
        if let Some(callbacks) = &self.tls_callbacks {
            let blob = self.tls_blob(cursor, callbacks);
            generated(b".tls", blob, DirectoryEntry::Tls, &mut cursor);
        }
        if !self.relocations.is_empty() {
            let blob = self.relocation_blob();
            generated(b".reloc", blob, DirectoryEntry::BaseReloc, &mut cursor);
        }
        let size_of_image = cursor;

        let mut image = vec![0u8; size_of_image as usize];
        let mut headers = Vec::with_capacity(sections.len());
        let mut at = HEADERS_SIZE;
        for (name, data) in &sections {
            let mut raw_name = [0u8; 8];
            let len = name.len().min(8);
            raw_name[..len].copy_from_slice(&name[..len]);
            let raw_size = align(data.len().max(1) as u32);
            headers.push(SectionHeader {
                name: raw_name,
                virtual_size: data.len() as u32,
                virtual_address: at,
                size_of_raw_data: raw_size,
                pointer_to_raw_data: at,
                characteristics: 0x4000_0040,
                ..Default::default()
            });
            image[at as usize..at as usize + data.len()].copy_from_slice(data);
            at += raw_size;
        }

        let (fixed, machine) = if self.is_64 {
            (layout::OPTIONAL_HEADER_64_SIZE, 0x8664)
        } else {
            (layout::OPTIONAL_HEADER_32_SIZE, 0x014C)
        };
        let optional_size = fixed + layout::MAX_DATA_DIRECTORIES * layout::DATA_DIRECTORY_SIZE;

        let dos = DosHeader {
            e_magic: layout::DOS_SIGNATURE,
            e_lfanew: NT_OFFSET,
            ..Default::default()
        };
        let file = FileHeader {
            machine,
            number_of_sections: headers.len() as u16,
            time_date_stamp: self.time_date_stamp,
            size_of_optional_header: optional_size as u16,
            characteristics: 0x0102,
            ..Default::default()
        };

        let signature = if self.corrupt_nt { 0x0000_5850 } else { layout::NT_SIGNATURE };
        let mut offset = NT_OFFSET as usize + 4 + layout::FILE_HEADER_SIZE;
        let mut write = |image: &mut Vec<u8>| -> Result<(), scroll::Error> {
            image.pwrite_with(dos, 0, LE)?;
            image.pwrite_with(signature, NT_OFFSET as usize, LE)?;
            image.pwrite_with(file, NT_OFFSET as usize + 4, LE)?;
            if self.is_64 {
                let opt = OptionalHeader64 {
                    magic: layout::OPTIONAL_MAGIC_64,
                    image_base: IMAGE_BASE_64,
                    section_alignment: ALIGNMENT,
                    file_alignment: ALIGNMENT,
                    major_subsystem_version: 6,
                    size_of_image,
                    size_of_headers: HEADERS_SIZE,
                    subsystem: 2,
                    number_of_rva_and_sizes: layout::MAX_DATA_DIRECTORIES as u32,
                    ..Default::default()
                };
                image.pwrite_with(opt, offset, LE)?;
            } else {
                let opt = OptionalHeader32 {
                    magic: layout::OPTIONAL_MAGIC_32,
                    image_base: IMAGE_BASE_32 as u32,
                    section_alignment: ALIGNMENT,
                    file_alignment: ALIGNMENT,
                    major_subsystem_version: 6,
                    size_of_image,
                    size_of_headers: HEADERS_SIZE,
                    subsystem: 2,
                    number_of_rva_and_sizes: layout::MAX_DATA_DIRECTORIES as u32,
                    ..Default::default()
                };
                image.pwrite_with(opt, offset, LE)?;
            }
            offset += fixed;
            for dir in directories {
                image.pwrite_with(dir, offset, LE)?;
                offset += layout::DATA_DIRECTORY_SIZE;
            }
            for header in &headers {
                image.pwrite_with(*header, offset, LE)?;
                offset += layout::SECTION_HEADER_SIZE;
            }
            Ok(())
        };
        write(&mut image).expect("headers fit in HEADERS_SIZE");

        image.extend_from_slice(&self.overlay);
        image
    }
}
