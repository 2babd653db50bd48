#![forbid(unsafe_code)]

use crate::{
    Error,
    image::{ImageKind, ImageSource},
    layout::{
        self, DataDirectory, DirectoryEntry, DosHeader, FileHeader, OptionalHeader32,
        OptionalHeader64, SectionHeader,
    },
};
use scroll::{
    LE, Pread,
    ctx::{SizeWith, TryFromCtx},
};

/// Optional header with both widths folded into one shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionalHeader {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    /// Only present in PE32.
    pub base_of_data: Option<u32>,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl From<OptionalHeader32> for OptionalHeader {
    fn from(h: OptionalHeader32) -> Self {
        Self {
            magic: h.magic,
            major_linker_version: h.major_linker_version,
            minor_linker_version: h.minor_linker_version,
            size_of_code: h.size_of_code,
            size_of_initialized_data: h.size_of_initialized_data,
            size_of_uninitialized_data: h.size_of_uninitialized_data,
            address_of_entry_point: h.address_of_entry_point,
            base_of_code: h.base_of_code,
            base_of_data: Some(h.base_of_data),
            image_base: h.image_base.into(),
            section_alignment: h.section_alignment,
            file_alignment: h.file_alignment,
            major_operating_system_version: h.major_operating_system_version,
            minor_operating_system_version: h.minor_operating_system_version,
            major_image_version: h.major_image_version,
            minor_image_version: h.minor_image_version,
            major_subsystem_version: h.major_subsystem_version,
            minor_subsystem_version: h.minor_subsystem_version,
            win32_version_value: h.win32_version_value,
            size_of_image: h.size_of_image,
            size_of_headers: h.size_of_headers,
            check_sum: h.check_sum,
            subsystem: h.subsystem,
            dll_characteristics: h.dll_characteristics,
            size_of_stack_reserve: h.size_of_stack_reserve.into(),
            size_of_stack_commit: h.size_of_stack_commit.into(),
            size_of_heap_reserve: h.size_of_heap_reserve.into(),
            size_of_heap_commit: h.size_of_heap_commit.into(),
            loader_flags: h.loader_flags,
            number_of_rva_and_sizes: h.number_of_rva_and_sizes,
        }
    }
}

impl From<OptionalHeader64> for OptionalHeader {
    fn from(h: OptionalHeader64) -> Self {
        Self {
            magic: h.magic,
            major_linker_version: h.major_linker_version,
            minor_linker_version: h.minor_linker_version,
            size_of_code: h.size_of_code,
            size_of_initialized_data: h.size_of_initialized_data,
            size_of_uninitialized_data: h.size_of_uninitialized_data,
            address_of_entry_point: h.address_of_entry_point,
            base_of_code: h.base_of_code,
            base_of_data: None,
            image_base: h.image_base,
            section_alignment: h.section_alignment,
            file_alignment: h.file_alignment,
            major_operating_system_version: h.major_operating_system_version,
            minor_operating_system_version: h.minor_operating_system_version,
            major_image_version: h.major_image_version,
            minor_image_version: h.minor_image_version,
            major_subsystem_version: h.major_subsystem_version,
            minor_subsystem_version: h.minor_subsystem_version,
            win32_version_value: h.win32_version_value,
            size_of_image: h.size_of_image,
            size_of_headers: h.size_of_headers,
            check_sum: h.check_sum,
            subsystem: h.subsystem,
            dll_characteristics: h.dll_characteristics,
            size_of_stack_reserve: h.size_of_stack_reserve,
            size_of_stack_commit: h.size_of_stack_commit,
            size_of_heap_reserve: h.size_of_heap_reserve,
            size_of_heap_commit: h.size_of_heap_commit,
            loader_flags: h.loader_flags,
            number_of_rva_and_sizes: h.number_of_rva_and_sizes,
        }
    }
}

/// A validated PE image: DOS and NT headers parsed, section table loaded.
/// Everything past that is read lazily by the walkers.
pub struct PeFile<'a> {
    source: &'a dyn ImageSource,
    kind: ImageKind,
    dos: DosHeader,
    nt_offset: usize,
    file_header: FileHeader,
    optional: OptionalHeader,
    directories: Vec<DataDirectory>,
    sections: Vec<SectionHeader>,
}

impl std::fmt::Debug for PeFile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeFile")
            .field("kind", &self.kind)
            .field("len", &self.source.len())
            .field("is_64", &self.is_64())
            .field("sections", &self.sections.len())
            .finish_non_exhaustive()
    }
}

impl<'a> PeFile<'a> {
    pub fn parse(source: &'a dyn ImageSource, kind: ImageKind) -> Result<Self, Error> {
        let dos: DosHeader = read_struct(source, 0)?;
        if dos.e_magic != layout::DOS_SIGNATURE {
            return Err(Error::InvalidDosSignature(dos.e_magic));
        }

        let nt_offset = dos.e_lfanew as usize;
        let signature: u32 = read_struct(source, nt_offset)?;
        if signature != layout::NT_SIGNATURE {
            return Err(Error::InvalidNtSignature(signature));
        }

        let file_offset = nt_offset + 4;
        let file_header: FileHeader = read_struct(source, file_offset)?;

        let optional_offset = file_offset + layout::FILE_HEADER_SIZE;
        let magic: u16 = read_struct(source, optional_offset)?;
        let (optional, fixed_size): (OptionalHeader, usize) = match magic {
            layout::OPTIONAL_MAGIC_32 => (
                read_struct::<OptionalHeader32>(source, optional_offset)?.into(),
                layout::OPTIONAL_HEADER_32_SIZE,
            ),
            layout::OPTIONAL_MAGIC_64 => (
                read_struct::<OptionalHeader64>(source, optional_offset)?.into(),
                layout::OPTIONAL_HEADER_64_SIZE,
            ),
            other => return Err(Error::UnknownOptionalMagic(other)),
        };

        // Directories past the declared optional header size or past the
        // loader's limit are ignored.
        let room = (file_header.size_of_optional_header as usize).saturating_sub(fixed_size)
            / layout::DATA_DIRECTORY_SIZE;
        let count = (optional.number_of_rva_and_sizes as usize)
            .min(layout::MAX_DATA_DIRECTORIES)
            .min(room);
        let directories = (0..count)
            .map(|i| {
                read_struct(
                    source,
                    optional_offset + fixed_size + i * layout::DATA_DIRECTORY_SIZE,
                )
            })
            .collect::<Result<Vec<DataDirectory>, _>>()?;

        let sections_offset = optional_offset + file_header.size_of_optional_header as usize;
        let sections = (0..file_header.number_of_sections as usize)
            .map(|i| read_struct(source, sections_offset + i * layout::SECTION_HEADER_SIZE))
            .collect::<Result<Vec<SectionHeader>, _>>()?;

        Ok(Self {
            source,
            kind,
            dos,
            nt_offset,
            file_header,
            optional,
            directories,
            sections,
        })
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn is_64(&self) -> bool {
        self.optional.magic == layout::OPTIONAL_MAGIC_64
    }

    pub fn pointer_size(&self) -> usize {
        if self.is_64() { 8 } else { 4 }
    }

    pub fn dos_header(&self) -> &DosHeader {
        &self.dos
    }

    pub fn nt_offset(&self) -> usize {
        self.nt_offset
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    pub fn optional_header(&self) -> &OptionalHeader {
        &self.optional
    }

    pub fn directories(&self) -> &[DataDirectory] {
        &self.directories
    }

    /// The directory for `entry`, if the header declares it and it is
    /// non-empty.
    pub fn directory(&self, entry: DirectoryEntry) -> Option<DataDirectory> {
        self.directories
            .get(entry as usize)
            .copied()
            .filter(DataDirectory::is_present)
    }

    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    /// Translate an RVA into an offset into the backing source.
    pub fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        let offset = match self.kind {
            ImageKind::Image => rva as usize,
            ImageKind::Data => {
                if rva < self.optional.size_of_headers || self.sections.is_empty() {
                    rva as usize
                } else {
                    let section = self.sections.iter().find(|s| {
                        rva >= s.virtual_address && rva - s.virtual_address < s.virtual_extent()
                    })?;
                    let delta = rva - section.virtual_address;
                    if delta >= section.size_of_raw_data {
                        // Inside the section's zero-filled tail, not on disk.
                        return None;
                    }
                    section.pointer_to_raw_data as usize + delta as usize
                }
            }
        };
        (offset < self.source.len()).then_some(offset)
    }

    /// Translate a virtual address relative to the preferred image base.
    pub fn va_to_rva(&self, va: u64) -> Option<u32> {
        va.checked_sub(self.optional.image_base)
            .and_then(|rva| u32::try_from(rva).ok())
    }

    pub fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<(), Error> {
        self.source.read_at(offset, buf)
    }

    pub fn read_at<T>(&self, offset: usize) -> Result<T, Error>
    where
        T: for<'b> TryFromCtx<'b, scroll::Endian, Error = scroll::Error> + SizeWith<scroll::Endian>,
    {
        read_struct(self.source, offset)
    }

    pub fn read_rva<T>(&self, rva: u32) -> Result<T, Error>
    where
        T: for<'b> TryFromCtx<'b, scroll::Endian, Error = scroll::Error> + SizeWith<scroll::Endian>,
    {
        let offset = self.rva_to_offset(rva).ok_or(Error::InvalidRva(rva))?;
        self.read_at(offset)
    }

    /// Read a pointer-sized value at `rva`, widened to 64 bits.
    pub fn read_pointer_rva(&self, rva: u32) -> Result<u64, Error> {
        if self.is_64() {
            self.read_rva::<u64>(rva)
        } else {
            self.read_rva::<u32>(rva).map(u64::from)
        }
    }

    /// NUL-terminated byte string at `rva`, without the terminator. Reads at
    /// most `max + 1` bytes, so an unterminated string comes back longer than
    /// `max` and is caught by the sanitizer.
    pub fn read_cstr_rva(&self, rva: u32, max: usize) -> Result<Vec<u8>, Error> {
        let offset = self.rva_to_offset(rva).ok_or(Error::InvalidRva(rva))?;
        self.read_cstr(offset, max)
    }

    pub fn read_cstr(&self, offset: usize, max: usize) -> Result<Vec<u8>, Error> {
        const CHUNK: usize = 64;

        let limit = max.saturating_add(1);
        let mut out = Vec::new();
        let mut cursor = offset;
        while out.len() < limit {
            let remaining = self.source.len().saturating_sub(cursor);
            if remaining == 0 {
                if out.is_empty() {
                    return Err(Error::OutOfBounds {
                        offset,
                        len: 1,
                        size: self.source.len(),
                    });
                }
                break;
            }
            let mut chunk = vec![0u8; CHUNK.min(remaining).min(limit - out.len())];
            self.source.read_at(cursor, &mut chunk)?;
            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                out.extend_from_slice(&chunk[..nul]);
                return Ok(out);
            }
            cursor += chunk.len();
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

fn read_struct<T>(source: &dyn ImageSource, offset: usize) -> Result<T, Error>
where
    T: for<'b> TryFromCtx<'b, scroll::Endian, Error = scroll::Error> + SizeWith<scroll::Endian>,
{
    let mut buf = vec![0u8; T::size_with(&LE)];
    source.read_at(offset, &mut buf)?;
    Ok(buf.pread_with(0, LE)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PeBuilder;

    #[test]
    fn parses_both_widths() {
        for is_64 in [false, true] {
            let bytes = PeBuilder::new(is_64).section(".text", vec![0xC3; 0x10]).build();
            let pe = PeFile::parse(&bytes, ImageKind::Data).unwrap();
            assert_eq!(pe.is_64(), is_64);
            assert_eq!(pe.sections().len(), 1);
            assert_eq!(pe.sections()[0].raw_name(), b".text");
            assert_eq!(pe.directories().len(), layout::MAX_DATA_DIRECTORIES);
        }
    }

    #[test]
    fn rejects_bad_signatures() {
        let bytes = vec![0u8; 0x200];
        assert!(matches!(
            PeFile::parse(&bytes, ImageKind::Data),
            Err(Error::InvalidDosSignature(0))
        ));

        let bytes = PeBuilder::new(false).corrupt_nt_signature().build();
        assert!(matches!(
            PeFile::parse(&bytes, ImageKind::Data),
            Err(Error::InvalidNtSignature(_))
        ));
    }

    #[test]
    fn truncated_image_is_an_error() {
        let mut bytes = PeBuilder::new(true).build();
        bytes.truncate(0x50);
        assert!(matches!(
            PeFile::parse(&bytes, ImageKind::Data),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn rva_translation_uses_sections_for_data_layout() {
        let bytes = PeBuilder::new(false)
            .section(".text", vec![1; 0x10])
            .section(".data", vec![2; 0x10])
            .build();
        let pe = PeFile::parse(&bytes, ImageKind::Data).unwrap();
        let data = pe.sections()[1];
        assert_eq!(
            pe.rva_to_offset(data.virtual_address + 4),
            Some(data.pointer_to_raw_data as usize + 4)
        );
        assert_eq!(pe.rva_to_offset(0x40), Some(0x40));
        assert_eq!(pe.rva_to_offset(0x00FF_FFFF), None);
    }

    #[test]
    fn cstr_is_bounded() {
        let mut bytes = PeBuilder::new(false).build();
        let at = bytes.len();
        bytes.extend_from_slice(b"hello\0world");
        let pe = PeFile::parse(&bytes, ImageKind::Image).unwrap();
        assert_eq!(pe.read_cstr(at, 1024).unwrap(), b"hello");
        assert_eq!(pe.read_cstr(at + 6, 1024).unwrap(), b"world");
        assert_eq!(pe.read_cstr(at, 3).unwrap(), b"hell");
    }
}
