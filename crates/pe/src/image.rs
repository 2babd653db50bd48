use crate::{Error, layout};
use memmap2::Mmap;
use memory::Process;
use scroll::{LE, Pread};
use std::{fs::File, path::Path};

/// How the bytes of an image are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Raw file layout: RVAs have to be translated through the section
    /// table.
    Data,
    /// Loader layout as found in a process: an RVA is an offset.
    Image,
}

/// Byte-addressable backing of a PE image.
pub trait ImageSource: Send + Sync {
    fn len(&self) -> usize;

    /// Fill `buf` from `offset`. Errors when the range is not fully inside
    /// the image.
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), Error>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), Error> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfBounds { offset, len, size }),
    }
}

impl ImageSource for Vec<u8> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), Error> {
        check_bounds(offset, buf.len(), self.as_slice().len())?;
        buf.copy_from_slice(&self[offset..offset + buf.len()]);
        Ok(())
    }
}

/// A file on disk, memory mapped read-only.
#[derive(Debug)]
pub struct FileImage {
    // `None` for empty files, which cannot be mapped.
    map: Option<Mmap>,
}

impl FileImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let open_err = |source| Error::Open {
            path: path.to_owned(),
            source,
        };

        let file = File::open(path).map_err(open_err)?;
        let size = file.metadata().map_err(open_err)?.len();
        if size == 0 {
            return Ok(Self { map: None });
        }

        // SAFETY: the mapping is read-only and only lives as long as this
        // scan. Another process truncating the file underneath us is the
        // usual memmap2 caveat and accepted for a dump tool.
        #[allow(unsafe_code)]
        let map = unsafe { Mmap::map(&file) }.map_err(open_err)?;
        Ok(Self { map: Some(map) })
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or_default()
    }
}

impl ImageSource for FileImage {
    fn len(&self) -> usize {
        self.bytes().len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), Error> {
        let bytes = self.bytes();
        check_bounds(offset, buf.len(), bytes.len())?;
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
        Ok(())
    }
}

/// An image mapped into another process, read through guarded accesses.
pub struct ProcessImage<'a, P: Process + ?Sized> {
    process: &'a P,
    base: usize,
    size: usize,
}

impl<'a, P: Process + ?Sized> ProcessImage<'a, P> {
    pub fn new(process: &'a P, base: usize, size: usize) -> Self {
        Self { process, base, size }
    }

    /// Size the image from the `SizeOfImage` field of the headers at `base`.
    /// Only the DOS and NT signatures are checked here.
    pub fn probe(process: &'a P, base: usize) -> Result<Self, Error> {
        let mut dos = [0u8; layout::DOS_HEADER_SIZE];
        memory::read(process, base, &mut dos)?;
        let dos: layout::DosHeader = dos[..].pread_with(0, LE)?;
        if dos.e_magic != layout::DOS_SIGNATURE {
            return Err(Error::InvalidDosSignature(dos.e_magic));
        }

        let nt = base
            .checked_add(dos.e_lfanew as usize)
            .ok_or(Error::InvalidRva(dos.e_lfanew))?;
        let mut signature = [0u8; 4];
        memory::read(process, nt, &mut signature)?;
        let signature = u32::from_le_bytes(signature);
        if signature != layout::NT_SIGNATURE {
            return Err(Error::InvalidNtSignature(signature));
        }

        let size_of_image_at = nt + 4 + layout::FILE_HEADER_SIZE + layout::SIZE_OF_IMAGE_OFFSET;
        let mut size = [0u8; 4];
        memory::read(process, size_of_image_at, &mut size)?;
        Ok(Self::new(process, base, u32::from_le_bytes(size) as usize))
    }

    pub fn base(&self) -> usize {
        self.base
    }
}

impl<P: Process + ?Sized> ImageSource for ProcessImage<'_, P> {
    fn len(&self) -> usize {
        self.size
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), Error> {
        check_bounds(offset, buf.len(), self.size)?;
        memory::read(self.process, self.base + offset, buf)?;
        Ok(())
    }
}
