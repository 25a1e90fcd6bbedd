extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use embedded_io::{ErrorKind, ErrorType, Read, Seek, SeekFrom};

/// Where the album's image paths are resolved.
pub trait ImageStore {
    type File<'a>: Read + Seek
    where
        Self: 'a;
    type Error: embedded_io::Error;

    fn open_image(&self, path: &str) -> Result<Self::File<'_>, Self::Error>;
}

/// Read-only cursor over a byte slice.
pub struct MemoryFile<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> MemoryFile<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl ErrorType for MemoryFile<'_> {
    type Error = ErrorKind;
}

impl Read for MemoryFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let start = usize::try_from(self.pos)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let len = buf.len().min(self.data.len() - start);
        buf[..len].copy_from_slice(&self.data[start..start + len]);
        self.pos += len as u64;
        Ok(len)
    }
}

impl Seek for MemoryFile<'_> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        // Seeking past the end is allowed; reads there return nothing.
        self.pos = target.ok_or(ErrorKind::InvalidInput)?;
        Ok(self.pos)
    }
}

/// Images held in memory, keyed by path.
#[derive(Default)]
pub struct MemoryStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.files.insert(path.into(), data);
    }
}

impl ImageStore for MemoryStore {
    type File<'a> = MemoryFile<'a>;
    type Error = ErrorKind;

    fn open_image(&self, path: &str) -> Result<Self::File<'_>, Self::Error> {
        self.files
            .get(path)
            .map(|data| MemoryFile::new(data))
            .ok_or(ErrorKind::NotFound)
    }
}

/// A host file opened for reading, buffered.
#[cfg(feature = "std")]
pub struct StdFile {
    inner: std::io::BufReader<std::fs::File>,
}

#[cfg(feature = "std")]
impl ErrorType for StdFile {
    type Error = std::io::Error;
}

#[cfg(feature = "std")]
impl Read for StdFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.inner, buf)
    }
}

#[cfg(feature = "std")]
impl Seek for StdFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let pos = match pos {
            SeekFrom::Start(offset) => std::io::SeekFrom::Start(offset),
            SeekFrom::End(offset) => std::io::SeekFrom::End(offset),
            SeekFrom::Current(offset) => std::io::SeekFrom::Current(offset),
        };
        std::io::Seek::seek(&mut self.inner, pos)
    }
}

/// Opens paths on the host filesystem.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdStore;

#[cfg(feature = "std")]
impl ImageStore for StdStore {
    type File<'a> = StdFile;
    type Error = std::io::Error;

    fn open_image(&self, path: &str) -> Result<Self::File<'_>, Self::Error> {
        let file = std::fs::File::open(path)?;
        Ok(StdFile {
            inner: std::io::BufReader::new(file),
        })
    }
}
