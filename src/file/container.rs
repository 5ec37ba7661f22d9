use std::io::{self, Read, Seek, SeekFrom};

use log::debug;
use memmap2::{Mmap, MmapAsRawDesc};

use crate::Result;

use super::{DexImage, DexLocation, VerifyPreset};

/// Anything that holds the raw bytes of a dex file.
pub trait DexContainer: AsRef<[u8]> {
    fn data(&self) -> &[u8] {
        self.as_ref()
    }

    fn file_size(&self) -> usize {
        self.data().len()
    }
}

impl DexContainer for Mmap {}

impl DexContainer for Vec<u8> {}

impl DexContainer for &[u8] {}

/// A seekable source of bytes, like an open file or an in-memory buffer.
///
/// All offsets in a dex file are absolute, so sources must support seeking
/// from the start.
pub trait ByteSource {
    /// Reads up to `max_bytes`. An empty result means end of input.
    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>>;

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Reads the whole source from the start.
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let size = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(0))?;
        let mut data = Vec::with_capacity(size as usize);
        loop {
            let chunk = self.read(READ_CHUNK_SIZE)?;
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// In-memory buffer as a [`ByteSource`].
#[derive(Debug, Clone)]
pub struct MemorySource<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for MemorySource<'_> {
    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let start = (self.pos as usize).min(self.data.len());
        let end = start.saturating_add(max_bytes).min(self.data.len());
        self.pos = end as u64;
        Ok(self.data[start..end].to_vec())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

/// Adapts any `Read + Seek` value, e.g. a [`std::fs::File`].
#[derive(Debug)]
pub struct StreamSource<R: Read + Seek>(R);

impl<R: Read + Seek> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Read + Seek> ByteSource for StreamSource<R> {
    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.0.by_ref().take(max_bytes as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

/// A memory mapped dex file.
pub struct DexFileContainer {
    mmap: Mmap,
    location: String,
    pub verify: VerifyPreset,
}

impl DexFileContainer {
    pub fn new<T>(file: T) -> Result<Self>
    where
        T: MmapAsRawDesc,
    {
        // the mapped file must not be changed while it is mapped
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self {
            mmap,
            verify: VerifyPreset::None,
            location: "[anonymous]".to_string(),
        })
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn verify(mut self, preset: VerifyPreset) -> Self {
        self.verify = preset;
        self
    }

    pub fn open(&self) -> Result<DexImage> {
        debug!(
            "opening {} ({} bytes, verify: {:?})",
            self.location,
            self.mmap.len(),
            self.verify
        );
        DexImage::from_container(
            &self.mmap,
            DexLocation::Path(self.location.clone()),
            self.verify,
        )
    }

    pub fn get_location(&self) -> &str {
        &self.location
    }

    pub fn data(&self) -> &Mmap {
        &self.mmap
    }
}
