//! Random-access byte sources.
//!
//! Directory bytes and bulk payloads are fetched lazily, only when the
//! engine reaches them. Reads are plain blocking calls; a failed read is
//! returned to the engine, which turns it into an error or, for preview
//! payloads, a warning.

use crate::error::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A random-access source of bytes.
pub trait Source {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Returns true if the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn slice_at(data: &[u8], offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let start = usize::try_from(offset).map_err(|_| eof(offset, len))?;
    let end = start.checked_add(len).ok_or_else(|| eof(offset, len))?;
    data.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| eof(offset, len))
}

fn eof(offset: u64, len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at offset {} past end of source", len, offset),
    )
}

impl Source for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        slice_at(self, offset, len)
    }
}

impl Source for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        slice_at(self, offset, len)
    }
}

impl Source for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        slice_at(self, offset, len)
    }
}

/// A file read on demand through a shared handle.
///
/// The handle sits behind a mutex so reads work through `&self`; every read
/// seeks, so interleaved callers never observe each other's position.
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    /// Open the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be opened or its length
    /// cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file)
    }

    /// Wrap an already open file.
    pub fn new(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file: Mutex::new(file), len })
    }
}

impl Source for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        if offset.checked_add(len as u64).map_or(true, |end| end > self.len) {
            return Err(eof(offset, len));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
