//! Bounded, positioned access to the bytes of one opened archive.
//!
//! Every extractor reads through a [`Source`]. The wrapped reader sits
//! behind a mutex, so one handle can be shared between threads; reads are
//! positioned (seek, then read) and therefore never depend on a previous
//! cursor position.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::utils::to_usize;
use crate::{Error, Result};

/// A seekable byte source with a fixed origin and length.
#[derive(Debug)]
pub struct Source<R> {
    inner: Mutex<R>,
    /// Absolute stream position that archive offsets are relative to.
    base: u64,
    /// Bytes available from `base` to the end of the stream.
    len: u64,
}

impl<R: Read + Seek> Source<R> {
    /// Wrap `reader`, treating its current position as offset zero.
    ///
    /// Returns [`Error::EmptySource`] if nothing follows that position.
    pub fn new(mut reader: R) -> Result<Self> {
        let base = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(base))?;
        let len = end.saturating_sub(base);
        if len == 0 {
            return Err(Error::EmptySource);
        }
        Ok(Self {
            inner: Mutex::new(reader),
            base,
            len,
        })
    }

    /// Total number of bytes in the archive.
    pub fn end_of_file(&self) -> u64 {
        self.len
    }

    /// Read `length` bytes starting at archive offset `offset`.
    ///
    /// Returns [`Error::InvalidRange`] when the range does not lie entirely
    /// inside the archive; nothing is read in that case.
    pub fn read_bytes(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(length as u64)
            .ok_or(Error::InvalidRange)?;
        if end > self.len {
            return Err(Error::InvalidRange);
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.seek(SeekFrom::Start(self.base + offset))?;
        let mut buf = vec![0u8; length];
        inner.read_exact(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(e),
        })?;
        Ok(buf)
    }

    /// Read `length` bytes at `offset`, with both given as on-disk `u64`s.
    pub(crate) fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.read_bytes(offset, to_usize(length)?)
    }

    /// Run a model parser against the underlying reader, positioned at the
    /// archive origin.
    pub(crate) fn parse_with<T>(&self, f: impl FnOnce(&mut R) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.seek(SeekFrom::Start(self.base))?;
        f(&mut *inner)
    }

    /// Consume the source, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Source<Cursor<Vec<u8>>> {
    /// Build a source over an in-memory buffer whose archive starts at
    /// `offset`.
    pub fn from_bytes(data: Vec<u8>, offset: usize) -> Result<Self> {
        if offset > data.len() {
            return Err(Error::InvalidRange);
        }
        let mut cursor = Cursor::new(data);
        cursor.set_position(offset as u64);
        Self::new(cursor)
    }
}

impl Source<BufReader<File>> {
    /// Open a file on disk as a source.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}
