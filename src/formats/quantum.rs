//! Quantum `.Q` - standalone archive produced by the DOS Quantum packer.
//!
//! ## Header
//! ```text
//! [0x00] Magic "DS"                (2 bytes)
//! [0x02] MajorVersion              (u8)
//! [0x03] MinorVersion              (u8)
//! [0x04] FileCount                 (u16 LE)
//! [0x06] TableSize                 (u8, window bits)
//! [0x07] CompressionFlags          (u8)
//! ```
//!
//! ## File record
//! ```text
//! NameLength    (u8, or u16 BE with the top bit set when the first byte >= 0x80)
//! Name          (NameLength bytes)
//! CommentLength (same encoding)
//! Comment       (CommentLength bytes)
//! ExpandedSize  (u32 LE)
//! Time          (u16 LE)
//! Date          (u16 LE)
//! ```
//!
//! All files are compressed as one stream that follows the last record.
//! A file's bytes are the `[position, position + size)` slice of the
//! expanded stream, where `position` is the sum of the sizes before it.

use std::io::{Read, Seek};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::source::Source;
use crate::utils::{bytesv, le_u16, le_u32, magic, u8};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub file_count: u16,
    pub table_size: u8,
    pub compression_flags: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantumFile {
    pub name: String,
    pub comment: String,
    pub size: u32,
    pub time: u16,
    pub date: u16,
}

#[derive(Debug)]
pub struct Quantum {
    pub header: QuantumHeader,
    pub files: Vec<QuantumFile>,
    /// Start of the compressed stream.
    pub data_offset: u64,
}

fn var_string<R: Read>(r: &mut R) -> Result<String> {
    let first = u8(r)?;
    let len = if first & 0x80 != 0 {
        (((first & 0x7F) as usize) << 8) | u8(r)? as usize
    } else {
        first as usize
    };
    let bytes = bytesv(r, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl Quantum {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        magic(r, b"DS")?;
        let header = QuantumHeader {
            major_version: u8(r)?,
            minor_version: u8(r)?,
            file_count: le_u16(r)?,
            table_size: u8(r)?,
            compression_flags: u8(r)?,
        };

        let mut files = Vec::with_capacity(header.file_count as usize);
        for _ in 0..header.file_count {
            files.push(QuantumFile {
                name: var_string(r)?,
                comment: var_string(r)?,
                size: le_u32(r)?,
                time: le_u16(r)?,
                date: le_u16(r)?,
            });
        }

        Ok(Self {
            header,
            files,
            data_offset: r.stream_position()? - base,
        })
    }

    /// Position of file `index` in the expanded stream.
    pub fn position(&self, index: usize) -> u64 {
        self.files[..index].iter().map(|f| f.size as u64).sum()
    }

    /// Size of the whole expanded stream.
    pub fn expanded_size(&self) -> u64 {
        self.position(self.files.len())
    }
}

/// `.Q` archive handle.
///
/// The directory is fully readable, but file extraction is not supported:
/// every entry fails with [`Error::Unsupported`] once its compressed data
/// has been read.
pub struct QuantumArchive<R> {
    source: Source<R>,
    pub quantum: Quantum,
}

impl<R: Read + Seek> QuantumArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let quantum = source.parse_with(Quantum::parse)?;
        Ok(Self { source, quantum })
    }

    /// Raw compressed stream.
    pub fn compressed_data(&self) -> Result<Vec<u8>> {
        let start = self.quantum.data_offset;
        let len = self
            .source
            .end_of_file()
            .checked_sub(start)
            .ok_or(Error::InvalidRange)?;
        self.source.read_range(start, len)
    }
}

archive_constructors!(QuantumArchive);

impl<R: Read + Seek> Extract for QuantumArchive<R> {
    fn entry_count(&self) -> usize {
        self.quantum.files.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let file = &self.quantum.files[index];
        let position = self.quantum.position(index);
        let compressed = self.compressed_data()?;
        debug!(
            index,
            name = %file.name,
            position,
            size = file.size,
            compressed = compressed.len(),
            window_bits = self.quantum.header.table_size,
            "quantum entry"
        );
        Err(Error::Unsupported("quantum archive extraction"))
    }
}
