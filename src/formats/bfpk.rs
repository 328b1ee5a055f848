//! BFPK - flat archive with optional per-file zlib compression.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "BFPK"              (4 bytes)
//! [0x04] Version                   (i32 LE)
//! [0x08] FileCount                 (i32 LE)
//! [0x0C] FileTable                 (FileCount records)
//! ```
//!
//! ## File record
//! ```text
//! [0x00] NameSize                  (i32 LE)
//! [0x04] Name                      (NameSize bytes, no terminator)
//! [....] UncompressedSize          (i32 LE)
//! [....] Offset                    (i32 LE)
//! ```
//!
//! ## Payload
//! Most payloads start with a 4-byte compressed size prefix:
//! ```text
//! [Offset + 0] CompressedSize      (i32 LE)
//! [Offset + 4] Data                (CompressedSize bytes)
//! ```
//! Some archives omit the prefix. When the prefix value is larger than the
//! whole archive it cannot be a size, and the entry is read as
//! `UncompressedSize` bytes straight from `Offset`.

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::compression::inflate_zlib;
use crate::source::Source;
use crate::utils::{bytesv, le_i32, le_u32, magic, to_usize};
use crate::{Error, Result};

/// Names longer than this are treated as corrupt.
const MAX_NAME_SIZE: i32 = 0x1000;

/// Parsed BFPK directory.
#[derive(Debug)]
pub struct Bfpk {
    pub version: i32,
    /// All file entries in declaration order.
    pub files: Vec<BfpkFile>,
}

/// Metadata for a single file inside a BFPK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfpkFile {
    /// Stored name; may be empty.
    pub name: String,
    /// Offset of the size prefix (or of the data, when there is none).
    pub offset: u64,
    pub uncompressed_size: u64,
    /// Value of the 4-byte prefix at `offset`, if it lies inside the file.
    pub compressed_size: Option<u64>,
}

impl BfpkFile {
    /// Byte range of the stored payload in an archive of `end_of_file`
    /// bytes.
    pub fn data_range(&self, end_of_file: u64) -> (u64, u64) {
        match self.compressed_size {
            Some(size) if size <= end_of_file => (self.offset + 4, size),
            _ => (self.offset, self.uncompressed_size),
        }
    }
}

impl Bfpk {
    /// Parse a BFPK archive from `r`.
    ///
    /// The reader must be positioned at the magic.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        let end = r.seek(SeekFrom::End(0))? - base;
        r.seek(SeekFrom::Start(base))?;

        magic(r, b"BFPK")?;
        let version = le_i32(r)?;
        let file_count = le_i32(r)?;
        if file_count < 0 {
            return Err(Error::Parse("negative BFPK file count"));
        }

        let mut files = Vec::with_capacity(file_count.min(0x10000) as usize);
        for _ in 0..file_count {
            let name_size = le_i32(r)?;
            if !(0..=MAX_NAME_SIZE).contains(&name_size) {
                return Err(Error::Parse("bad BFPK name size"));
            }
            let name = bytesv(r, name_size as usize)?;
            let name = String::from_utf8_lossy(&name).into_owned();
            let uncompressed_size = le_u32(r)? as u64;
            let offset = le_u32(r)? as u64;
            files.push(BfpkFile {
                name,
                offset,
                uncompressed_size,
                compressed_size: None,
            });
        }

        // Size prefixes live next to the payloads, not in the table.
        for file in &mut files {
            if file.offset + 4 <= end {
                r.seek(SeekFrom::Start(base + file.offset))?;
                file.compressed_size = Some(le_u32(r)? as u64);
            }
        }

        Ok(Self { version, files })
    }
}

/// BFPK archive handle.
pub struct BfpkArchive<R> {
    source: Source<R>,
    /// Parsed directory.
    pub bfpk: Bfpk,
}

impl<R: Read + Seek> BfpkArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let bfpk = source.parse_with(Bfpk::parse)?;
        Ok(Self { source, bfpk })
    }

    /// Iterate over all file entries.
    pub fn files(&self) -> impl Iterator<Item = &BfpkFile> {
        self.bfpk.files.iter()
    }

    /// Output name of entry `index`.
    pub fn file_name(&self, index: usize) -> Option<String> {
        let file = self.bfpk.files.get(index)?;
        Some(if file.name.is_empty() {
            format!("file{index}")
        } else {
            file.name.clone()
        })
    }

    /// Consume the archive, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }
}

archive_constructors!(BfpkArchive);

impl<R: Read + Seek> Extract for BfpkArchive<R> {
    fn entry_count(&self) -> usize {
        self.bfpk.files.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let file = &self.bfpk.files[index];
        let (offset, size) = file.data_range(self.source.end_of_file());
        debug!(index, offset, size, "bfpk entry");

        let raw = self.source.read_range(offset, size)?;
        let data = if size == file.uncompressed_size {
            raw
        } else {
            inflate_zlib(&raw, to_usize(file.uncompressed_size)?)?
        };

        let path = self.file_name(index).unwrap_or_default();
        Ok(ExtractedEntry::new(path, data))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn file(offset: u64, compressed: Option<u64>, uncompressed: u64) -> BfpkFile {
        BfpkFile {
            name: String::new(),
            offset,
            uncompressed_size: uncompressed,
            compressed_size: compressed,
        }
    }

    #[test]
    fn prefixed_entry_skips_length() {
        assert_eq!(file(0, Some(10), 10).data_range(14), (4, 10));
    }

    #[test]
    fn oversized_prefix_falls_back_to_raw_addressing() {
        assert_eq!(file(0, Some(15), 10).data_range(14), (0, 10));
        assert_eq!(file(20, None, 3).data_range(14), (20, 3));
    }

    fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut table = Vec::new();
        let table_len: usize = entries.iter().map(|(n, _)| 12 + n.len()).sum();
        let mut data_offset = 12 + table_len;
        let mut payload = Vec::new();
        for (name, data) in entries {
            table.extend_from_slice(&(name.len() as i32).to_le_bytes());
            table.extend_from_slice(name.as_bytes());
            table.extend_from_slice(&(data.len() as i32).to_le_bytes());
            table.extend_from_slice(&(data_offset as i32).to_le_bytes());
            payload.extend_from_slice(&(data.len() as i32).to_le_bytes());
            payload.extend_from_slice(data);
            data_offset += 4 + data.len();
        }
        let mut out = b"BFPK".to_vec();
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&(entries.len() as i32).to_le_bytes());
        out.extend(table);
        out.extend(payload);
        out
    }

    #[test]
    fn parse_reads_prefixes() {
        let data = archive(&[("a.txt", &b"hello"[..]), ("", &b"xy"[..])]);
        let a = BfpkArchive::from_bytes(data, 0).unwrap();
        assert_eq!(a.bfpk.files.len(), 2);
        assert_eq!(a.bfpk.files[0].compressed_size, Some(5));
        assert_eq!(a.file_name(1).unwrap(), "file1");
    }

    #[test]
    fn equal_sizes_copy_verbatim() {
        let a = BfpkArchive::from_bytes(archive(&[("a.txt", &b"hello"[..])]), 0).unwrap();
        let e = a.read_entry(0).unwrap();
        assert_eq!(e, ExtractedEntry::new("a.txt", b"hello".to_vec()));
    }

    #[test]
    fn bad_magic_is_rejected() {
        assert!(matches!(
            BfpkArchive::from_bytes(b"BFPQ\0\0\0\0\0\0\0\0".to_vec(), 0),
            Err(Error::BadMagic)
        ));
    }
}
