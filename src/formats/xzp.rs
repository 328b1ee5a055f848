//! XZP - Xbox Zip package (Half-Life 2 for Xbox).
//!
//! ## Layout
//! ```text
//! [0x00] Magic "piZx"              (4 bytes)
//! [0x04] Version                   (u32 LE, 6)
//! [0x08] PreloadDirectoryEntryCount (u32 LE)
//! [0x0C] DirectoryEntryCount       (u32 LE)
//! [0x10] PreloadBytes              (u32 LE)
//! [0x14] HeaderLength              (u32 LE)
//! [0x18] DirectoryItemCount        (u32 LE)
//! [0x1C] DirectoryItemOffset       (u32 LE)
//! [0x20] DirectoryItemLength       (u32 LE)
//! [0x24] DirectoryEntries          (DirectoryEntryCount × 0x0C)
//!        PreloadDirectoryEntries   (PreloadDirectoryEntryCount × 0x0C)
//!        PreloadDirectoryMappings  (DirectoryEntryCount × u16, only with preload)
//! [DirectoryItemOffset] DirectoryItems (DirectoryItemCount × 0x0C)
//! [end - 8] Footer: FileLength (u32 LE), Magic "tFzX"
//! ```
//!
//! Entries carry only the CRC of their name; the name itself lives in the
//! directory item with the same CRC.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::source::Source;
use crate::utils::{le_u16, le_u32, magic, read_null_string};
use crate::{Error, Result};

const VERSION: u32 = 6;

#[derive(Debug)]
pub struct Xzp {
    pub preload_bytes: u32,
    pub entries: Vec<XzpDirectoryEntry>,
    pub preload_entries: Vec<XzpDirectoryEntry>,
    /// Index into `preload_entries` per entry; `0xFFFF` means none.
    pub preload_mappings: Vec<u16>,
    pub items: Vec<XzpDirectoryItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XzpDirectoryEntry {
    pub file_name_crc: u32,
    pub entry_length: u32,
    pub entry_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XzpDirectoryItem {
    pub file_name_crc: u32,
    pub name: String,
    pub time_created: u32,
}

fn entry<R: Read>(r: &mut R) -> Result<XzpDirectoryEntry> {
    Ok(XzpDirectoryEntry {
        file_name_crc: le_u32(r)?,
        entry_length: le_u32(r)?,
        entry_offset: le_u32(r)?,
    })
}

impl Xzp {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        magic(r, b"piZx")?;
        let version = le_u32(r)?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let preload_entry_count = le_u32(r)?;
        let entry_count = le_u32(r)?;
        let preload_bytes = le_u32(r)?;
        let _header_length = le_u32(r)?;
        let item_count = le_u32(r)?;
        let item_offset = le_u32(r)?;
        let _item_length = le_u32(r)?;

        let entries = (0..entry_count)
            .map(|_| entry(r))
            .collect::<Result<Vec<_>>>()?;
        let preload_entries = (0..preload_entry_count)
            .map(|_| entry(r))
            .collect::<Result<Vec<_>>>()?;
        let preload_mappings = if preload_entry_count > 0 {
            (0..entry_count)
                .map(|_| le_u16(r))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let mut raw_items = Vec::with_capacity(item_count.min(0x10000) as usize);
        r.seek(SeekFrom::Start(base + item_offset as u64))?;
        for _ in 0..item_count {
            raw_items.push((le_u32(r)?, le_u32(r)?, le_u32(r)?));
        }
        let mut items = Vec::with_capacity(raw_items.len());
        for (file_name_crc, name_offset, time_created) in raw_items {
            r.seek(SeekFrom::Start(base + name_offset as u64))?;
            items.push(XzpDirectoryItem {
                file_name_crc,
                name: read_null_string(r)?,
                time_created,
            });
        }

        Ok(Self {
            preload_bytes,
            entries,
            preload_entries,
            preload_mappings,
            items,
        })
    }
}

/// XZP archive handle.
pub struct XzpArchive<R> {
    source: Source<R>,
    pub xzp: Xzp,
    names: HashMap<u32, usize>,
}

impl<R: Read + Seek> XzpArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let xzp = source.parse_with(Xzp::parse)?;
        let mut names = HashMap::with_capacity(xzp.items.len());
        for (i, item) in xzp.items.iter().enumerate() {
            names.entry(item.file_name_crc).or_insert(i);
        }
        Ok(Self { source, xzp, names })
    }

    /// Name of entry `index`, if a directory item carries its CRC.
    pub fn entry_name(&self, index: usize) -> Option<&str> {
        let entry = self.xzp.entries.get(index)?;
        let item = self.names.get(&entry.file_name_crc)?;
        Some(&self.xzp.items[*item].name)
    }
}

archive_constructors!(XzpArchive);

impl<R: Read + Seek> Extract for XzpArchive<R> {
    fn entry_count(&self) -> usize {
        self.xzp.entries.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let entry = &self.xzp.entries[index];
        let name = self
            .entry_name(index)
            .ok_or(Error::Parse("XZP entry has no directory item"))?;
        debug!(index, name, offset = entry.entry_offset, "xzp entry");
        let data = self
            .source
            .read_range(entry.entry_offset as u64, entry.entry_length as u64)?;
        Ok(ExtractedEntry::new(name, data))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Two entries; only the first has a directory item.
    fn sample() -> Vec<u8> {
        let mut out = b"piZx".to_vec();
        for v in [6u32, 0, 2, 0, 0x24, 1, 0x3C, 0x0C] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        // 0x24: entries
        for v in [0xAAAA_0001u32, 3, 0x50, 0xBBBB_0002, 2, 0x53] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        // 0x3C: item
        for v in [0xAAAA_0001u32, 0x48, 0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        // 0x48: name
        out.extend_from_slice(b"cfg.txt\0");
        // 0x50: data
        out.extend_from_slice(b"abcde");
        out.extend_from_slice(&(out.len() as u32 + 8).to_le_bytes());
        out.extend_from_slice(b"tFzX");
        out
    }

    #[test]
    fn names_resolve_by_crc() {
        let a = XzpArchive::from_bytes(sample(), 0).unwrap();
        assert_eq!(a.entry_count(), 2);
        assert_eq!(a.entry_name(0), Some("cfg.txt"));
        assert_eq!(
            a.read_entry(0).unwrap(),
            ExtractedEntry::new("cfg.txt", b"abc".to_vec())
        );
    }

    #[test]
    fn entry_without_item_fails() {
        let a = XzpArchive::from_bytes(sample(), 0).unwrap();
        assert_eq!(a.entry_name(1), None);
        assert!(a.read_entry(1).is_err());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut data = sample();
        data[4] = 5;
        assert!(matches!(
            XzpArchive::from_bytes(data, 0),
            Err(Error::UnsupportedVersion(5))
        ));
    }
}
