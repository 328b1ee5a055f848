//! GCF - Steam game cache file.
//!
//! A GCF stores files in fixed-size data blocks. Each file owns a linked
//! list of *block entries*; each block entry owns a chain of data blocks
//! linked through the *fragmentation map*.
//!
//! ## Layout (all fields u32 LE)
//! ```text
//! Header                 11 fields; MinorVersion (3, 5 or 6) at +0x08,
//!                        BlockSize +0x20, BlockCount +0x24
//! BlockEntryHeader       8 fields; BlockCount first
//! BlockEntries           BlockCount × 7 fields
//! FragmentationMapHeader 4 fields; Terminator at +0x08 (0 => 0xFFFF)
//! FragmentationMap       BlockCount × NextDataBlockIndex
//! BlockEntryMapHeader    5 fields      } minor < 6 only
//! BlockEntryMap          BlockCount × 2 }
//! DirectoryHeader        14 fields; ItemCount +0x0C, NameSize +0x1C,
//!                        Info1Count +0x20, CopyCount +0x24, LocalCount +0x28
//! DirectoryEntries       ItemCount × 7 fields
//! Names                  NameSize bytes
//! Info1 / Info2 / Copy / Local entries (one u32 each)
//! DirectoryMapHeader     2 fields      } minor >= 5 only
//! DirectoryMap           ItemCount × FirstBlockEntryIndex }
//! ChecksumHeader         2 fields; ChecksumSize second, followed by
//!                        ChecksumSize bytes of checksum tables
//! DataBlockHeader        6 fields (5 before minor 5: no LastVersionPlayed)
//! ```
//!
//! ## Block entry
//! ```text
//! EntryFlags, FileDataOffset, FileDataSize, FirstDataBlockIndex,
//! NextBlockEntryIndex, PreviousBlockEntryIndex, DirectoryIndex
//! ```
//!
//! ## Directory entry
//! ```text
//! NameOffset, ItemSize, ChecksumIndex, DirectoryFlags,
//! ParentIndex, NextIndex, FirstIndex
//! ```

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::source::Source;
use crate::utils::{bytesv, le_u32, null_string, to_usize};
use crate::{Error, Result};

/// Directory entry is a file (not a folder).
pub const FLAG_FILE: u32 = 0x0000_4000;
/// File data is encrypted.
pub const FLAG_ENCRYPTED: u32 = 0x0000_0100;

const NO_PARENT: u32 = 0xFFFF_FFFF;
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcfHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub cache_id: u32,
    pub last_version_played: u32,
    pub file_size: u32,
    pub block_size: u32,
    pub block_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcfBlockEntry {
    pub entry_flags: u32,
    pub file_data_offset: u32,
    pub file_data_size: u32,
    pub first_data_block_index: u32,
    pub next_block_entry_index: u32,
    pub previous_block_entry_index: u32,
    pub directory_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcfDirectoryEntry {
    pub name: String,
    pub item_size: u32,
    pub checksum_index: u32,
    pub directory_flags: u32,
    pub parent_index: u32,
    pub next_index: u32,
    pub first_index: u32,
}

impl GcfDirectoryEntry {
    pub fn is_file(&self) -> bool {
        self.directory_flags & FLAG_FILE != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.directory_flags & FLAG_ENCRYPTED != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcfDataBlockHeader {
    pub last_version_played: Option<u32>,
    pub block_count: u32,
    pub block_size: u32,
    pub first_block_offset: u32,
    pub blocks_used: u32,
}

#[derive(Debug)]
pub struct Gcf {
    pub header: GcfHeader,
    pub block_entries: Vec<GcfBlockEntry>,
    /// Next data block index per data block.
    pub fragmentation_map: Vec<u32>,
    /// Data block index that ends a chain.
    pub terminator: u32,
    pub directory: Vec<GcfDirectoryEntry>,
    /// First block entry per directory item; `block_entries.len()` means none.
    pub directory_map: Vec<u32>,
    pub data_block_header: GcfDataBlockHeader,
}

fn u32s<R: Read>(r: &mut R, count: u32) -> Result<Vec<u32>> {
    (0..count).map(|_| le_u32(r)).collect()
}

impl Gcf {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let h = u32s(r, 11)?;
        if h[0] != 1 || h[1] != 1 {
            return Err(Error::BadMagic);
        }
        let header = GcfHeader {
            major_version: h[1],
            minor_version: h[2],
            cache_id: h[3],
            last_version_played: h[4],
            file_size: h[7],
            block_size: h[8],
            block_count: h[9],
        };
        if !matches!(header.minor_version, 3 | 5 | 6) {
            return Err(Error::UnsupportedVersion(header.minor_version));
        }

        let beh = u32s(r, 8)?;
        let block_entry_count = beh[0];
        let mut block_entries = Vec::with_capacity(block_entry_count.min(0x10000) as usize);
        for _ in 0..block_entry_count {
            let e = u32s(r, 7)?;
            block_entries.push(GcfBlockEntry {
                entry_flags: e[0],
                file_data_offset: e[1],
                file_data_size: e[2],
                first_data_block_index: e[3],
                next_block_entry_index: e[4],
                previous_block_entry_index: e[5],
                directory_index: e[6],
            });
        }

        let fmh = u32s(r, 4)?;
        let fragmentation_map = u32s(r, fmh[0])?;
        let terminator = if fmh[2] == 0 { 0xFFFF } else { 0xFFFF_FFFF };

        if header.minor_version < 6 {
            let bemh = u32s(r, 5)?;
            r.seek(SeekFrom::Current(bemh[0] as i64 * 8))?;
        }

        let dh = u32s(r, 14)?;
        let item_count = dh[3];
        let name_size = dh[7];
        let info1_count = dh[8];
        let copy_count = dh[9];
        let local_count = dh[10];

        let mut raw = Vec::with_capacity(item_count.min(0x10000) as usize);
        for _ in 0..item_count {
            raw.push(u32s(r, 7)?);
        }
        let names = bytesv(r, name_size as usize)?;
        let skip = info1_count as i64 + item_count as i64 + copy_count as i64 + local_count as i64;
        r.seek(SeekFrom::Current(skip * 4))?;

        let mut directory = Vec::with_capacity(raw.len());
        for e in raw {
            directory.push(GcfDirectoryEntry {
                name: null_string(&names, e[0] as usize)?,
                item_size: e[1],
                checksum_index: e[2],
                directory_flags: e[3],
                parent_index: e[4],
                next_index: e[5],
                first_index: e[6],
            });
        }

        let directory_map = if header.minor_version >= 5 {
            let _map_header = u32s(r, 2)?;
            u32s(r, item_count)?
        } else {
            first_block_entries(&block_entries, item_count)
        };

        let checksum_header = u32s(r, 2)?;
        r.seek(SeekFrom::Current(checksum_header[1] as i64))?;

        let last_version_played = if header.minor_version >= 5 {
            Some(le_u32(r)?)
        } else {
            None
        };
        let d = u32s(r, 5)?;
        let data_block_header = GcfDataBlockHeader {
            last_version_played,
            block_count: d[0],
            block_size: d[1],
            first_block_offset: d[2],
            blocks_used: d[3],
        };
        if data_block_header.block_size == 0 {
            return Err(Error::Parse("GCF block size is zero"));
        }

        Ok(Self {
            header,
            block_entries,
            fragmentation_map,
            terminator,
            directory,
            directory_map,
            data_block_header,
        })
    }

    /// Slash-separated path of directory item `index`, root excluded.
    pub fn item_path(&self, index: usize) -> Result<String> {
        let mut parts = Vec::new();
        let mut current = index;
        for _ in 0..MAX_DEPTH {
            let entry = self.directory.get(current).ok_or(Error::InvalidRange)?;
            if entry.parent_index == NO_PARENT {
                parts.reverse();
                return Ok(parts.join("/"));
            }
            parts.push(entry.name.as_str());
            current = entry.parent_index as usize;
        }
        Err(Error::Parse("GCF directory nesting too deep"))
    }

    /// Reassemble the data of directory item `index`.
    pub fn item_data<R: Read + Seek>(
        &self,
        source: &Source<R>,
        index: usize,
    ) -> Result<Vec<u8>> {
        let item = self.directory.get(index).ok_or(Error::InvalidRange)?;
        let item_size = to_usize(item.item_size as u64)?;
        let block_size = self.data_block_header.block_size as u64;
        let entry_end = self.block_entries.len() as u32;

        let mut out = Vec::with_capacity(item_size.min(0x100_0000));
        let mut entry_index = self.directory_map.get(index).copied().unwrap_or(entry_end);
        let mut entries_seen = 0;
        while entry_index != entry_end && out.len() < item_size {
            let entry = self
                .block_entries
                .get(entry_index as usize)
                .ok_or(Error::InvalidRange)?;
            entries_seen += 1;
            if entries_seen > self.block_entries.len() {
                return Err(Error::Parse("GCF block entry chain loops"));
            }

            let mut block = entry.first_data_block_index;
            let mut read = 0u64;
            let mut blocks_seen = 0;
            while block < self.terminator && read < entry.file_data_size as u64 {
                blocks_seen += 1;
                if blocks_seen > self.fragmentation_map.len() + 1 {
                    return Err(Error::Parse("GCF fragmentation chain loops"));
                }
                let len = block_size.min(entry.file_data_size as u64 - read);
                let offset =
                    self.data_block_header.first_block_offset as u64 + block as u64 * block_size;
                out.extend_from_slice(&source.read_range(offset, len)?);
                read += len;
                block = match self.fragmentation_map.get(block as usize) {
                    Some(&next) => next,
                    None => break,
                };
            }

            entry_index = entry.next_block_entry_index;
        }

        if out.len() < item_size {
            debug!(index, have = out.len(), want = item_size, "gcf chain ended early");
            return Err(Error::UnexpectedEof);
        }
        out.truncate(item_size);
        Ok(out)
    }
}

/// Map each directory item to its first used block entry, for caches that
/// predate the directory map.
fn first_block_entries(block_entries: &[GcfBlockEntry], item_count: u32) -> Vec<u32> {
    let none = block_entries.len() as u32;
    let mut map = vec![none; item_count as usize];
    for (i, entry) in block_entries.iter().enumerate() {
        if entry.entry_flags == 0 {
            continue;
        }
        if let Some(slot) = map.get_mut(entry.directory_index as usize) {
            if *slot == none {
                *slot = i as u32;
            }
        }
    }
    map
}

/// GCF archive handle.
pub struct GcfArchive<R> {
    source: Source<R>,
    pub gcf: Gcf,
    /// Directory indices of file items.
    files: Vec<usize>,
}

impl<R: Read + Seek> GcfArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let gcf = source.parse_with(Gcf::parse)?;
        let files = gcf
            .directory
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_file())
            .map(|(i, _)| i)
            .collect();
        Ok(Self { source, gcf, files })
    }

    /// Directory entry of file `index`.
    pub fn file(&self, index: usize) -> Option<&GcfDirectoryEntry> {
        self.gcf.directory.get(*self.files.get(index)?)
    }
}

archive_constructors!(GcfArchive);

impl<R: Read + Seek> Extract for GcfArchive<R> {
    fn entry_count(&self) -> usize {
        self.files.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let item = self.files[index];
        if self.gcf.directory[item].is_encrypted() {
            return Err(Error::Encrypted);
        }
        let path = self.gcf.item_path(item)?;
        debug!(index, item, path, "gcf file");
        let data = self.gcf.item_data(&self.source, item)?;
        Ok(ExtractedEntry::new(path, data))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const BLOCK: u32 = 4;

    fn put(out: &mut Vec<u8>, values: &[u32]) {
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Root, folder `maps`, file `maps/a.txt` (6 bytes in blocks 2 -> 0)
    /// and encrypted file `b.bin` (2 bytes in block 1).
    fn sample(minor: u32) -> Vec<u8> {
        let names = b"\0maps\0a.txt\0b.bin\0";
        let mut out = Vec::new();
        put(&mut out, &[1, 1, minor, 220, 3, 0, 0, 0, BLOCK, 3, 0]);

        put(&mut out, &[2, 2, 0, 0, 0, 0, 0, 0]);
        put(&mut out, &[0x8000, 0, 6, 2, 2, 2, 2]);
        put(&mut out, &[0x8000, 0, 2, 1, 2, 2, 3]);

        put(&mut out, &[3, 3, 0, 0]);
        put(&mut out, &[0xFFFF, 0xFFFF, 0]);

        if minor < 6 {
            put(&mut out, &[2, 0, 1, 0, 0]);
            put(&mut out, &[2, 1, 0, 2]);
        }

        put(&mut out, &[4, 220, 3, 4, 2, 0x8000, 0, names.len() as u32, 0, 0, 0, 0, 0, 0]);
        put(&mut out, &[0, 0, 0, 0, NO_PARENT, 0, 1]);
        put(&mut out, &[1, 0, 0, 0, 0, 3, 2]);
        put(&mut out, &[6, 6, 0, FLAG_FILE, 1, 0, 0]);
        put(&mut out, &[12, 2, 0, FLAG_FILE | FLAG_ENCRYPTED, 0, 0, 0]);
        out.extend_from_slice(names);
        put(&mut out, &[0; 4]);

        if minor >= 5 {
            put(&mut out, &[1, 0]);
            put(&mut out, &[2, 2, 0, 1]);
        }

        put(&mut out, &[1, 0]);

        let data_header_len = if minor >= 5 { 24 } else { 20 };
        let first_block = (out.len() + data_header_len) as u32;
        if minor >= 5 {
            put(&mut out, &[3]);
        }
        put(&mut out, &[3, BLOCK, first_block, 3, 0]);
        out.extend_from_slice(b"gh??");
        out.extend_from_slice(b"xy??");
        out.extend_from_slice(b"abcd");
        out
    }

    #[test]
    fn files_follow_block_chains() {
        for minor in [3, 5, 6] {
            let a = GcfArchive::from_bytes(sample(minor), 0).unwrap();
            assert_eq!(a.entry_count(), 2);
            assert_eq!(
                a.read_entry(0).unwrap(),
                ExtractedEntry::new("maps/a.txt", b"abcdgh".to_vec()),
                "minor version {minor}"
            );
        }
    }

    /// `sample(6)` with the u32 at byte `at` replaced.
    fn patched(at: usize, value: u32) -> Vec<u8> {
        let mut data = sample(6);
        data[at..at + 4].copy_from_slice(&value.to_le_bytes());
        data
    }

    // Byte offsets into `sample(6)`.
    const FIRST_ENTRY_SIZE: usize = 84;
    const FIRST_ENTRY_NEXT: usize = 92;
    const BLOCK_TWO_NEXT: usize = 156;

    #[test]
    fn short_chain_is_an_error() {
        let a = GcfArchive::from_bytes(patched(FIRST_ENTRY_SIZE, 4), 0).unwrap();
        assert!(matches!(a.read_entry(0), Err(Error::UnexpectedEof)));

        let dir = tempfile::tempdir().unwrap();
        assert!(!a.extract_entry(0, dir.path()));
        assert!(!dir.path().join("maps/a.txt").exists());
    }

    #[test]
    fn block_entry_past_table_is_an_error() {
        let mut data = patched(FIRST_ENTRY_SIZE, 4);
        data[FIRST_ENTRY_NEXT..FIRST_ENTRY_NEXT + 4].copy_from_slice(&7u32.to_le_bytes());
        let a = GcfArchive::from_bytes(data, 0).unwrap();
        assert!(matches!(a.read_entry(0), Err(Error::InvalidRange)));
    }

    #[test]
    fn looping_block_entry_chain_is_an_error() {
        // An empty entry that points at itself never makes progress.
        let mut data = patched(FIRST_ENTRY_SIZE, 0);
        data[FIRST_ENTRY_NEXT..FIRST_ENTRY_NEXT + 4].copy_from_slice(&0u32.to_le_bytes());
        let a = GcfArchive::from_bytes(data, 0).unwrap();
        assert!(matches!(
            a.read_entry(0),
            Err(Error::Parse("GCF block entry chain loops"))
        ));
    }

    #[test]
    fn looping_fragmentation_chain_is_an_error() {
        let mut data = patched(FIRST_ENTRY_SIZE, 100);
        data[BLOCK_TWO_NEXT..BLOCK_TWO_NEXT + 4].copy_from_slice(&2u32.to_le_bytes());
        let a = GcfArchive::from_bytes(data, 0).unwrap();
        assert!(matches!(
            a.read_entry(0),
            Err(Error::Parse("GCF fragmentation chain loops"))
        ));
    }

    #[test]
    fn encrypted_files_are_rejected() {
        let a = GcfArchive::from_bytes(sample(6), 0).unwrap();
        assert!(a.file(1).unwrap().is_encrypted());
        assert!(matches!(a.read_entry(1), Err(Error::Encrypted)));
    }

    #[test]
    fn old_caches_derive_directory_map() {
        let a = GcfArchive::from_bytes(sample(3), 0).unwrap();
        assert_eq!(a.gcf.directory_map, vec![2, 2, 0, 1]);
        assert_eq!(a.gcf.data_block_header.last_version_played, None);
    }
}
