//! VPK - Valve package (versions 1 and 2).
//!
//! A VPK set is a `*_dir.vpk` directory file plus numbered volumes
//! `*_000.vpk`, `*_001.vpk`, … holding the bulk data.
//!
//! ## Header
//! ```text
//! [0x00] Signature 0x55AA1234      (u32 LE)
//! [0x04] Version                   (u32 LE, 1 or 2)
//! [0x08] TreeSize                  (u32 LE)
//! v2 only:
//! [0x0C] FileDataSectionSize       (u32 LE)
//! [0x10] ArchiveMd5SectionSize     (u32 LE)
//! [0x14] OtherMd5SectionSize       (u32 LE)
//! [0x18] SignatureSectionSize      (u32 LE)
//! ```
//!
//! ## Tree
//! Three nested lists of null-terminated strings, each list ended by an
//! empty string: extension, then path, then file name. Every file name is
//! followed by
//! ```text
//! [0x00] Crc                       (u32 LE)
//! [0x04] PreloadBytes              (u16 LE)
//! [0x06] ArchiveIndex              (u16 LE, 0x7FFF = directory file)
//! [0x08] EntryOffset               (u32 LE)
//! [0x0C] EntryLength               (u32 LE)
//! [0x10] Terminator 0xFFFF         (u16 LE)
//! [0x12] PreloadData               (PreloadBytes bytes)
//! ```
//!
//! A single space stands for an empty extension or path.
//!
//! An entry's payload is its preload data followed by `EntryLength` bytes
//! from the archive volume. With the `0x7FFF` index those bytes sit in the
//! directory file, `EntryOffset` bytes past the end of the tree.

use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::source::Source;
use crate::utils::{bytesv, le_u16, le_u32, read_null_string};
use crate::{Error, Result};

pub const SIGNATURE: u32 = 0x55AA_1234;
/// Archive index meaning "stored in the directory file".
pub const NO_ARCHIVE: u16 = 0x7FFF;
const TERMINATOR: u16 = 0xFFFF;

#[derive(Debug)]
pub struct Vpk {
    pub version: u32,
    pub tree_size: u32,
    /// Size of the version-specific header.
    pub header_length: u32,
    pub items: Vec<VpkDirectoryItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpkDirectoryItem {
    pub extension: String,
    pub path: String,
    pub name: String,
    pub crc: u32,
    pub archive_index: u16,
    pub entry_offset: u32,
    pub entry_length: u32,
    pub preload_data: Vec<u8>,
}

impl VpkDirectoryItem {
    /// Output path: `{path}/{name}.{extension}`.
    pub fn full_path(&self) -> String {
        let mut out = String::new();
        if !self.path.trim().is_empty() {
            out.push_str(&self.path);
            out.push('/');
        }
        out.push_str(&self.name);
        if !self.extension.trim().is_empty() {
            out.push('.');
            out.push_str(&self.extension);
        }
        out
    }
}

impl Vpk {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        if le_u32(r)? != SIGNATURE {
            return Err(Error::BadMagic);
        }
        let version = le_u32(r)?;
        let tree_size = le_u32(r)?;
        let header_length = match version {
            1 => 12,
            2 => {
                for _ in 0..4 {
                    le_u32(r)?;
                }
                28
            }
            v => return Err(Error::UnsupportedVersion(v)),
        };

        let mut items = Vec::new();
        loop {
            let extension = read_null_string(r)?;
            if extension.is_empty() {
                break;
            }
            loop {
                let path = read_null_string(r)?;
                if path.is_empty() {
                    break;
                }
                loop {
                    let name = read_null_string(r)?;
                    if name.is_empty() {
                        break;
                    }
                    let crc = le_u32(r)?;
                    let preload_bytes = le_u16(r)?;
                    let archive_index = le_u16(r)?;
                    let entry_offset = le_u32(r)?;
                    let entry_length = le_u32(r)?;
                    if le_u16(r)? != TERMINATOR {
                        return Err(Error::Parse("VPK entry terminator missing"));
                    }
                    let preload_data = bytesv(r, preload_bytes as usize)?;
                    items.push(VpkDirectoryItem {
                        extension: extension.clone(),
                        path: path.clone(),
                        name,
                        crc,
                        archive_index,
                        entry_offset,
                        entry_length,
                        preload_data,
                    });
                }
            }
        }

        Ok(Self {
            version,
            tree_size,
            header_length,
            items,
        })
    }

    /// Offset of in-directory payloads.
    pub fn data_offset(&self) -> u64 {
        self.header_length as u64 + self.tree_size as u64
    }
}

/// Where the numbered archive volumes live.
#[derive(Debug, Clone)]
enum Volumes {
    None,
    /// `{dir}/{stem}_{index:03}.vpk`
    Derived { dir: PathBuf, stem: String },
    Explicit(Vec<PathBuf>),
}

/// VPK archive handle.
pub struct VpkArchive<R> {
    source: Source<R>,
    pub vpk: Vpk,
    volumes: Volumes,
}

impl<R: Read + Seek> VpkArchive<R> {
    /// Parse a directory file with no archive volumes attached.
    ///
    /// Entries stored in numbered volumes fail to extract; use
    /// [`VpkArchive::with_archives`] or [`VpkArchive::open`] for those.
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let vpk = source.parse_with(Vpk::parse)?;
        Ok(Self {
            source,
            vpk,
            volumes: Volumes::None,
        })
    }

    /// Parse a directory file whose volume `i` is `archives[i]`.
    pub fn with_archives(reader: R, archives: Vec<PathBuf>) -> Result<Self> {
        let mut archive = Self::new(reader)?;
        archive.volumes = Volumes::Explicit(archives);
        Ok(archive)
    }

    pub fn items(&self) -> impl Iterator<Item = &VpkDirectoryItem> {
        self.vpk.items.iter()
    }

    /// Path of archive volume `index`, if known.
    pub fn volume_path(&self, index: u16) -> Option<PathBuf> {
        match &self.volumes {
            Volumes::None => None,
            Volumes::Derived { dir, stem } => Some(dir.join(format!("{stem}_{index:03}.vpk"))),
            Volumes::Explicit(paths) => paths.get(index as usize).cloned(),
        }
    }

    fn read_volume(&self, index: u16, offset: u64, length: u64) -> Result<Vec<u8>> {
        let path = self
            .volume_path(index)
            .ok_or_else(|| Error::MissingVolume(PathBuf::from(format!("#{index}"))))?;
        let volume = Source::open(&path).map_err(|e| match e {
            Error::Io(err) if err.kind() == io::ErrorKind::NotFound => Error::MissingVolume(path),
            e => e,
        })?;
        volume.read_range(offset, length)
    }
}

archive_constructors!(VpkArchive, no_open);

impl VpkArchive<io::BufReader<std::fs::File>> {
    /// Open a `*_dir.vpk`; volumes are looked up next to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut archive = Self::from_source(Source::open(path)?)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = stem.strip_suffix("_dir").unwrap_or(&stem).to_owned();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        archive.volumes = Volumes::Derived { dir, stem };
        Ok(archive)
    }
}

impl<R: Read + Seek> Extract for VpkArchive<R> {
    fn entry_count(&self) -> usize {
        self.vpk.items.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let item = &self.vpk.items[index];
        debug!(
            index,
            archive = item.archive_index,
            offset = item.entry_offset,
            length = item.entry_length,
            preload = item.preload_data.len(),
            "vpk entry"
        );

        let mut data = item.preload_data.clone();
        if item.entry_length > 0 {
            let rest = if item.archive_index == NO_ARCHIVE {
                self.source.read_range(
                    self.vpk.data_offset() + item.entry_offset as u64,
                    item.entry_length as u64,
                )?
            } else {
                self.read_volume(
                    item.archive_index,
                    item.entry_offset as u64,
                    item.entry_length as u64,
                )?
            };
            data.extend_from_slice(&rest);
        }

        Ok(ExtractedEntry::new(item.full_path(), data))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    /// One tree entry followed by the three list terminators.
    fn tree_entry(
        ext: &str,
        path: &str,
        name: &str,
        archive_index: u16,
        offset: u32,
        length: u32,
        preload: &[u8],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        for s in [ext, path, name] {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(preload.len() as u16).to_le_bytes());
        out.extend_from_slice(&archive_index.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&TERMINATOR.to_le_bytes());
        out.extend_from_slice(preload);
        // name, path and extension lists end
        out.extend_from_slice(&[0, 0, 0]);
        out
    }

    fn v1(tree: &[u8], tail: &[u8]) -> Vec<u8> {
        let mut out = SIGNATURE.to_le_bytes().to_vec();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(tree.len() as u32).to_le_bytes());
        out.extend_from_slice(tree);
        out.extend_from_slice(tail);
        out
    }

    #[test]
    fn preload_only_entry() {
        let tree = tree_entry("txt", "docs", "readme", NO_ARCHIVE, 0, 0, &[1, 2, 3]);
        let a = VpkArchive::from_bytes(v1(&tree, &[]), 0).unwrap();
        assert_eq!(
            a.read_entry(0).unwrap(),
            ExtractedEntry::new("docs/readme.txt", vec![1, 2, 3])
        );
    }

    #[test]
    fn in_directory_data_follows_preload() {
        let tree = tree_entry("bin", " ", "blob", NO_ARCHIVE, 2, 3, &[9]);
        let a = VpkArchive::from_bytes(v1(&tree, &[0, 0, 7, 8, 6]), 0).unwrap();
        let e = a.read_entry(0).unwrap();
        assert_eq!(e.path, "blob.bin");
        assert_eq!(e.data, vec![9, 7, 8, 6]);
    }

    #[test]
    fn volume_entries_need_volumes() {
        let tree = tree_entry("vmt", "materials", "a", 0, 0, 4, &[]);
        let a = VpkArchive::new(Cursor::new(v1(&tree, &[]))).unwrap();
        assert!(matches!(a.read_entry(0), Err(Error::MissingVolume(_))));
    }

    #[test]
    fn volume_entries_read_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pak01_001.vpk"), b"xxABCD").unwrap();
        let tree = tree_entry("vmt", "materials", "a", 1, 2, 4, &[b'!']);
        std::fs::write(dir.path().join("pak01_dir.vpk"), v1(&tree, &[])).unwrap();

        let a = VpkArchive::open(dir.path().join("pak01_dir.vpk")).unwrap();
        assert_eq!(
            a.volume_path(1).unwrap(),
            dir.path().join("pak01_001.vpk")
        );
        assert_eq!(a.read_entry(0).unwrap().data, b"!ABCD");
    }

    #[test]
    fn v2_header_is_longer() {
        let tree = tree_entry("txt", " ", "a", NO_ARCHIVE, 0, 1, &[]);
        let mut data = SIGNATURE.to_le_bytes().to_vec();
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&(tree.len() as u32).to_le_bytes());
        data.extend_from_slice(&[0; 16]);
        data.extend_from_slice(&tree);
        data.push(b'z');
        let a = VpkArchive::from_bytes(data, 0).unwrap();
        assert_eq!(a.vpk.header_length, 28);
        assert_eq!(a.read_entry(0).unwrap().data, b"z");
    }
}
