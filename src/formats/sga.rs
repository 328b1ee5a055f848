//! SGA - Relic Entertainment archive (versions 4 to 7).
//!
//! ## Header
//! ```text
//! [0x00] Magic "_ARCHIVE"          (8 bytes)
//! [0x08] MajorVersion              (u16 LE)
//! [0x0A] MinorVersion              (u16 LE)
//! v4, v5:
//! [0x0C] FileMd5                   (16 bytes)
//! [0x1C] Name                      (64 × UTF-16LE)
//! [0x9C] HeaderMd5                 (16 bytes)
//! [0xAC] HeaderLength              (u32 LE)
//! [0xB0] FileDataOffset            (u32 LE)
//! [0xB4] Reserved                  (u32)
//! v6, v7:
//! [0x0C] Name                      (64 × UTF-16LE)
//! [0x8C] HeaderLength              (u32 LE)
//! [0x90] FileDataOffset            (u32 LE)
//! [0x94] Reserved                  (u32)
//! ```
//!
//! ## Directory
//! The directory header follows the header. All of its offsets are relative
//! to its own start; "index" fields are `u16` in v4 and `u32` later.
//! ```text
//! SectionOffset (u32), SectionCount (index)
//! FolderOffset  (u32), FolderCount  (index)
//! FileOffset    (u32), FileCount    (index)
//! StringTableOffset (u32), StringTableCount (index)
//! v7: HashTableOffset (u32), BlockSize (u32)
//! ```
//!
//! | Record  | Fields |
//! |---------|--------|
//! | Section | Alias[64], Name[64], FolderStart, FolderEnd, FileStart, FileEnd, FolderRoot (indices) |
//! | Folder  | NameOffset (u32), FolderStart, FolderEnd, FileStart, FileEnd (indices) |
//! | File v4/v5 | NameOffset, Offset, SizeOnDisk, Size, TimeModified (u32), Reserved (u8), Type (u8) |
//! | File v6 | v4 fields + Crc32 (u32) |
//! | File v7 | v6 fields + HashOffset (u32) |
//!
//! File data lives at `FileDataOffset + File.Offset`. When `SizeOnDisk`
//! differs from `Size` the data is deflated.

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::compression::inflate_raw;
use crate::source::Source;
use crate::utils::{
    bytesa, fixed_string, fixed_utf16, le_u16, le_u32, magic, read_null_string, to_usize, u8,
};
use crate::{Error, Result};

/// Archive major version; selects every record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgaVersion {
    V4,
    V5,
    V6,
    V7,
}

impl SgaVersion {
    pub fn from_major(major: u16) -> Result<Self> {
        match major {
            4 => Ok(Self::V4),
            5 => Ok(Self::V5),
            6 => Ok(Self::V6),
            7 => Ok(Self::V7),
            v => Err(Error::UnsupportedVersion(v as u32)),
        }
    }

    /// Size of the archive header, i.e. where the directory header starts.
    pub fn header_size(self) -> u64 {
        match self {
            Self::V4 | Self::V5 => 0xB8,
            Self::V6 | Self::V7 => 0x98,
        }
    }

    /// Read one section/folder index field.
    fn index<R: Read>(self, r: &mut R) -> Result<u32> {
        match self {
            Self::V4 => Ok(le_u16(r)? as u32),
            Self::V5 | Self::V6 | Self::V7 => le_u32(r),
        }
    }

    fn file_record_size(self) -> u64 {
        match self {
            Self::V4 | Self::V5 => 0x16,
            Self::V6 => 0x1A,
            Self::V7 => 0x1E,
        }
    }
}

#[derive(Debug)]
pub struct Sga {
    pub version: SgaVersion,
    pub minor_version: u16,
    pub name: String,
    /// MD5s are only present in v4/v5 headers.
    pub file_md5: Option<[u8; 16]>,
    pub header_md5: Option<[u8; 16]>,
    pub header_length: u32,
    pub file_data_offset: u32,
    /// v7 only.
    pub hash_table_offset: Option<u32>,
    /// v7 only.
    pub block_size: Option<u32>,
    pub sections: Vec<SgaSection>,
    pub folders: Vec<SgaFolder>,
    pub files: Vec<SgaFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgaSection {
    pub alias: String,
    pub name: String,
    pub folder_start: u32,
    pub folder_end: u32,
    pub file_start: u32,
    pub file_end: u32,
    pub folder_root: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgaFolder {
    pub name: String,
    pub folder_start: u32,
    pub folder_end: u32,
    pub file_start: u32,
    pub file_end: u32,
}

impl SgaFolder {
    pub fn contains_file(&self, index: u32) -> bool {
        (self.file_start..self.file_end).contains(&index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgaFile {
    pub name: String,
    pub offset: u32,
    pub size_on_disk: u32,
    pub size: u32,
    pub time_modified: u32,
    pub kind: u8,
    /// v6 and v7.
    pub crc32: Option<u32>,
    /// v7 only.
    pub hash_offset: Option<u32>,
}

impl Sga {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        magic(r, b"_ARCHIVE")?;
        let version = SgaVersion::from_major(le_u16(r)?)?;
        let minor_version = le_u16(r)?;

        let (file_md5, name, header_md5) = match version {
            SgaVersion::V4 | SgaVersion::V5 => {
                let file_md5 = bytesa::<16>(r)?;
                let name = fixed_utf16(&bytesa::<128>(r)?);
                let header_md5 = bytesa::<16>(r)?;
                (Some(file_md5), name, Some(header_md5))
            }
            SgaVersion::V6 | SgaVersion::V7 => (None, fixed_utf16(&bytesa::<128>(r)?), None),
        };
        let header_length = le_u32(r)?;
        let file_data_offset = le_u32(r)?;
        let _reserved = le_u32(r)?;

        let dir = base + version.header_size();
        r.seek(SeekFrom::Start(dir))?;
        let section_offset = le_u32(r)?;
        let section_count = version.index(r)?;
        let folder_offset = le_u32(r)?;
        let folder_count = version.index(r)?;
        let file_offset = le_u32(r)?;
        let file_count = version.index(r)?;
        let string_table_offset = le_u32(r)?;
        let _string_table_count = version.index(r)?;
        let (hash_table_offset, block_size) = match version {
            SgaVersion::V7 => (Some(le_u32(r)?), Some(le_u32(r)?)),
            _ => (None, None),
        };

        r.seek(SeekFrom::Start(dir + section_offset as u64))?;
        let mut sections = Vec::with_capacity(section_count.min(0x1000) as usize);
        for _ in 0..section_count {
            sections.push(SgaSection {
                alias: fixed_string(&bytesa::<64>(r)?),
                name: fixed_string(&bytesa::<64>(r)?),
                folder_start: version.index(r)?,
                folder_end: version.index(r)?,
                file_start: version.index(r)?,
                file_end: version.index(r)?,
                folder_root: version.index(r)?,
            });
        }

        r.seek(SeekFrom::Start(dir + folder_offset as u64))?;
        let mut raw_folders = Vec::with_capacity(folder_count.min(0x10000) as usize);
        for _ in 0..folder_count {
            let name_offset = le_u32(r)?;
            let folder_start = version.index(r)?;
            let folder_end = version.index(r)?;
            let file_start = version.index(r)?;
            let file_end = version.index(r)?;
            raw_folders.push((name_offset, folder_start, folder_end, file_start, file_end));
        }

        let mut raw_files = Vec::with_capacity(file_count.min(0x10000) as usize);
        for i in 0..file_count as u64 {
            r.seek(SeekFrom::Start(
                dir + file_offset as u64 + i * version.file_record_size(),
            ))?;
            let name_offset = le_u32(r)?;
            let file = SgaFile {
                name: String::new(),
                offset: le_u32(r)?,
                size_on_disk: le_u32(r)?,
                size: le_u32(r)?,
                time_modified: le_u32(r)?,
                kind: {
                    let _reserved = u8(r)?;
                    u8(r)?
                },
                crc32: match version {
                    SgaVersion::V6 | SgaVersion::V7 => Some(le_u32(r)?),
                    _ => None,
                },
                hash_offset: match version {
                    SgaVersion::V7 => Some(le_u32(r)?),
                    _ => None,
                },
            };
            raw_files.push((name_offset, file));
        }

        let strings = dir + string_table_offset as u64;
        let mut name_at = |offset: u32| -> Result<String> {
            r.seek(SeekFrom::Start(strings + offset as u64))?;
            read_null_string(r)
        };

        let mut folders = Vec::with_capacity(raw_folders.len());
        for (name_offset, folder_start, folder_end, file_start, file_end) in raw_folders {
            folders.push(SgaFolder {
                name: name_at(name_offset)?,
                folder_start,
                folder_end,
                file_start,
                file_end,
            });
        }
        let mut files = Vec::with_capacity(raw_files.len());
        for (name_offset, mut file) in raw_files {
            file.name = name_at(name_offset)?;
            files.push(file);
        }

        Ok(Self {
            version,
            minor_version,
            name,
            file_md5,
            header_md5,
            header_length,
            file_data_offset,
            hash_table_offset,
            block_size,
            sections,
            folders,
            files,
        })
    }

    /// Folder whose file range holds file `index`.
    pub fn owning_folder(&self, index: usize) -> Option<&SgaFolder> {
        let index = u32::try_from(index).ok()?;
        self.folders.iter().find(|f| f.contains_file(index))
    }

    /// `folder\name` path of file `index`.
    pub fn file_path(&self, index: usize) -> Option<String> {
        let file = self.files.get(index)?;
        Some(match self.owning_folder(index) {
            Some(folder) if !folder.name.is_empty() => format!("{}\\{}", folder.name, file.name),
            _ => file.name.clone(),
        })
    }
}

/// SGA archive handle.
pub struct SgaArchive<R> {
    source: Source<R>,
    pub sga: Sga,
}

impl<R: Read + Seek> SgaArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let sga = source.parse_with(Sga::parse)?;
        Ok(Self { source, sga })
    }

    pub fn files(&self) -> impl Iterator<Item = &SgaFile> {
        self.sga.files.iter()
    }
}

archive_constructors!(SgaArchive);

impl<R: Read + Seek> Extract for SgaArchive<R> {
    fn entry_count(&self) -> usize {
        self.sga.files.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let file = &self.sga.files[index];
        let path = self.sga.file_path(index).unwrap_or_default();
        let offset = self.sga.file_data_offset as u64 + file.offset as u64;
        debug!(
            index,
            path,
            offset,
            size_on_disk = file.size_on_disk,
            size = file.size,
            "sga file"
        );

        let raw = self.source.read_range(offset, file.size_on_disk as u64)?;
        let data = if file.size_on_disk == file.size {
            raw
        } else {
            inflate_raw(&raw, to_usize(file.size as u64)?)?
        };
        Ok(ExtractedEntry::new(path, data))
    }
}
