//! MS-CAB - Microsoft Cabinet.
//!
//! ## CFHEADER
//! ```text
//! [0x00] Magic "MSCF"              (4 bytes)
//! [0x04] Reserved                  (u32)
//! [0x08] CabinetSize               (u32 LE)
//! [0x0C] Reserved                  (u32)
//! [0x10] FilesOffset               (u32 LE)
//! [0x14] Reserved                  (u32)
//! [0x18] VersionMinor, VersionMajor (u8, u8)
//! [0x1A] FolderCount               (u16 LE)
//! [0x1C] FileCount                 (u16 LE)
//! [0x1E] Flags                     (u16 LE)
//! [0x20] SetId                     (u16 LE)
//! [0x22] CabinetIndex              (u16 LE)
//! RESERVE_PRESENT: HeaderReserve (u16), FolderReserve (u8), DataReserve (u8),
//!                  HeaderReserve bytes
//! PREV_CABINET:    previous cabinet name, previous disk name (C strings)
//! NEXT_CABINET:    next cabinet name, next disk name (C strings)
//! ```
//!
//! ## CFFOLDER
//! ```text
//! DataOffset (u32), DataCount (u16), TypeCompress (u16), FolderReserve bytes
//! ```
//!
//! ## CFFILE (at FilesOffset)
//! ```text
//! Size (u32), FolderOffset (u32), FolderIndex (u16), Date (u16), Time (u16),
//! Attributes (u16), Name (C string, UTF-8 when attribute 0x80 is set)
//! ```
//!
//! ## CFDATA (at each folder's DataOffset)
//! ```text
//! Checksum (u32), CompressedSize (u16), UncompressedSize (u16),
//! DataReserve bytes, CompressedSize bytes of data
//! ```
//!
//! A folder is one compression group: its blocks are decoded in order by a
//! single decoder, and each file is a slice of the folder's output.
//!
//! Folders may continue into the next cabinet of a set. [`CabinetSet`]
//! stitches such folders back together; a block split across the volume
//! boundary has an uncompressed size of 0 in the first cabinet and is joined
//! with the first block of the next one.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bitflags::bitflags;
use tracing::{debug, info, warn};

use super::{
    Extract, ExtractedEntry, archive_constructors, check_index, summarize, write_extracted,
};
use crate::compression::{BlockDecoder, CompressionKind};
use crate::source::Source;
use crate::utils::{bytesv, le_u16, le_u32, magic, to_usize, u8};
use crate::{Error, Result};

/// Folder index of a file continued from the previous cabinet.
pub const CONTINUED_FROM_PREV: u16 = 0xFFFD;
/// Folder index of a file continued into the next cabinet.
pub const CONTINUED_TO_NEXT: u16 = 0xFFFE;
/// Folder index of a file spanning both neighbours.
pub const CONTINUED_PREV_AND_NEXT: u16 = 0xFFFF;

const MAX_VOLUMES: usize = 256;

bitflags! {
    /// CFHEADER flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CabFlags: u16 {
        const PREV_CABINET = 0x0001;
        const NEXT_CABINET = 0x0002;
        const RESERVE_PRESENT = 0x0004;
    }
}

bitflags! {
    /// CFFILE attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u16 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const ARCHIVE = 0x0020;
        const EXECUTE = 0x0040;
        const NAME_IS_UTF = 0x0080;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabHeader {
    pub cabinet_size: u32,
    pub files_offset: u32,
    pub version_major: u8,
    pub version_minor: u8,
    pub flags: CabFlags,
    pub set_id: u16,
    pub cabinet_index: u16,
    pub header_reserve: Vec<u8>,
    pub folder_reserve_size: u8,
    pub data_reserve_size: u8,
    /// Previous cabinet file name and disk label.
    pub previous: Option<(String, String)>,
    /// Next cabinet file name and disk label.
    pub next: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabFolder {
    pub data_offset: u32,
    pub type_compress: u16,
    pub blocks: Vec<CabDataBlock>,
}

impl CabFolder {
    pub fn compression(&self) -> Result<CompressionKind> {
        CompressionKind::from_cab(self.type_compress)
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.blocks.iter().map(|b| b.uncompressed_size as u64).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CabDataBlock {
    pub checksum: u32,
    /// Offset of the block's payload (past its header and reserve).
    pub data_offset: u64,
    pub compressed_size: u16,
    pub uncompressed_size: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabFile {
    pub name: String,
    pub size: u32,
    pub folder_offset: u32,
    pub folder_index: u16,
    pub date: u16,
    pub time: u16,
    pub attributes: FileAttributes,
}

impl CabFile {
    pub fn continues_from_prev(&self) -> bool {
        matches!(
            self.folder_index,
            CONTINUED_FROM_PREV | CONTINUED_PREV_AND_NEXT
        )
    }

    pub fn continues_to_next(&self) -> bool {
        matches!(
            self.folder_index,
            CONTINUED_TO_NEXT | CONTINUED_PREV_AND_NEXT
        )
    }

    /// Real folder index in a cabinet with `folder_count` folders.
    pub fn resolve_folder(&self, folder_count: usize) -> Option<usize> {
        let index = match self.folder_index {
            CONTINUED_FROM_PREV | CONTINUED_PREV_AND_NEXT => 0,
            CONTINUED_TO_NEXT => folder_count.checked_sub(1)?,
            i => i as usize,
        };
        (index < folder_count).then_some(index)
    }
}

#[derive(Debug)]
pub struct Cab {
    pub header: CabHeader,
    pub folders: Vec<CabFolder>,
    pub files: Vec<CabFile>,
}

fn cab_string<R: Read>(r: &mut R, utf8: bool) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        match u8(r)? {
            0 => break,
            b => bytes.push(b),
        }
    }
    Ok(if utf8 {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        // Code page names; keep bytes as Latin-1.
        bytes.iter().map(|&b| b as char).collect()
    })
}

impl Cab {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        magic(r, b"MSCF")?;
        let _reserved1 = le_u32(r)?;
        let cabinet_size = le_u32(r)?;
        let _reserved2 = le_u32(r)?;
        let files_offset = le_u32(r)?;
        let _reserved3 = le_u32(r)?;
        let version_minor = u8(r)?;
        let version_major = u8(r)?;
        let folder_count = le_u16(r)?;
        let file_count = le_u16(r)?;
        let flags = CabFlags::from_bits_retain(le_u16(r)?);
        let set_id = le_u16(r)?;
        let cabinet_index = le_u16(r)?;
        if version_major != 1 {
            return Err(Error::UnsupportedVersion(version_major as u32));
        }

        let (header_reserve, folder_reserve_size, data_reserve_size) =
            if flags.contains(CabFlags::RESERVE_PRESENT) {
                let header_size = le_u16(r)?;
                let folder_size = u8(r)?;
                let data_size = u8(r)?;
                (bytesv(r, header_size as usize)?, folder_size, data_size)
            } else {
                (Vec::new(), 0, 0)
            };
        let previous = if flags.contains(CabFlags::PREV_CABINET) {
            Some((cab_string(r, false)?, cab_string(r, false)?))
        } else {
            None
        };
        let next = if flags.contains(CabFlags::NEXT_CABINET) {
            Some((cab_string(r, false)?, cab_string(r, false)?))
        } else {
            None
        };

        let mut raw_folders = Vec::with_capacity(folder_count as usize);
        for _ in 0..folder_count {
            let data_offset = le_u32(r)?;
            let data_count = le_u16(r)?;
            let type_compress = le_u16(r)?;
            r.seek(SeekFrom::Current(folder_reserve_size as i64))?;
            raw_folders.push((data_offset, data_count, type_compress));
        }

        r.seek(SeekFrom::Start(base + files_offset as u64))?;
        let mut files = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let size = le_u32(r)?;
            let folder_offset = le_u32(r)?;
            let folder_index = le_u16(r)?;
            let date = le_u16(r)?;
            let time = le_u16(r)?;
            let attributes = FileAttributes::from_bits_retain(le_u16(r)?);
            let name = cab_string(r, attributes.contains(FileAttributes::NAME_IS_UTF))?;
            files.push(CabFile {
                name,
                size,
                folder_offset,
                folder_index,
                date,
                time,
                attributes,
            });
        }

        let mut folders = Vec::with_capacity(raw_folders.len());
        for (data_offset, data_count, type_compress) in raw_folders {
            r.seek(SeekFrom::Start(base + data_offset as u64))?;
            let mut blocks = Vec::with_capacity(data_count as usize);
            for _ in 0..data_count {
                let checksum = le_u32(r)?;
                let compressed_size = le_u16(r)?;
                let uncompressed_size = le_u16(r)?;
                r.seek(SeekFrom::Current(data_reserve_size as i64))?;
                let data_offset = r.stream_position()? - base;
                r.seek(SeekFrom::Current(compressed_size as i64))?;
                blocks.push(CabDataBlock {
                    checksum,
                    data_offset,
                    compressed_size,
                    uncompressed_size,
                });
            }
            folders.push(CabFolder {
                data_offset,
                type_compress,
                blocks,
            });
        }

        Ok(Self {
            header: CabHeader {
                cabinet_size,
                files_offset,
                version_major,
                version_minor,
                flags,
                set_id,
                cabinet_index,
                header_reserve,
                folder_reserve_size,
                data_reserve_size,
                previous,
                next,
            },
            folders,
            files,
        })
    }
}

/// A stretch of compressed bytes in one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockPart {
    volume: usize,
    offset: u64,
    length: u16,
}

/// One logical CFDATA block; a block split across volumes has two parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BlockRef {
    parts: Vec<BlockPart>,
    uncompressed_size: u16,
}

#[derive(Debug, Clone)]
struct LogicalFolder {
    type_compress: u16,
    blocks: Vec<BlockRef>,
}

#[derive(Debug, Clone)]
struct LogicalFile {
    file: CabFile,
    folder: Option<usize>,
}

/// Folders and files ready for extraction, independent of how many
/// cabinets they came from.
#[derive(Debug, Default)]
struct Layout {
    folders: Vec<LogicalFolder>,
    files: Vec<LogicalFile>,
}

fn logical_folder(volume: usize, folder: &CabFolder) -> LogicalFolder {
    LogicalFolder {
        type_compress: folder.type_compress,
        blocks: folder
            .blocks
            .iter()
            .map(|b| BlockRef {
                parts: vec![BlockPart {
                    volume,
                    offset: b.data_offset,
                    length: b.compressed_size,
                }],
                uncompressed_size: b.uncompressed_size,
            })
            .collect(),
    }
}

impl Layout {
    fn single(cab: &Cab) -> Self {
        let folders: Vec<LogicalFolder> =
            cab.folders.iter().map(|f| logical_folder(0, f)).collect();
        let files = cab
            .files
            .iter()
            .map(|f| LogicalFile {
                folder: f.resolve_folder(folders.len()),
                file: f.clone(),
            })
            .collect();
        Self { folders, files }
    }

    /// Merge the volumes of a set, joining folders that continue across a
    /// volume boundary.
    fn merged(cabs: &[&Cab]) -> Result<Self> {
        let mut layout = Self::default();
        let mut carried: Option<usize> = None;

        for (volume, cab) in cabs.iter().enumerate() {
            let mut folder_map = Vec::with_capacity(cab.folders.len());
            for (i, folder) in cab.folders.iter().enumerate() {
                let next = logical_folder(volume, folder);
                match carried.take() {
                    Some(target) if i == 0 => {
                        let merged = &mut layout.folders[target];
                        if merged.type_compress != next.type_compress {
                            return Err(Error::Parse("continued CAB folder changes compression"));
                        }
                        let mut blocks = next.blocks.into_iter();
                        let split = merged
                            .blocks
                            .last_mut()
                            .filter(|b| b.uncompressed_size == 0);
                        if let Some(split) = split {
                            if let Some(rest) = blocks.next() {
                                split.parts.extend(rest.parts);
                                split.uncompressed_size = rest.uncompressed_size;
                            }
                        }
                        merged.blocks.extend(blocks);
                        folder_map.push(target);
                    }
                    _ => {
                        layout.folders.push(next);
                        folder_map.push(layout.folders.len() - 1);
                    }
                }
            }

            for file in &cab.files {
                if volume > 0 && file.continues_from_prev() {
                    continue;
                }
                let folder = file
                    .resolve_folder(folder_map.len())
                    .map(|i| folder_map[i]);
                layout.files.push(LogicalFile {
                    file: file.clone(),
                    folder,
                });
            }

            if cab.files.iter().any(CabFile::continues_to_next) {
                carried = folder_map.last().copied();
            }
        }

        Ok(layout)
    }

    fn folder_for(&self, index: usize) -> Result<usize> {
        check_index(index, self.files.len())?;
        self.files[index]
            .folder
            .ok_or(Error::Parse("CAB file refers to a missing folder"))
    }

    /// Decode a whole folder with one fresh decoder.
    fn folder_data<F>(&self, folder: usize, read: F) -> Result<Vec<u8>>
    where
        F: Fn(&BlockPart) -> Result<Vec<u8>>,
    {
        let folder = self.folders.get(folder).ok_or(Error::InvalidRange)?;
        let kind = CompressionKind::from_cab(folder.type_compress)?;
        debug!(?kind, blocks = folder.blocks.len(), "decoding cab folder");

        let mut decoder = BlockDecoder::new(kind)?;
        let mut out = Vec::new();
        for block in &folder.blocks {
            let mut data = Vec::new();
            for part in &block.parts {
                data.extend_from_slice(&read(part)?);
            }
            out.extend_from_slice(
                &decoder.decompress_block(&data, block.uncompressed_size as usize)?,
            );
        }
        Ok(out)
    }

    /// Cut file `index` out of its decoded folder.
    fn slice_file(&self, index: usize, folder_data: &[u8]) -> Result<ExtractedEntry> {
        let file = &self.files[index].file;
        let start = to_usize(file.folder_offset as u64)?;
        let end = start
            .checked_add(file.size as usize)
            .ok_or(Error::InvalidRange)?;
        let data = folder_data.get(start..end).ok_or(Error::InvalidRange)?;
        Ok(ExtractedEntry::new(file.name.clone(), data.to_vec()))
    }

    fn read_entry<F>(&self, index: usize, read: F) -> Result<ExtractedEntry>
    where
        F: Fn(&BlockPart) -> Result<Vec<u8>>,
    {
        let folder = self.folder_for(index)?;
        let data = self.folder_data(folder, read)?;
        self.slice_file(index, &data)
    }

    /// Extract every file, decoding each run of files sharing a folder once.
    fn extract_all<F>(&self, out_dir: &Path, read: F) -> bool
    where
        F: Fn(&BlockPart) -> Result<Vec<u8>>,
    {
        let mut current: Option<(usize, Option<Vec<u8>>)> = None;
        let mut results = Vec::with_capacity(self.files.len());

        for index in 0..self.files.len() {
            let folder = match self.folder_for(index) {
                Ok(folder) => folder,
                Err(e) => {
                    results.push(write_extracted(index, out_dir, Err(e)));
                    continue;
                }
            };
            if current.as_ref().map(|(f, _)| *f) != Some(folder) {
                let data = match self.folder_data(folder, &read) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        warn!(folder, error = %e, "cab folder failed");
                        None
                    }
                };
                current = Some((folder, data));
            }

            let ok = match current.as_ref().and_then(|(_, d)| d.as_deref()) {
                Some(data) => write_extracted(index, out_dir, self.slice_file(index, data)),
                None => false,
            };
            results.push(ok);
        }

        summarize(&results)
    }
}

/// Single-cabinet handle.
pub struct CabArchive<R> {
    source: Source<R>,
    pub cab: Cab,
    layout: Layout,
}

impl<R: Read + Seek> CabArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let cab = source.parse_with(Cab::parse)?;
        let layout = Layout::single(&cab);
        Ok(Self {
            source,
            cab,
            layout,
        })
    }

    pub fn files(&self) -> impl Iterator<Item = &CabFile> {
        self.cab.files.iter()
    }

    /// Decoded contents of folder `index`.
    pub fn folder_data(&self, index: usize) -> Result<Vec<u8>> {
        self.layout.folder_data(index, |p| self.read_part(p))
    }

    fn read_part(&self, part: &BlockPart) -> Result<Vec<u8>> {
        self.source.read_range(part.offset, part.length as u64)
    }
}

archive_constructors!(CabArchive);

impl<R: Read + Seek> Extract for CabArchive<R> {
    fn entry_count(&self) -> usize {
        self.layout.files.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        self.layout.read_entry(index, |p| self.read_part(p))
    }

    fn extract_all(&self, out_dir: &Path) -> bool {
        self.layout.extract_all(out_dir, |p| self.read_part(p))
    }
}

/// A chain of cabinets linked by their next-cabinet names.
pub struct CabinetSet<R> {
    volumes: Vec<CabArchive<R>>,
    layout: Layout,
}

impl<R: Read + Seek> CabinetSet<R> {
    /// Build a set from volumes already in chain order.
    pub fn from_volumes(volumes: Vec<CabArchive<R>>) -> Result<Self> {
        if volumes.is_empty() {
            return Err(Error::EmptySource);
        }
        let cabs: Vec<&Cab> = volumes.iter().map(|v| &v.cab).collect();
        let layout = Layout::merged(&cabs)?;
        Ok(Self { volumes, layout })
    }

    pub fn volumes(&self) -> &[CabArchive<R>] {
        &self.volumes
    }

    /// Files of the whole set, continued entries listed once.
    pub fn files(&self) -> impl Iterator<Item = &CabFile> {
        self.layout.files.iter().map(|f| &f.file)
    }

    fn read_part(&self, part: &BlockPart) -> Result<Vec<u8>> {
        let volume = self.volumes.get(part.volume).ok_or(Error::InvalidRange)?;
        volume.read_part(part)
    }
}

impl CabinetSet<BufReader<File>> {
    /// Open `path` and every cabinet that follows it, looked up by name in
    /// the same directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or(Path::new(""));
        let mut volumes = vec![CabArchive::open(path)?];

        while let Some((next, _)) = volumes.last().and_then(|v| v.cab.header.next.clone()) {
            if volumes.len() >= MAX_VOLUMES {
                return Err(Error::Parse("too many cabinets in set"));
            }
            let next_path = dir.join(&next);
            if !next_path.is_file() {
                return Err(Error::MissingVolume(next_path));
            }
            debug!(path = %next_path.display(), "opening next cabinet");
            volumes.push(CabArchive::open(&next_path)?);
        }

        info!(volumes = volumes.len(), "opened cabinet set");
        Self::from_volumes(volumes)
    }
}

impl<R: Read + Seek> Extract for CabinetSet<R> {
    fn entry_count(&self) -> usize {
        self.layout.files.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        self.layout.read_entry(index, |p| self.read_part(p))
    }

    fn extract_all(&self, out_dir: &Path) -> bool {
        self.layout.extract_all(out_dir, |p| self.read_part(p))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct TestFolder {
        type_compress: u16,
        /// (stored bytes, uncompressed size)
        blocks: Vec<(Vec<u8>, u16)>,
    }

    /// (name, size, folder offset, folder index)
    type TestFile<'a> = (&'a str, u32, u32, u16);

    fn build(
        folders: &[TestFolder],
        files: &[TestFile<'_>],
        flags: u16,
        next: Option<&str>,
    ) -> Vec<u8> {
        let mut links = Vec::new();
        if flags & 0x1 != 0 {
            links.extend_from_slice(b"prev.cab\0disk\0");
        }
        if let Some(next) = next {
            links.extend_from_slice(next.as_bytes());
            links.extend_from_slice(b"\0disk\0");
        }
        let flags = flags | if next.is_some() { 0x2 } else { 0 };

        let folders_offset = 36 + links.len();
        let files_offset = folders_offset + folders.len() * 8;
        let mut file_table = Vec::new();
        for (name, size, offset, folder) in files {
            file_table.extend_from_slice(&size.to_le_bytes());
            file_table.extend_from_slice(&offset.to_le_bytes());
            file_table.extend_from_slice(&folder.to_le_bytes());
            file_table.extend_from_slice(&[0; 6]);
            file_table.extend_from_slice(name.as_bytes());
            file_table.push(0);
        }

        let mut data = Vec::new();
        let mut folder_table = Vec::new();
        let data_start = files_offset + file_table.len();
        for folder in folders {
            folder_table.extend_from_slice(&((data_start + data.len()) as u32).to_le_bytes());
            folder_table.extend_from_slice(&(folder.blocks.len() as u16).to_le_bytes());
            folder_table.extend_from_slice(&folder.type_compress.to_le_bytes());
            for (bytes, uncompressed) in &folder.blocks {
                data.extend_from_slice(&0u32.to_le_bytes());
                data.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
                data.extend_from_slice(&uncompressed.to_le_bytes());
                data.extend_from_slice(bytes);
            }
        }

        let total = data_start + data.len();
        let mut out = b"MSCF".to_vec();
        for v in [0u32, total as u32, 0, files_offset as u32, 0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&[3, 1]);
        for v in [folders.len() as u16, files.len() as u16, flags, 0x1234, 0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend(links);
        out.extend(folder_table);
        out.extend(file_table);
        out.extend(data);
        out
    }

    fn store(blocks: &[&[u8]]) -> TestFolder {
        TestFolder {
            type_compress: 0,
            blocks: blocks.iter().map(|b| (b.to_vec(), b.len() as u16)).collect(),
        }
    }

    #[test]
    fn store_folder_files_are_slices() {
        let data = build(
            &[store(&[&b"hello "[..], &b"world"[..]])],
            &[("a.txt", 5, 0, 0), ("dir\\b.txt", 5, 6, 0)],
            0,
            None,
        );
        let a = CabArchive::from_bytes(data, 0).unwrap();
        assert_eq!(a.cab.header.set_id, 0x1234);
        assert_eq!(a.cab.folders[0].uncompressed_size(), 11);
        assert_eq!(
            a.read_entry(1).unwrap(),
            ExtractedEntry::new("dir\\b.txt", b"world".to_vec())
        );
    }

    #[test]
    fn file_past_folder_end_fails_alone() {
        let data = build(
            &[store(&[&b"abc"[..]])],
            &[("ok", 3, 0, 0), ("bad", 4, 0, 0), ("lost", 1, 0, 7)],
            0,
            None,
        );
        let a = CabArchive::from_bytes(data, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(!a.extract_all(dir.path()));
        assert!(dir.path().join("ok").exists());
        assert!(!dir.path().join("bad").exists());
        assert!(!a.extract_entry(2, dir.path()));
    }

    #[test]
    fn unknown_compression_fails_folder() {
        let mut folder = store(&[&b"abc"[..]]);
        folder.type_compress = 0x000F;
        let data = build(&[folder], &[("x", 3, 0, 0)], 0, None);
        let a = CabArchive::from_bytes(data, 0).unwrap();
        assert!(matches!(
            a.read_entry(0),
            Err(Error::UnsupportedCompression(0x000F))
        ));
    }

    #[test]
    fn quantum_folder_decodes_across_blocks() {
        // Block one: literals "abc". Block two: a 3-byte match at distance 3
        // then literal 'd', which only decodes with block one's models.
        let folder = TestFolder {
            type_compress: 0x0A02,
            blocks: vec![
                (vec![0xC8, 0x53, 0xEC, 0x88, 0x00, 0x00], 3),
                (vec![0x17, 0xC0, 0xE3, 0x80], 4),
            ],
        };
        let data = build(
            &[folder],
            &[("all.bin", 7, 0, 0), ("tail.bin", 4, 3, 0)],
            0,
            None,
        );
        let a = CabArchive::from_bytes(data, 0).unwrap();
        assert_eq!(a.read_entry(0).unwrap().data, b"abcabcd");
        assert_eq!(a.read_entry(1).unwrap().data, b"abcd");
    }

    #[cfg(feature = "compression")]
    #[test]
    fn lzx_folder_decodes_across_blocks() {
        // One uncompressed LZX block of 6 bytes split over two CFDATA blocks.
        let folder = TestFolder {
            type_compress: 0x0F03,
            blocks: vec![
                (
                    vec![
                        0x00, 0x30, 0x60, 0x00, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, b'a', b'b',
                        b'c',
                    ],
                    3,
                ),
                (b"def".to_vec(), 3),
            ],
        };
        let data = build(&[folder], &[("x.txt", 6, 0, 0)], 0, None);
        let a = CabArchive::from_bytes(data, 0).unwrap();
        assert_eq!(a.read_entry(0).unwrap().data, b"abcdef");
    }

    #[test]
    fn continued_indices_map_to_edge_folders() {
        let f = |folder_index| CabFile {
            name: String::new(),
            size: 0,
            folder_offset: 0,
            folder_index,
            date: 0,
            time: 0,
            attributes: FileAttributes::empty(),
        };
        assert_eq!(f(CONTINUED_FROM_PREV).resolve_folder(3), Some(0));
        assert_eq!(f(CONTINUED_TO_NEXT).resolve_folder(3), Some(2));
        assert_eq!(f(CONTINUED_PREV_AND_NEXT).resolve_folder(3), Some(0));
        assert_eq!(f(CONTINUED_TO_NEXT).resolve_folder(0), None);
        assert_eq!(f(3).resolve_folder(3), None);
    }

    #[test]
    fn set_stitches_split_block() {
        // "abcdef" stored; its only block is split 2 + 4 across volumes.
        let one = build(
            &[TestFolder {
                type_compress: 0,
                blocks: vec![(b"ab".to_vec(), 0)],
            }],
            &[("whole.txt", 6, 0, CONTINUED_TO_NEXT)],
            0,
            Some("two.cab"),
        );
        let two = build(
            &[
                TestFolder {
                    type_compress: 0,
                    blocks: vec![(b"cdef".to_vec(), 6)],
                },
                store(&[&b"zz"[..]]),
            ],
            &[("whole.txt", 6, 0, CONTINUED_FROM_PREV), ("z.txt", 2, 0, 1)],
            0x1,
            None,
        );

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.cab"), one).unwrap();
        std::fs::write(dir.path().join("two.cab"), two).unwrap();

        let set = CabinetSet::open(dir.path().join("one.cab")).unwrap();
        assert_eq!(set.volumes().len(), 2);
        assert_eq!(set.entry_count(), 2);
        assert_eq!(set.read_entry(0).unwrap().data, b"abcdef");
        assert_eq!(set.read_entry(1).unwrap().data, b"zz");
    }

    #[test]
    fn missing_next_cabinet() {
        let one = build(&[store(&[&b"a"[..]])], &[("a", 1, 0, 0)], 0, Some("gone.cab"));
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.cab"), one).unwrap();
        assert!(matches!(
            CabinetSet::open(dir.path().join("one.cab")),
            Err(Error::MissingVolume(_))
        ));
    }
}
