//! WAD3 - Half-Life texture package.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "WAD3"              (4 bytes)
//! [0x04] LumpCount                 (u32 LE)
//! [0x08] LumpOffset                (u32 LE)
//! [LumpOffset] LumpTable           (LumpCount × 0x20 bytes)
//! ```
//!
//! ## Lump record (0x20 bytes)
//! ```text
//! [0x00] Offset                    (u32 LE)
//! [0x04] DiskLength                (u32 LE)
//! [0x08] Length                    (u32 LE)
//! [0x0C] Type                      (u8)
//! [0x0D] Compression               (u8, always 0 in practice)
//! [0x0E] Padding                   (u16)
//! [0x10] Name                      (16 bytes, null padded)
//! ```
//!
//! Lumps are copied as stored (`DiskLength` bytes) to `{Name}.lmp`.

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::Result;
use crate::source::Source;
use crate::utils::{bytesa, fixed_string, le_u16, le_u32, magic, u8};

/// Parsed WAD3 directory.
#[derive(Debug)]
pub struct Wad {
    pub lumps: Vec<WadLump>,
}

/// One lump record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WadLump {
    pub name: String,
    pub offset: u32,
    pub disk_length: u32,
    pub length: u32,
    pub kind: u8,
    pub compression: u8,
}

impl Wad {
    /// Parse a WAD3 package from `r`.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        magic(r, b"WAD3")?;
        let lump_count = le_u32(r)?;
        let lump_offset = le_u32(r)?;

        r.seek(SeekFrom::Start(base + lump_offset as u64))?;
        let mut lumps = Vec::with_capacity(lump_count.min(0x10000) as usize);
        for _ in 0..lump_count {
            let offset = le_u32(r)?;
            let disk_length = le_u32(r)?;
            let length = le_u32(r)?;
            let kind = u8(r)?;
            let compression = u8(r)?;
            let _padding = le_u16(r)?;
            let name = fixed_string(&bytesa::<16>(r)?);
            lumps.push(WadLump {
                name,
                offset,
                disk_length,
                length,
                kind,
                compression,
            });
        }

        Ok(Self { lumps })
    }
}

/// WAD3 archive handle.
pub struct WadArchive<R> {
    source: Source<R>,
    pub wad: Wad,
}

impl<R: Read + Seek> WadArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let wad = source.parse_with(Wad::parse)?;
        Ok(Self { source, wad })
    }

    pub fn lumps(&self) -> impl Iterator<Item = &WadLump> {
        self.wad.lumps.iter()
    }

    /// Find a lump by name (case-insensitive, as the engine does).
    pub fn get_lump_by_name(&self, name: &str) -> Option<&WadLump> {
        self.wad.lumps.iter().find(|l| l.name.eq_ignore_ascii_case(name))
    }
}

archive_constructors!(WadArchive);

impl<R: Read + Seek> Extract for WadArchive<R> {
    fn entry_count(&self) -> usize {
        self.wad.lumps.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let lump = &self.wad.lumps[index];
        debug!(index, offset = lump.offset, length = lump.disk_length, "wad lump");
        let data = self
            .source
            .read_range(lump.offset as u64, lump.disk_length as u64)?;
        Ok(ExtractedEntry::new(format!("{}.lmp", lump.name), data))
    }
}
