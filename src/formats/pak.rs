//! PAK - Quake / Half-Life package.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "PACK"              (4 bytes)
//! [0x04] DirectoryOffset           (u32 LE)
//! [0x08] DirectoryLength           (u32 LE)
//! [DirectoryOffset] Items          (DirectoryLength / 0x40 records)
//! ```
//!
//! ## Item (0x40 bytes)
//! ```text
//! [0x00] Name                      (56 bytes, null padded, `/` separated)
//! [0x38] Offset                    (u32 LE)
//! [0x3C] Length                    (u32 LE)
//! ```

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::Result;
use crate::source::Source;
use crate::utils::{bytesa, fixed_string, le_u32, magic};

const ITEM_SIZE: u32 = 0x40;

#[derive(Debug)]
pub struct Pak {
    pub items: Vec<PakItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakItem {
    pub name: String,
    pub offset: u32,
    pub length: u32,
}

impl Pak {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        magic(r, b"PACK")?;
        let directory_offset = le_u32(r)?;
        let directory_length = le_u32(r)?;

        r.seek(SeekFrom::Start(base + directory_offset as u64))?;
        let count = directory_length / ITEM_SIZE;
        let mut items = Vec::with_capacity(count.min(0x10000) as usize);
        for _ in 0..count {
            let name = fixed_string(&bytesa::<56>(r)?);
            let offset = le_u32(r)?;
            let length = le_u32(r)?;
            items.push(PakItem {
                name,
                offset,
                length,
            });
        }
        Ok(Self { items })
    }
}

/// PAK archive handle.
pub struct PakArchive<R> {
    source: Source<R>,
    pub pak: Pak,
}

impl<R: Read + Seek> PakArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let pak = source.parse_with(Pak::parse)?;
        Ok(Self { source, pak })
    }

    pub fn items(&self) -> impl Iterator<Item = &PakItem> {
        self.pak.items.iter()
    }
}

archive_constructors!(PakArchive);

impl<R: Read + Seek> Extract for PakArchive<R> {
    fn entry_count(&self) -> usize {
        self.pak.items.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let item = &self.pak.items[index];
        debug!(index, offset = item.offset, length = item.length, "pak item");
        let data = self
            .source
            .read_range(item.offset as u64, item.length as u64)?;
        Ok(ExtractedEntry::new(item.name.clone(), data))
    }
}
