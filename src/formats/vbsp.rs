//! VBSP - Source engine map.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "VBSP"              (4 bytes)
//! [0x04] Version                   (i32 LE, 17-21 seen in the wild)
//! [0x08] Lumps                     (64 × 0x10 bytes)
//! [0x408] MapRevision              (i32 LE)
//! ```
//!
//! ## Lump (0x10 bytes)
//! ```text
//! [0x00] Offset                    (u32 LE)
//! [0x04] Length                    (u32 LE)
//! [0x08] Version                   (u32 LE)
//! [0x0C] FourCC                    (4 bytes, uncompressed size for LZMA lumps)
//! ```
//!
//! Lump 40 is an embedded ZIP holding custom content; it is extracted as
//! `pakfile.zip`.

use std::io::{Read, Seek};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::Result;
use crate::source::Source;
use crate::utils::{bytesa, le_i32, le_u32, magic};

pub const LUMP_COUNT: usize = 64;
pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PAKFILE: usize = 40;

#[derive(Debug)]
pub struct Vbsp {
    pub version: i32,
    pub lumps: Vec<VbspLump>,
    pub map_revision: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VbspLump {
    pub offset: u32,
    pub length: u32,
    pub version: u32,
    pub four_cc: [u8; 4],
}

/// Output name of lump `index`.
pub fn lump_name(index: usize) -> String {
    match index {
        LUMP_ENTITIES => "entities.ent".to_owned(),
        LUMP_PAKFILE => "pakfile.zip".to_owned(),
        i => format!("lump_{i}.bin"),
    }
}

impl Vbsp {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        magic(r, b"VBSP")?;
        let version = le_i32(r)?;
        let mut lumps = Vec::with_capacity(LUMP_COUNT);
        for _ in 0..LUMP_COUNT {
            lumps.push(VbspLump {
                offset: le_u32(r)?,
                length: le_u32(r)?,
                version: le_u32(r)?,
                four_cc: bytesa::<4>(r)?,
            });
        }
        let map_revision = le_i32(r)?;
        Ok(Self {
            version,
            lumps,
            map_revision,
        })
    }
}

/// VBSP archive handle.
pub struct VbspArchive<R> {
    source: Source<R>,
    pub vbsp: Vbsp,
}

impl<R: Read + Seek> VbspArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let vbsp = source.parse_with(Vbsp::parse)?;
        Ok(Self { source, vbsp })
    }
}

archive_constructors!(VbspArchive);

impl<R: Read + Seek> Extract for VbspArchive<R> {
    fn entry_count(&self) -> usize {
        self.vbsp.lumps.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let lump = self.vbsp.lumps[index];
        debug!(index, offset = lump.offset, length = lump.length, "vbsp lump");
        let data = self
            .source
            .read_range(lump.offset as u64, lump.length as u64)?;
        Ok(ExtractedEntry::new(lump_name(index), data))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pakfile_lump() {
        let header = 8 + LUMP_COUNT * 16 + 4;
        let mut out = b"VBSP".to_vec();
        out.extend_from_slice(&20i32.to_le_bytes());
        for i in 0..LUMP_COUNT {
            let (offset, len) = if i == LUMP_PAKFILE { (header, 4) } else { (0, 0) };
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&(len as u32).to_le_bytes());
            out.extend_from_slice(&[0; 8]);
        }
        out.extend_from_slice(&7i32.to_le_bytes());
        out.extend_from_slice(b"PK\x03\x04");

        let a = VbspArchive::from_bytes(out, 0).unwrap();
        assert_eq!(a.vbsp.map_revision, 7);
        assert_eq!(a.entry_count(), 64);
        assert_eq!(
            a.read_entry(LUMP_PAKFILE).unwrap(),
            ExtractedEntry::new("pakfile.zip", b"PK\x03\x04".to_vec())
        );
        assert_eq!(a.read_entry(1).unwrap().path, "lump_1.bin");
    }
}
