//! PFF - NovaLogic package (PFF2, PFF3, PFF4).
//!
//! ## Layout
//! ```text
//! [0x00] HeaderSize                (u32 LE)
//! [0x04] Signature "PFF2|PFF3|PFF4" (4 bytes)
//! [0x08] FileCount                 (u32 LE)
//! [0x0C] FileSegmentSize           (u32 LE)
//! [0x10] FileListOffset            (u32 LE)
//! [FileListOffset] Segments        (FileCount × FileSegmentSize bytes)
//! ```
//!
//! ## Segment
//! ```text
//! [0x00] Deleted                   (u32 LE)
//! [0x04] FileLocation              (u32 LE)
//! [0x08] FileSize                  (u32 LE)
//! [0x0C] PackedDate                (u32 LE)
//! [0x10] FileName                  (16 bytes)
//! [0x20] ModifiedDate              (u32 LE, segments >= 0x24 bytes)
//! [0x24] CompressionLevel          (u32 LE, segments >= 0x28 bytes)
//! ```
//!
//! Deleted segments still point at their data and are extracted like any
//! other.

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::source::Source;
use crate::utils::{bytesa, fixed_string, le_u32};
use crate::{Error, Result};

const MIN_SEGMENT_SIZE: u32 = 0x20;

/// PFF signature revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PffVersion {
    Pff2,
    Pff3,
    Pff4,
}

#[derive(Debug)]
pub struct Pff {
    pub version: PffVersion,
    pub header_size: u32,
    pub segments: Vec<PffSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PffSegment {
    pub deleted: bool,
    pub file_location: u32,
    pub file_size: u32,
    pub packed_date: u32,
    pub file_name: String,
    pub modified_date: Option<u32>,
    pub compression_level: Option<u32>,
}

impl Pff {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        let header_size = le_u32(r)?;
        let version = match &bytesa::<4>(r)? {
            b"PFF2" => PffVersion::Pff2,
            b"PFF3" => PffVersion::Pff3,
            b"PFF4" => PffVersion::Pff4,
            _ => return Err(Error::BadMagic),
        };
        let file_count = le_u32(r)?;
        let segment_size = le_u32(r)?;
        let file_list_offset = le_u32(r)?;
        if segment_size < MIN_SEGMENT_SIZE {
            return Err(Error::Parse("PFF segment too small"));
        }

        let mut segments = Vec::with_capacity(file_count.min(0x10000) as usize);
        for i in 0..file_count as u64 {
            r.seek(SeekFrom::Start(
                base + file_list_offset as u64 + i * segment_size as u64,
            ))?;
            let deleted = le_u32(r)? != 0;
            let file_location = le_u32(r)?;
            let file_size = le_u32(r)?;
            let packed_date = le_u32(r)?;
            let file_name = fixed_string(&bytesa::<16>(r)?);
            let modified_date = if segment_size >= 0x24 {
                Some(le_u32(r)?)
            } else {
                None
            };
            let compression_level = if segment_size >= 0x28 {
                Some(le_u32(r)?)
            } else {
                None
            };
            segments.push(PffSegment {
                deleted,
                file_location,
                file_size,
                packed_date,
                file_name,
                modified_date,
                compression_level,
            });
        }

        Ok(Self {
            version,
            header_size,
            segments,
        })
    }
}

/// PFF archive handle.
pub struct PffArchive<R> {
    source: Source<R>,
    pub pff: Pff,
}

impl<R: Read + Seek> PffArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let pff = source.parse_with(Pff::parse)?;
        Ok(Self { source, pff })
    }

    pub fn segments(&self) -> impl Iterator<Item = &PffSegment> {
        self.pff.segments.iter()
    }
}

archive_constructors!(PffArchive);

impl<R: Read + Seek> Extract for PffArchive<R> {
    fn entry_count(&self) -> usize {
        self.pff.segments.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let seg = &self.pff.segments[index];
        debug!(
            index,
            offset = seg.file_location,
            size = seg.file_size,
            deleted = seg.deleted,
            "pff segment"
        );
        let data = self
            .source
            .read_range(seg.file_location as u64, seg.file_size as u64)?;
        Ok(ExtractedEntry::new(seg.file_name.clone(), data))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pff3(segment_size: u32, name: &str, data: &[u8]) -> Vec<u8> {
        let list = 0x14 + data.len() as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&0x14u32.to_le_bytes());
        out.extend_from_slice(b"PFF3");
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&segment_size.to_le_bytes());
        out.extend_from_slice(&list.to_le_bytes());
        out.extend_from_slice(data);

        let mut seg = Vec::new();
        seg.extend_from_slice(&1u32.to_le_bytes());
        seg.extend_from_slice(&0x14u32.to_le_bytes());
        seg.extend_from_slice(&(data.len() as u32).to_le_bytes());
        seg.extend_from_slice(&0x3C00_0000u32.to_le_bytes());
        let mut field = [0u8; 16];
        field[..name.len()].copy_from_slice(name.as_bytes());
        seg.extend_from_slice(&field);
        seg.resize(segment_size as usize, 0);
        out.extend(seg);
        out
    }

    #[test]
    fn optional_fields_follow_segment_size() {
        let short = PffArchive::from_bytes(pff3(0x20, "A.TXT", b"abc"), 0).unwrap();
        assert_eq!(short.pff.version, PffVersion::Pff3);
        assert_eq!(short.pff.segments[0].modified_date, None);

        let long = PffArchive::from_bytes(pff3(0x28, "A.TXT", b"abc"), 0).unwrap();
        assert_eq!(long.pff.segments[0].modified_date, Some(0));
        assert_eq!(long.pff.segments[0].compression_level, Some(0));
    }

    #[test]
    fn deleted_segments_still_extract() {
        let a = PffArchive::from_bytes(pff3(0x24, "MAP.BMS", b"data"), 0).unwrap();
        assert!(a.pff.segments[0].deleted);
        assert_eq!(
            a.read_entry(0).unwrap(),
            ExtractedEntry::new("MAP.BMS", b"data".to_vec())
        );
    }

    #[test]
    fn unknown_signature() {
        let mut data = pff3(0x20, "A", b"x");
        data[4..8].copy_from_slice(b"PFF9");
        assert!(matches!(PffArchive::from_bytes(data, 0), Err(Error::BadMagic)));
    }
}
