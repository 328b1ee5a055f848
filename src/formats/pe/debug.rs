//! Debug directory and CodeView records.
//!
//! ## IMAGE_DEBUG_DIRECTORY (0x1C bytes)
//! ```text
//! [0x00] Characteristics           (u32 LE)
//! [0x04] TimeDateStamp             (u32 LE)
//! [0x08] MajorVersion, MinorVersion (u16, u16)
//! [0x0C] Type                      (u32 LE, 2 = CodeView)
//! [0x10] SizeOfData                (u32 LE)
//! [0x14] AddressOfRawData          (u32 LE)
//! [0x18] PointerToRawData          (u32 LE)
//! ```
//!
//! ## CodeView
//! ```text
//! "NB10" Offset (u32), Signature (u32), Age (u32), PdbPath (C string)
//! "RSDS" Guid (16 bytes), Age (u32), PdbPath (C string, UTF-8)
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Cursor;

use tracing::{debug, warn};

use crate::utils::{bytesa, le_u16, le_u32, read_null_string};
use crate::{Error, Result};

pub const DEBUG_ENTRY_SIZE: usize = 0x1C;
pub const DEBUG_TYPE_CODEVIEW: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugDirectoryEntry {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub kind: u32,
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

/// A decoded CodeView record naming a program database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeView {
    Nb10 {
        offset: u32,
        signature: u32,
        age: u32,
        pdb_path: String,
    },
    Rsds {
        guid: [u8; 16],
        age: u32,
        pdb_path: String,
    },
}

impl CodeView {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let r = &mut Cursor::new(data);
        match &bytesa::<4>(r)? {
            b"NB10" => Ok(Self::Nb10 {
                offset: le_u32(r)?,
                signature: le_u32(r)?,
                age: le_u32(r)?,
                pdb_path: read_null_string(r)?,
            }),
            b"RSDS" => Ok(Self::Rsds {
                guid: bytesa::<16>(r)?,
                age: le_u32(r)?,
                pdb_path: read_null_string(r)?,
            }),
            _ => Err(Error::BadMagic),
        }
    }

    pub fn pdb_path(&self) -> &str {
        match self {
            Self::Nb10 { pdb_path, .. } | Self::Rsds { pdb_path, .. } => pdb_path,
        }
    }

    /// Symbol server key: GUID (or signature) in upper-case hex followed by
    /// the age.
    pub fn symbol_key(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Nb10 { signature, age, .. } => {
                let _ = write!(out, "{signature:08X}{age:X}");
            }
            Self::Rsds { guid, age, .. } => {
                let d1 = u32::from_le_bytes([guid[0], guid[1], guid[2], guid[3]]);
                let d2 = u16::from_le_bytes([guid[4], guid[5]]);
                let d3 = u16::from_le_bytes([guid[6], guid[7]]);
                let _ = write!(out, "{d1:08X}{d2:04X}{d3:04X}");
                for b in &guid[8..] {
                    let _ = write!(out, "{b:02X}");
                }
                let _ = write!(out, "{age:X}");
            }
        }
        out
    }
}

/// Split the debug directory table into its entries.
pub fn parse_debug_directory(data: &[u8]) -> Result<Vec<DebugDirectoryEntry>> {
    if data.len() % DEBUG_ENTRY_SIZE != 0 {
        return Err(Error::Parse("debug directory size not a multiple of 28"));
    }
    data.chunks_exact(DEBUG_ENTRY_SIZE)
        .map(|chunk| {
            let r = &mut Cursor::new(chunk);
            Ok(DebugDirectoryEntry {
                characteristics: le_u32(r)?,
                time_date_stamp: le_u32(r)?,
                major_version: le_u16(r)?,
                minor_version: le_u16(r)?,
                kind: le_u32(r)?,
                size_of_data: le_u32(r)?,
                address_of_raw_data: le_u32(r)?,
                pointer_to_raw_data: le_u32(r)?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebugCache {
    pub entries: Vec<DebugDirectoryEntry>,
    /// Decoded CodeView records by table index.
    pub code_view: BTreeMap<usize, CodeView>,
    /// Undecoded data by table index.
    pub raw: BTreeMap<usize, Vec<u8>>,
}

impl DebugCache {
    /// First CodeView record, the one debuggers use.
    pub fn pdb(&self) -> Option<&CodeView> {
        self.code_view.values().next()
    }
}

/// Read every entry's data with `read`; CodeView data is decoded, anything
/// else (including CodeView that fails to decode) is kept raw.
pub fn walk_debug<F>(entries: Vec<DebugDirectoryEntry>, mut read: F) -> DebugCache
where
    F: FnMut(&DebugDirectoryEntry) -> Result<Vec<u8>>,
{
    let mut cache = DebugCache::default();
    for (index, entry) in entries.iter().enumerate() {
        let data = match read(entry) {
            Ok(data) => data,
            Err(e) => {
                warn!(index, error = %e, "debug data unreadable");
                continue;
            }
        };
        if entry.kind == DEBUG_TYPE_CODEVIEW {
            match CodeView::parse(&data) {
                Ok(cv) => {
                    debug!(index, pdb = cv.pdb_path(), "codeview record");
                    cache.code_view.insert(index, cv);
                    continue;
                }
                Err(e) => warn!(index, error = %e, "codeview decode failed, keeping raw bytes"),
            }
        }
        cache.raw.insert(index, data);
    }
    cache.entries = entries;
    cache
}
