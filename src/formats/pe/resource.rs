//! Resource directory tree and the typed walk over it.
//!
//! ## IMAGE_RESOURCE_DIRECTORY (0x10 bytes)
//! ```text
//! [0x00] Characteristics           (u32 LE)
//! [0x04] TimeDateStamp             (u32 LE)
//! [0x08] MajorVersion, MinorVersion (u16, u16)
//! [0x0C] NamedEntryCount           (u16 LE)
//! [0x0E] IdEntryCount              (u16 LE)
//! [0x10] Entries                   (count × 8 bytes)
//! ```
//!
//! ## Entry (8 bytes)
//! ```text
//! [0x00] NameOrId  (u32; top bit set: offset of a counted UTF-16 name)
//! [0x04] Offset    (u32; top bit set: subdirectory, else data entry)
//! ```
//!
//! ## IMAGE_RESOURCE_DATA_ENTRY (0x10 bytes)
//! ```text
//! DataRva (u32), Size (u32), CodePage (u32), Reserved (u32)
//! ```
//!
//! All offsets are relative to the start of the resource directory.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{Cursor, Seek, SeekFrom};

use tracing::{debug, warn};

use super::manifest::AssemblyManifest;
use super::typed::{
    Accelerator, Dialog, Menu, MessageTable, parse_accelerators, parse_dialog, parse_menu,
    parse_message_table, parse_string_table,
};
use super::version::VersionInfo;
use crate::utils::{le_u16, le_u32, read_utf16};
use crate::{Error, Result};

pub const RT_CURSOR: u16 = 1;
pub const RT_BITMAP: u16 = 2;
pub const RT_ICON: u16 = 3;
pub const RT_MENU: u16 = 4;
pub const RT_DIALOG: u16 = 5;
pub const RT_STRING: u16 = 6;
pub const RT_FONTDIR: u16 = 7;
pub const RT_FONT: u16 = 8;
pub const RT_ACCELERATOR: u16 = 9;
pub const RT_RCDATA: u16 = 10;
pub const RT_MESSAGETABLE: u16 = 11;
pub const RT_GROUP_CURSOR: u16 = 12;
pub const RT_GROUP_ICON: u16 = 14;
pub const RT_VERSION: u16 = 16;
pub const RT_DLGINCLUDE: u16 = 17;
pub const RT_PLUGPLAY: u16 = 19;
pub const RT_VXD: u16 = 20;
pub const RT_ANICURSOR: u16 = 21;
pub const RT_ANIICON: u16 = 22;
pub const RT_HTML: u16 = 23;
pub const RT_MANIFEST: u16 = 24;

/// Nesting allowed below the root; real images use three levels.
const MAX_DEPTH: usize = 8;

/// `RT_*` name of a predefined resource type.
pub fn type_name(id: u16) -> Option<&'static str> {
    Some(match id {
        RT_CURSOR => "RT_CURSOR",
        RT_BITMAP => "RT_BITMAP",
        RT_ICON => "RT_ICON",
        RT_MENU => "RT_MENU",
        RT_DIALOG => "RT_DIALOG",
        RT_STRING => "RT_STRING",
        RT_FONTDIR => "RT_FONTDIR",
        RT_FONT => "RT_FONT",
        RT_ACCELERATOR => "RT_ACCELERATOR",
        RT_RCDATA => "RT_RCDATA",
        RT_MESSAGETABLE => "RT_MESSAGETABLE",
        RT_GROUP_CURSOR => "RT_GROUP_CURSOR",
        RT_GROUP_ICON => "RT_GROUP_ICON",
        RT_VERSION => "RT_VERSION",
        RT_DLGINCLUDE => "RT_DLGINCLUDE",
        RT_PLUGPLAY => "RT_PLUGPLAY",
        RT_VXD => "RT_VXD",
        RT_ANICURSOR => "RT_ANICURSOR",
        RT_ANIICON => "RT_ANIICON",
        RT_HTML => "RT_HTML",
        RT_MANIFEST => "RT_MANIFEST",
        _ => return None,
    })
}

/// Discriminator of one directory entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKey {
    Id(u16),
    Name(String),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDataEntry {
    pub data_rva: u32,
    pub size: u32,
    pub code_page: u32,
    pub reserved: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceNode {
    Directory(ResourceDirectory),
    Data(ResourceDataEntry),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub key: ResourceKey,
    pub node: ResourceNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub entries: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceTree {
    pub root: ResourceDirectory,
}

struct TreeParser<'a> {
    cursor: Cursor<&'a [u8]>,
    /// Directory offsets on the current path.
    active: HashSet<u32>,
}

impl TreeParser<'_> {
    fn directory(&mut self, offset: u32, depth: usize) -> Result<ResourceDirectory> {
        if depth > MAX_DEPTH {
            return Err(Error::Parse("resource tree too deep"));
        }
        if !self.active.insert(offset) {
            return Err(Error::Parse("resource directory cycle"));
        }

        let c = &mut self.cursor;
        c.seek(SeekFrom::Start(offset as u64))?;
        let characteristics = le_u32(c)?;
        let time_date_stamp = le_u32(c)?;
        let major_version = le_u16(c)?;
        let minor_version = le_u16(c)?;
        let count = le_u16(c)? as u32 + le_u16(c)? as u32;

        let mut raw = Vec::with_capacity(count as usize);
        for _ in 0..count {
            raw.push((le_u32(c)?, le_u32(c)?));
        }

        let mut entries = Vec::with_capacity(raw.len());
        for (name, target) in raw {
            let key = if name & 0x8000_0000 != 0 {
                self.cursor
                    .seek(SeekFrom::Start((name & 0x7FFF_FFFF) as u64))?;
                let len = le_u16(&mut self.cursor)? as usize;
                ResourceKey::Name(read_utf16(&mut self.cursor, len)?)
            } else {
                ResourceKey::Id(name as u16)
            };
            let node = if target & 0x8000_0000 != 0 {
                ResourceNode::Directory(self.directory(target & 0x7FFF_FFFF, depth + 1)?)
            } else {
                ResourceNode::Data(self.data_entry(target)?)
            };
            entries.push(ResourceEntry { key, node });
        }

        self.active.remove(&offset);
        Ok(ResourceDirectory {
            characteristics,
            time_date_stamp,
            major_version,
            minor_version,
            entries,
        })
    }

    fn data_entry(&mut self, offset: u32) -> Result<ResourceDataEntry> {
        let c = &mut self.cursor;
        c.seek(SeekFrom::Start(offset as u64))?;
        Ok(ResourceDataEntry {
            data_rva: le_u32(c)?,
            size: le_u32(c)?,
            code_page: le_u32(c)?,
            reserved: le_u32(c)?,
        })
    }
}

impl ResourceTree {
    /// Parse the tree from the resource directory bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = TreeParser {
            cursor: Cursor::new(data),
            active: HashSet::new(),
        };
        Ok(Self {
            root: parser.directory(0, 0)?,
        })
    }

    /// Every data leaf with its key path, depth-first in table order.
    pub fn leaves(&self) -> Vec<(Vec<ResourceKey>, ResourceDataEntry)> {
        fn visit(
            dir: &ResourceDirectory,
            path: &mut Vec<ResourceKey>,
            out: &mut Vec<(Vec<ResourceKey>, ResourceDataEntry)>,
        ) {
            for entry in &dir.entries {
                path.push(entry.key.clone());
                match &entry.node {
                    ResourceNode::Directory(sub) => visit(sub, path, out),
                    ResourceNode::Data(data) => out.push((path.clone(), *data)),
                }
                path.pop();
            }
        }

        let mut out = Vec::new();
        visit(&self.root, &mut Vec::new(), &mut out);
        out
    }
}

/// A decoded resource leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceValue {
    /// String ID and text.
    StringTable(Vec<(u32, String)>),
    Version(VersionInfo),
    Menu(Menu),
    Dialog(Dialog),
    Accelerators(Vec<Accelerator>),
    MessageTable(MessageTable),
    Manifest(AssemblyManifest),
    Raw(Vec<u8>),
}

/// Result of one resource walk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceCache {
    /// Decoded leaves keyed by their path joined with `", "`.
    pub entries: BTreeMap<String, ResourceValue>,
    /// Version info of the last `RT_VERSION` leaf decoded.
    pub version: Option<VersionInfo>,
    /// Manifest of the last `RT_MANIFEST` leaf decoded.
    pub manifest: Option<AssemblyManifest>,
}

impl ResourceCache {
    pub fn get(&self, path: &str) -> Option<&ResourceValue> {
        self.entries.get(path)
    }
}

fn decode(path: &[ResourceKey], data: &[u8]) -> Result<ResourceValue> {
    let kind = match path.first() {
        Some(ResourceKey::Id(id)) => *id,
        _ => return Ok(ResourceValue::Raw(data.to_vec())),
    };
    Ok(match kind {
        RT_STRING => {
            let block = match path.get(1) {
                Some(ResourceKey::Id(block)) => *block,
                _ => return Err(Error::Parse("string table without numeric block id")),
            };
            ResourceValue::StringTable(parse_string_table(block, data)?)
        }
        RT_VERSION => ResourceValue::Version(VersionInfo::parse(data)?),
        RT_MENU => ResourceValue::Menu(parse_menu(data)?),
        RT_DIALOG => ResourceValue::Dialog(parse_dialog(data)?),
        RT_ACCELERATOR => ResourceValue::Accelerators(parse_accelerators(data)?),
        RT_MESSAGETABLE => ResourceValue::MessageTable(parse_message_table(data)?),
        RT_MANIFEST => ResourceValue::Manifest(AssemblyManifest::parse(data)?),
        _ => ResourceValue::Raw(data.to_vec()),
    })
}

/// Walk `tree` depth-first, decoding every leaf by its top-level type.
///
/// `read_leaf` fetches a leaf's bytes. A leaf that fails to decode is kept
/// as [`ResourceValue::Raw`]; a leaf that cannot be read is skipped. Neither
/// stops the walk.
pub fn walk_resources<F>(tree: &ResourceTree, mut read_leaf: F) -> ResourceCache
where
    F: FnMut(&ResourceDataEntry) -> Result<Vec<u8>>,
{
    let mut cache = ResourceCache::default();

    for (path, entry) in tree.leaves() {
        let key = path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let data = match read_leaf(&entry) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %key, error = %e, "resource leaf unreadable");
                continue;
            }
        };

        let value = decode(&path, &data).unwrap_or_else(|e| {
            warn!(path = %key, error = %e, "resource decode failed, keeping raw bytes");
            ResourceValue::Raw(data)
        });
        debug!(path = %key, "resource decoded");

        match &value {
            ResourceValue::Version(info) => cache.version = Some(info.clone()),
            ResourceValue::Manifest(manifest) => cache.manifest = Some(manifest.clone()),
            _ => {}
        }
        cache.entries.insert(key, value);
    }

    cache
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Build a three-level tree: one leaf per `(type, name, language)`.
    /// Leaf data entries point at RVA `0x1000 + offset` where the bytes are
    /// appended after the tree.
    pub(crate) fn tree_bytes(leaves: &[(ResourceKey, u16, u16, &[u8])]) -> Vec<u8> {
        // Layout: root, then per leaf a name dir and a language dir, then
        // data entries, then names, then payloads.
        let n = leaves.len();
        let dir = |count: usize| 16 + count * 8;
        let root_size = dir(n);
        let sub_size = dir(1);
        let names_dirs = root_size;
        let lang_dirs = names_dirs + n * sub_size;
        let data_entries = lang_dirs + n * sub_size;
        let strings = data_entries + n * 16;

        let mut string_blob = Vec::new();
        let mut string_offsets = Vec::new();
        for (key, ..) in leaves {
            string_offsets.push(strings + string_blob.len());
            if let ResourceKey::Name(name) = key {
                let units: Vec<u16> = name.encode_utf16().collect();
                string_blob.extend_from_slice(&(units.len() as u16).to_le_bytes());
                for u in units {
                    string_blob.extend_from_slice(&u.to_le_bytes());
                }
            }
        }
        let payloads = (strings + string_blob.len()).div_ceil(4) * 4;

        let header = |out: &mut Vec<u8>, named: u16, ids: u16| {
            out.extend_from_slice(&[0; 12]);
            out.extend_from_slice(&named.to_le_bytes());
            out.extend_from_slice(&ids.to_le_bytes());
        };

        let mut out = Vec::new();
        let named = leaves
            .iter()
            .filter(|(k, ..)| matches!(k, ResourceKey::Name(_)))
            .count() as u16;
        header(&mut out, named, n as u16 - named);
        for (i, (key, ..)) in leaves.iter().enumerate() {
            let name = match key {
                ResourceKey::Id(id) => *id as u32,
                ResourceKey::Name(_) => 0x8000_0000 | string_offsets[i] as u32,
            };
            out.extend_from_slice(&name.to_le_bytes());
            let child = 0x8000_0000 | (names_dirs + i * sub_size) as u32;
            out.extend_from_slice(&child.to_le_bytes());
        }
        for (i, (_, name, ..)) in leaves.iter().enumerate() {
            header(&mut out, 0, 1);
            out.extend_from_slice(&(*name as u32).to_le_bytes());
            out.extend_from_slice(&(0x8000_0000 | (lang_dirs + i * sub_size) as u32).to_le_bytes());
        }
        for (i, (_, _, lang, _)) in leaves.iter().enumerate() {
            header(&mut out, 0, 1);
            out.extend_from_slice(&(*lang as u32).to_le_bytes());
            out.extend_from_slice(&((data_entries + i * 16) as u32).to_le_bytes());
        }
        let mut payload_offset = payloads;
        for (.., data) in leaves {
            out.extend_from_slice(&(0x1000 + payload_offset as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&[0; 8]);
            payload_offset = (payload_offset + data.len()).div_ceil(4) * 4;
        }
        out.extend_from_slice(&string_blob);
        for (.., data) in leaves {
            out.resize(out.len().div_ceil(4) * 4, 0);
            out.extend_from_slice(data);
        }
        out
    }

    /// Read leaves straight out of the tree bytes (RVA base 0x1000).
    pub(crate) fn reader(tree: &[u8]) -> impl FnMut(&ResourceDataEntry) -> Result<Vec<u8>> + '_ {
        move |entry| {
            let start = (entry.data_rva - 0x1000) as usize;
            tree.get(start..start + entry.size as usize)
                .map(<[u8]>::to_vec)
                .ok_or(Error::InvalidRange)
        }
    }

    fn string_block() -> Vec<u8> {
        let mut out = Vec::new();
        for i in 0..16u16 {
            let text: &[u16] = match i {
                0 => &[0x48, 0x69],
                3 => &[0x4F, 0x4B],
                _ => &[],
            };
            out.extend_from_slice(&(text.len() as u16).to_le_bytes());
            for u in text {
                out.extend_from_slice(&u.to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn leaves_follow_table_order() {
        let data = tree_bytes(&[
            (ResourceKey::Name("PNG".into()), 1, 1033, &b"png"[..]),
            (ResourceKey::Id(RT_RCDATA), 7, 0, &b"raw"[..]),
        ]);
        let tree = ResourceTree::parse(&data).unwrap();
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(
            leaves[0].0,
            vec![ResourceKey::Name("PNG".into()), ResourceKey::Id(1), ResourceKey::Id(1033)]
        );
        assert_eq!(leaves[1].1.size, 3);
    }

    #[test]
    fn walk_decodes_by_type_and_falls_back_to_raw() {
        let strings = string_block();
        let data = tree_bytes(&[
            (ResourceKey::Id(RT_STRING), 2, 1033, &strings[..]),
            (ResourceKey::Id(RT_VERSION), 1, 1033, &b"junk"[..]),
            (ResourceKey::Id(RT_RCDATA), 5, 0, &b"blob"[..]),
        ]);
        let tree = ResourceTree::parse(&data).unwrap();
        let cache = walk_resources(&tree, reader(&data));

        assert_eq!(
            cache.get("6, 2, 1033"),
            Some(&ResourceValue::StringTable(vec![
                (16, "Hi".into()),
                (19, "OK".into())
            ]))
        );
        assert_eq!(
            cache.get("16, 1, 1033"),
            Some(&ResourceValue::Raw(b"junk".to_vec()))
        );
        assert_eq!(cache.get("10, 5, 0"), Some(&ResourceValue::Raw(b"blob".to_vec())));
        assert!(cache.version.is_none());
    }

    #[test]
    fn walk_is_repeatable() {
        let strings = string_block();
        let data = tree_bytes(&[
            (ResourceKey::Id(RT_STRING), 1, 1033, &strings[..]),
            (ResourceKey::Name("CUSTOM".into()), 3, 0, &b"x"[..]),
        ]);
        let tree = ResourceTree::parse(&data).unwrap();
        let first = walk_resources(&tree, reader(&data));
        let second = walk_resources(&tree, reader(&data));
        assert_eq!(first, second);
        assert_eq!(first.entries.len(), 2);
    }

    #[test]
    fn unreadable_leaf_is_skipped() {
        let data = tree_bytes(&[(ResourceKey::Id(RT_RCDATA), 1, 0, &b"abc"[..])]);
        let tree = ResourceTree::parse(&data).unwrap();
        let cache = walk_resources(&tree, |_| Err(Error::InvalidRange));
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn self_referencing_directory_is_rejected() {
        let mut data = vec![0u8; 16];
        data[14..16].copy_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&0x8000_0000u32.to_le_bytes());
        assert!(matches!(
            ResourceTree::parse(&data),
            Err(Error::Parse("resource directory cycle"))
        ));
    }
}
