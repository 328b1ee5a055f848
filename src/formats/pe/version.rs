//! `RT_VERSION` - VS_VERSIONINFO.
//!
//! Every node of the version tree has the same header:
//! ```text
//! [0x00] Length       (u16 LE, whole node including children)
//! [0x02] ValueLength  (u16 LE, bytes for binary values, words for text)
//! [0x04] Type         (u16 LE, 0 binary / 1 text)
//! [0x06] Key          (UTF-16, null-terminated)
//!        padding to 4
//!        Value
//!        padding to 4
//!        Children
//! ```
//!
//! The root (`VS_VERSION_INFO`) holds a VS_FIXEDFILEINFO value and up to two
//! children: `StringFileInfo` (string tables keyed by language/code page)
//! and `VarFileInfo` (the `Translation` list).

use std::io::{Cursor, Seek, SeekFrom};

use crate::utils::{align, bytesv, fixed_utf16, le_u16, le_u32, read_utf16z};
use crate::{Error, Result};

pub const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;

const MAX_DEPTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFileInfo {
    pub struct_version: u32,
    pub file_version_ms: u32,
    pub file_version_ls: u32,
    pub product_version_ms: u32,
    pub product_version_ls: u32,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date_ms: u32,
    pub file_date_ls: u32,
}

impl FixedFileInfo {
    fn parse(value: &[u8]) -> Result<Self> {
        let r = &mut Cursor::new(value);
        if le_u32(r)? != FIXED_FILE_INFO_SIGNATURE {
            return Err(Error::BadMagic);
        }
        Ok(Self {
            struct_version: le_u32(r)?,
            file_version_ms: le_u32(r)?,
            file_version_ls: le_u32(r)?,
            product_version_ms: le_u32(r)?,
            product_version_ls: le_u32(r)?,
            file_flags_mask: le_u32(r)?,
            file_flags: le_u32(r)?,
            file_os: le_u32(r)?,
            file_type: le_u32(r)?,
            file_subtype: le_u32(r)?,
            file_date_ms: le_u32(r)?,
            file_date_ls: le_u32(r)?,
        })
    }

    /// `major.minor.build.revision`.
    pub fn file_version(&self) -> [u16; 4] {
        split_version(self.file_version_ms, self.file_version_ls)
    }

    pub fn product_version(&self) -> [u16; 4] {
        split_version(self.product_version_ms, self.product_version_ls)
    }
}

fn split_version(ms: u32, ls: u32) -> [u16; 4] {
    [(ms >> 16) as u16, ms as u16, (ls >> 16) as u16, ls as u16]
}

/// One language/code-page table of `StringFileInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTable {
    /// Eight hex digits, e.g. `040904b0`.
    pub key: String,
    pub strings: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionInfo {
    pub fixed: Option<FixedFileInfo>,
    pub string_file_info: Vec<StringTable>,
    /// `(language, code page)` pairs from `VarFileInfo\Translation`.
    pub var_file_info: Vec<(u16, u16)>,
}

/// A raw version tree node.
struct Node {
    key: String,
    value: Vec<u8>,
    children: Vec<Node>,
}

fn parse_node(c: &mut Cursor<&[u8]>, depth: usize) -> Result<Node> {
    if depth > MAX_DEPTH {
        return Err(Error::Parse("version info too deep"));
    }
    let start = c.position();
    let length = le_u16(c)? as u64;
    let value_length = le_u16(c)? as u64;
    let text = le_u16(c)? == 1;
    let end = start + length;
    if length < 6 || end > c.get_ref().len() as u64 {
        return Err(Error::InvalidRange);
    }

    let key = read_utf16z(c)?;
    align(c, 0, 4)?;
    let value_bytes = if text { value_length * 2 } else { value_length };
    let available = end.saturating_sub(c.position());
    let value = bytesv(c, value_bytes.min(available) as usize)?;
    align(c, 0, 4)?;

    let mut children = Vec::new();
    while c.position() + 6 <= end {
        children.push(parse_node(c, depth + 1)?);
        align(c, 0, 4)?;
    }
    c.seek(SeekFrom::Start(end))?;

    Ok(Node {
        key,
        value,
        children,
    })
}

impl VersionInfo {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let root = parse_node(&mut Cursor::new(data), 0)?;
        if root.key != "VS_VERSION_INFO" {
            return Err(Error::Parse("not a VS_VERSION_INFO block"));
        }

        let mut info = Self {
            fixed: if root.value.is_empty() {
                None
            } else {
                Some(FixedFileInfo::parse(&root.value)?)
            },
            ..Self::default()
        };

        for child in &root.children {
            match child.key.as_str() {
                "StringFileInfo" => {
                    for table in &child.children {
                        info.string_file_info.push(StringTable {
                            key: table.key.clone(),
                            strings: table
                                .children
                                .iter()
                                .map(|s| (s.key.clone(), fixed_utf16(&s.value)))
                                .collect(),
                        });
                    }
                }
                "VarFileInfo" => {
                    for var in child.children.iter().filter(|v| v.key == "Translation") {
                        info.var_file_info.extend(
                            var.value
                                .chunks_exact(4)
                                .map(|p| {
                                    (
                                        u16::from_le_bytes([p[0], p[1]]),
                                        u16::from_le_bytes([p[2], p[3]]),
                                    )
                                }),
                        );
                    }
                }
                _ => {}
            }
        }

        Ok(info)
    }

    /// Look `key` up case-insensitively; the first match across all string
    /// tables wins.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.string_file_info
            .iter()
            .flat_map(|t| t.strings.iter())
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn utf16z(s: &str) -> Vec<u8> {
        s.encode_utf16()
            .chain([0])
            .flat_map(u16::to_le_bytes)
            .collect()
    }

    /// Serialise one node; `value_length` follows the text/binary rule.
    pub(crate) fn node(key: &str, text: bool, value: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![0u8; 6];
        out.extend(utf16z(key));
        out.resize(out.len().div_ceil(4) * 4, 0);
        out.extend_from_slice(value);
        for child in children {
            out.resize(out.len().div_ceil(4) * 4, 0);
            out.extend_from_slice(child);
        }
        let value_length = if text { value.len() / 2 } else { value.len() };
        let length = out.len() as u16;
        out[0..2].copy_from_slice(&length.to_le_bytes());
        out[2..4].copy_from_slice(&(value_length as u16).to_le_bytes());
        out[4..6].copy_from_slice(&(text as u16).to_le_bytes());
        out
    }

    pub(crate) fn sample() -> Vec<u8> {
        let mut fixed = FIXED_FILE_INFO_SIGNATURE.to_le_bytes().to_vec();
        fixed.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        fixed.extend_from_slice(&0x0002_0003u32.to_le_bytes());
        fixed.extend_from_slice(&0x0004_0005u32.to_le_bytes());
        fixed.extend_from_slice(&[0; 36]);

        let strings = node(
            "040904b0",
            true,
            &[],
            &[
                node("CompanyName", true, &utf16z("Valve"), &[]),
                node("FileVersion", true, &utf16z("2.3.4.5"), &[]),
            ],
        );
        let string_info = node("StringFileInfo", true, &[], &[strings]);
        let translation = node("Translation", false, &[0x09, 0x04, 0xB0, 0x04], &[]);
        let var_info = node("VarFileInfo", true, &[], &[translation]);
        node("VS_VERSION_INFO", false, &fixed, &[string_info, var_info])
    }

    #[test]
    fn full_version_tree() {
        let info = VersionInfo::parse(&sample()).unwrap();
        let fixed = info.fixed.unwrap();
        assert_eq!(fixed.file_version(), [2, 3, 4, 5]);
        assert_eq!(info.string_file_info[0].key, "040904b0");
        assert_eq!(info.var_file_info, vec![(0x0409, 0x04B0)]);
    }

    #[test]
    fn string_lookup_ignores_case() {
        let info = VersionInfo::parse(&sample()).unwrap();
        assert_eq!(info.get_string("companyname"), Some("Valve"));
        assert_eq!(info.get_string("FILEVERSION"), Some("2.3.4.5"));
        assert_eq!(info.get_string("ProductName"), None);
    }

    #[test]
    fn bad_fixed_signature() {
        let data = node("VS_VERSION_INFO", false, &[0; 52], &[]);
        assert!(matches!(VersionInfo::parse(&data), Err(Error::BadMagic)));
    }

    #[test]
    fn wrong_root_key() {
        let data = node("SOMETHING", false, &[], &[]);
        assert!(VersionInfo::parse(&data).is_err());
    }
}
