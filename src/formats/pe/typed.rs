//! Decoders for the structured resource types: string tables, menus,
//! dialogs, accelerator tables and message tables.

use std::io::{Cursor, Seek, SeekFrom};

use crate::utils::{align, bytesv, le_i16, le_u16, le_u32, read_utf16, read_utf16z, u8};
use crate::{Error, Result};

/// `RT_STRING` block `block` holds IDs `(block - 1) * 16 .. +16`.
///
/// Each slot is a counted UTF-16 string; empty slots are omitted.
pub fn parse_string_table(block: u16, data: &[u8]) -> Result<Vec<(u32, String)>> {
    if block == 0 {
        return Err(Error::Parse("string table block 0"));
    }
    let base = (block as u32 - 1) * 16;
    let r = &mut Cursor::new(data);
    let mut out = Vec::new();
    for i in 0..16 {
        let len = le_u16(r)? as usize;
        if len > 0 {
            out.push((base + i, read_utf16(r, len)?));
        }
    }
    Ok(out)
}

/// Menu item flag: the item opens a submenu.
const MF_POPUP: u16 = 0x0010;
/// Menu item flag: last item of its level.
const MF_END: u16 = 0x0080;
/// MENUEX `bResInfo`: the item opens a submenu.
const MFR_POPUP: u16 = 0x0001;
/// MENUEX `bResInfo`: last item of its level.
const MFR_END: u16 = 0x0080;

const MAX_MENU_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MenuItem {
    pub id: u32,
    pub text: String,
    /// `fItemFlags` for standard menus, `dwType` for MENUEX.
    pub flags: u32,
    /// MENUEX `dwState`.
    pub state: u32,
    /// MENUEX popup help ID.
    pub help_id: u32,
    pub children: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub extended: bool,
    pub items: Vec<MenuItem>,
}

fn menu_items(r: &mut Cursor<&[u8]>, depth: usize) -> Result<Vec<MenuItem>> {
    if depth > MAX_MENU_DEPTH {
        return Err(Error::Parse("menu too deep"));
    }
    let mut items = Vec::new();
    loop {
        let flags = le_u16(r)?;
        let id = if flags & MF_POPUP == 0 { le_u16(r)? as u32 } else { 0 };
        let text = read_utf16z(r)?;
        let children = if flags & MF_POPUP != 0 {
            menu_items(r, depth + 1)?
        } else {
            Vec::new()
        };
        items.push(MenuItem {
            id,
            text,
            flags: flags as u32,
            children,
            ..MenuItem::default()
        });
        if flags & MF_END != 0 {
            return Ok(items);
        }
    }
}

fn menu_ex_items(r: &mut Cursor<&[u8]>, depth: usize) -> Result<Vec<MenuItem>> {
    if depth > MAX_MENU_DEPTH {
        return Err(Error::Parse("menu too deep"));
    }
    let mut items = Vec::new();
    loop {
        let flags = le_u32(r)?;
        let state = le_u32(r)?;
        let id = le_u32(r)?;
        let res_info = le_u16(r)?;
        let text = read_utf16z(r)?;
        align(r, 0, 4)?;
        let (help_id, children) = if res_info & MFR_POPUP != 0 {
            let help_id = le_u32(r)?;
            (help_id, menu_ex_items(r, depth + 1)?)
        } else {
            (0, Vec::new())
        };
        items.push(MenuItem {
            id,
            text,
            flags,
            state,
            help_id,
            children,
        });
        if res_info & MFR_END != 0 {
            return Ok(items);
        }
    }
}

/// `RT_MENU`: MENUHEADER (version 0) or MENUEX_TEMPLATE_HEADER (version 1).
pub fn parse_menu(data: &[u8]) -> Result<Menu> {
    let r = &mut Cursor::new(data);
    let version = le_u16(r)?;
    let offset = le_u16(r)?;
    match version {
        0 => {
            r.seek(SeekFrom::Current(offset as i64))?;
            Ok(Menu {
                extended: false,
                items: menu_items(r, 0)?,
            })
        }
        1 => {
            // Offset counts from the end of the offset field.
            r.seek(SeekFrom::Start(4 + offset as u64))?;
            Ok(Menu {
                extended: true,
                items: menu_ex_items(r, 0)?,
            })
        }
        v => Err(Error::UnsupportedVersion(v as u32)),
    }
}

/// `sz_Or_Ord` field of dialog templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOrOrdinal {
    None,
    Ordinal(u16),
    Name(String),
}

fn name_or_ordinal(r: &mut Cursor<&[u8]>) -> Result<NameOrOrdinal> {
    match le_u16(r)? {
        0x0000 => Ok(NameOrOrdinal::None),
        0xFFFF => Ok(NameOrOrdinal::Ordinal(le_u16(r)?)),
        _ => {
            r.seek(SeekFrom::Current(-2))?;
            Ok(NameOrOrdinal::Name(read_utf16z(r)?))
        }
    }
}

/// DS_SETFONT; the template carries a font block.
const DS_SETFONT: u32 = 0x0040;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogFont {
    pub point_size: u16,
    /// DIALOGEX only.
    pub weight: u16,
    pub italic: bool,
    pub charset: u8,
    pub typeface: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogItem {
    pub help_id: u32,
    pub style: u32,
    pub ext_style: u32,
    pub rect: (i16, i16, i16, i16),
    pub id: u32,
    pub class: NameOrOrdinal,
    pub title: NameOrOrdinal,
    pub creation_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub extended: bool,
    pub help_id: u32,
    pub style: u32,
    pub ext_style: u32,
    pub rect: (i16, i16, i16, i16),
    pub menu: NameOrOrdinal,
    pub class: NameOrOrdinal,
    pub title: String,
    pub font: Option<DialogFont>,
    pub items: Vec<DialogItem>,
}

fn rect(r: &mut Cursor<&[u8]>) -> Result<(i16, i16, i16, i16)> {
    Ok((le_i16(r)?, le_i16(r)?, le_i16(r)?, le_i16(r)?))
}

/// `RT_DIALOG`: DLGTEMPLATE or DLGTEMPLATEEX (version 1, signature 0xFFFF).
pub fn parse_dialog(data: &[u8]) -> Result<Dialog> {
    let r = &mut Cursor::new(data);
    let extended = data.len() >= 4 && data[0..4] == [0x01, 0x00, 0xFF, 0xFF];

    let (help_id, ext_style, style) = if extended {
        r.seek(SeekFrom::Start(4))?;
        let help_id = le_u32(r)?;
        let ext_style = le_u32(r)?;
        (help_id, ext_style, le_u32(r)?)
    } else {
        let style = le_u32(r)?;
        (0, le_u32(r)?, style)
    };
    let count = le_u16(r)?;
    let dialog_rect = rect(r)?;
    let menu = name_or_ordinal(r)?;
    let class = name_or_ordinal(r)?;
    let title = read_utf16z(r)?;

    let font = if style & DS_SETFONT != 0 {
        let point_size = le_u16(r)?;
        let (weight, italic, charset) = if extended {
            (le_u16(r)?, u8(r)? != 0, u8(r)?)
        } else {
            (0, false, 0)
        };
        Some(DialogFont {
            point_size,
            weight,
            italic,
            charset,
            typeface: read_utf16z(r)?,
        })
    } else {
        None
    };

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        align(r, 0, 4)?;
        let (help_id, ext_style, style) = if extended {
            (le_u32(r)?, le_u32(r)?, le_u32(r)?)
        } else {
            let style = le_u32(r)?;
            (0, le_u32(r)?, style)
        };
        let item_rect = rect(r)?;
        let id = if extended { le_u32(r)? } else { le_u16(r)? as u32 };
        let class = name_or_ordinal(r)?;
        let title = name_or_ordinal(r)?;
        let extra = le_u16(r)? as usize;
        items.push(DialogItem {
            help_id,
            style,
            ext_style,
            rect: item_rect,
            id,
            class,
            title,
            creation_data: bytesv(r, extra)?,
        });
    }

    Ok(Dialog {
        extended,
        help_id,
        style,
        ext_style,
        rect: dialog_rect,
        menu,
        class,
        title,
        font,
        items,
    })
}

/// Accelerator flag: last entry of the table.
const ACCEL_LAST: u16 = 0x0080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accelerator {
    pub flags: u16,
    pub key: u16,
    pub id: u16,
}

/// `RT_ACCELERATOR`: 8-byte ACCELTABLEENTRY records up to the one flagged
/// as last.
pub fn parse_accelerators(data: &[u8]) -> Result<Vec<Accelerator>> {
    let mut out = Vec::new();
    for entry in data.chunks_exact(8) {
        let flags = u16::from_le_bytes([entry[0], entry[1]]);
        out.push(Accelerator {
            flags,
            key: u16::from_le_bytes([entry[2], entry[3]]),
            id: u16::from_le_bytes([entry[4], entry[5]]),
        });
        if flags & ACCEL_LAST != 0 {
            return Ok(out);
        }
    }
    if out.is_empty() {
        return Err(Error::Parse("empty accelerator table"));
    }
    Ok(out)
}

/// MESSAGE_RESOURCE_ENTRY flag: text is UTF-16.
const MESSAGE_UNICODE: u16 = 0x0001;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageTable {
    pub entries: Vec<(u32, String)>,
}

/// `RT_MESSAGETABLE`: MESSAGE_RESOURCE_DATA blocks of ID ranges.
pub fn parse_message_table(data: &[u8]) -> Result<MessageTable> {
    let r = &mut Cursor::new(data);
    let block_count = le_u32(r)?;
    let mut blocks = Vec::new();
    for _ in 0..block_count {
        blocks.push((le_u32(r)?, le_u32(r)?, le_u32(r)?));
    }

    let mut entries = Vec::new();
    for (low, high, offset) in blocks {
        if high < low {
            return Err(Error::Parse("message block range reversed"));
        }
        r.seek(SeekFrom::Start(offset as u64))?;
        for id in low..=high {
            let length = le_u16(r)? as usize;
            let flags = le_u16(r)?;
            let text = bytesv(r, length.checked_sub(4).ok_or(Error::InvalidRange)?)?;
            let text = if flags & MESSAGE_UNICODE != 0 {
                let units: Vec<u16> = text
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            } else {
                text.iter().map(|&b| b as char).collect()
            };
            entries.push((id, text.trim_end_matches('\0').to_owned()));
        }
    }

    Ok(MessageTable { entries })
}
