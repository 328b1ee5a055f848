//! BSP v30 - Half-Life map.
//!
//! ## Layout
//! ```text
//! [0x00] Version 30                (i32 LE)
//! [0x04] Lumps                     (15 × { Offset: u32 LE, Length: u32 LE })
//! ```
//!
//! Lump 0 holds the entity text and lump 2 the texture table; every lump is
//! extracted as a file. Textures are additionally converted to 8-bit BMPs.
//!
//! ## Texture lump
//! ```text
//! [0x00] MipTextureCount           (u32 LE)
//! [0x04] Offsets                   (MipTextureCount × i32 LE, -1 = unused)
//! ```
//! Each offset (relative to the lump) points at a mip texture:
//! ```text
//! [0x00] Name                      (16 bytes)
//! [0x10] Width                     (u32 LE)
//! [0x14] Height                    (u32 LE)
//! [0x18] MipOffsets                (4 × u32 LE, relative to the mip texture,
//!                                   all 0 when the pixels live in a WAD)
//! ```
//! The four mip levels are followed by a `u16` palette size and 256 RGB
//! triplets.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use super::{
    Extract, ExtractedEntry, archive_constructors, check_index, summarize, write_extracted,
};
use crate::source::Source;
use crate::utils::{bytesa, fixed_string, le_i32, le_u32, to_usize};
use crate::{Error, Result};

pub const VERSION: i32 = 30;
pub const LUMP_COUNT: usize = 15;
pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_TEXTURES: usize = 2;

const PALETTE_SIZE: usize = 256;
const BMP_FILE_HEADER: u32 = 14;
const BMP_INFO_HEADER: u32 = 40;

#[derive(Debug)]
pub struct Bsp {
    pub lumps: Vec<BspLump>,
    pub textures: Vec<BspTexture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BspLump {
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BspTexture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Archive offset of the mip texture header.
    pub offset: u64,
    pub mip_offsets: [u32; 4],
}

impl BspTexture {
    /// Whether pixel data is stored in the map rather than a WAD.
    pub fn is_embedded(&self) -> bool {
        self.mip_offsets[0] != 0
    }

    fn pixel_count(&self) -> Result<usize> {
        to_usize(self.width as u64 * self.height as u64)
    }

    /// Offset of the palette, right after the smallest mip level.
    fn palette_offset(&self) -> u64 {
        self.offset
            + self.mip_offsets[3] as u64
            + (self.width as u64 / 8) * (self.height as u64 / 8)
    }
}

/// Output name of lump `index`.
pub fn lump_name(index: usize) -> String {
    match index {
        LUMP_ENTITIES => "entities.ent".to_owned(),
        LUMP_TEXTURES => "texture_data.bin".to_owned(),
        i => format!("lump_{i}.bin"),
    }
}

impl Bsp {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        let version = le_i32(r)?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version as u32));
        }
        let mut lumps = Vec::with_capacity(LUMP_COUNT);
        for _ in 0..LUMP_COUNT {
            lumps.push(BspLump {
                offset: le_u32(r)?,
                length: le_u32(r)?,
            });
        }

        let mut textures = Vec::new();
        let lump = lumps[LUMP_TEXTURES];
        if lump.length >= 4 {
            let lump_start = base + lump.offset as u64;
            r.seek(SeekFrom::Start(lump_start))?;
            let count = le_u32(r)?;
            let offsets = (0..count.min(lump.length / 4))
                .map(|_| le_i32(r))
                .collect::<Result<Vec<_>>>()?;
            for offset in offsets.into_iter().filter(|&o| o >= 0) {
                let offset = lump_start + offset as u64;
                r.seek(SeekFrom::Start(offset))?;
                let name = fixed_string(&bytesa::<16>(r)?);
                let width = le_u32(r)?;
                let height = le_u32(r)?;
                let mut mip_offsets = [0u32; 4];
                for m in &mut mip_offsets {
                    *m = le_u32(r)?;
                }
                textures.push(BspTexture {
                    name,
                    width,
                    height,
                    offset: offset - base,
                    mip_offsets,
                });
            }
        }

        Ok(Self { lumps, textures })
    }
}

/// BSP archive handle.
pub struct BspArchive<R> {
    source: Source<R>,
    pub bsp: Bsp,
}

impl<R: Read + Seek> BspArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let bsp = source.parse_with(Bsp::parse)?;
        Ok(Self { source, bsp })
    }

    pub fn texture_count(&self) -> usize {
        self.bsp.textures.len()
    }

    /// Convert texture `index` into an 8-bit BMP named `{name}.bmp`.
    pub fn read_texture(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.texture_count())?;
        let tex = &self.bsp.textures[index];
        if !tex.is_embedded() {
            return Err(Error::Unsupported("texture pixels are stored in a WAD"));
        }
        debug!(index, name = %tex.name, width = tex.width, height = tex.height, "bsp texture");

        let pixels = self.source.read_bytes(
            tex.offset + tex.mip_offsets[0] as u64,
            tex.pixel_count()?,
        )?;
        let palette = self
            .source
            .read_bytes(tex.palette_offset() + 2, PALETTE_SIZE * 3)?;
        let bmp = write_bitmap(tex.width, tex.height, &palette, &pixels)?;
        Ok(ExtractedEntry::new(format!("{}.bmp", tex.name), bmp))
    }

    pub fn extract_texture(&self, index: usize, out_dir: &Path) -> bool {
        write_extracted(index, out_dir, self.read_texture(index))
    }

    pub fn extract_all_textures(&self, out_dir: &Path) -> bool {
        let results: Vec<bool> = (0..self.texture_count())
            .map(|i| self.extract_texture(i, out_dir))
            .collect();
        summarize(&results)
    }
}

archive_constructors!(BspArchive);

impl<R: Read + Seek> Extract for BspArchive<R> {
    fn entry_count(&self) -> usize {
        self.bsp.lumps.len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let lump = self.bsp.lumps[index];
        debug!(index, offset = lump.offset, length = lump.length, "bsp lump");
        let data = self
            .source
            .read_range(lump.offset as u64, lump.length as u64)?;
        Ok(ExtractedEntry::new(lump_name(index), data))
    }
}

/// Build an uncompressed bottom-up 8-bit BMP.
///
/// `palette` is 256 RGB triplets; `pixels` is `width * height` indices,
/// top row first.
pub fn write_bitmap(width: u32, height: u32, palette: &[u8], pixels: &[u8]) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let stride = (w + 3) & !3;
    // Every size field in the headers is 32-bit.
    let image_size = stride
        .checked_mul(h)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(Error::InvalidRange)?;
    let pixel_offset = BMP_FILE_HEADER + BMP_INFO_HEADER + (PALETTE_SIZE as u32) * 4;
    let file_size = pixel_offset
        .checked_add(image_size)
        .ok_or(Error::InvalidRange)?;
    let signed_width = i32::try_from(width).map_err(|_| Error::InvalidRange)?;
    let signed_height = i32::try_from(height).map_err(|_| Error::InvalidRange)?;
    if palette.len() < PALETTE_SIZE * 3 || pixels.len() < w * h {
        return Err(Error::InvalidRange);
    }

    let mut out = Vec::with_capacity(file_size as usize);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&pixel_offset.to_le_bytes());

    out.extend_from_slice(&BMP_INFO_HEADER.to_le_bytes());
    out.extend_from_slice(&signed_width.to_le_bytes());
    out.extend_from_slice(&signed_height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&8u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&image_size.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&(PALETTE_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    for rgb in palette[..PALETTE_SIZE * 3].chunks_exact(3) {
        out.extend_from_slice(&[rgb[2], rgb[1], rgb[0], 0]);
    }

    if w > 0 {
        for row in pixels[..w * h].chunks_exact(w).rev() {
            out.extend_from_slice(row);
            out.resize(out.len() + (stride - w), 0);
        }
    }
    Ok(out)
}
