//! Compression dispatch.
//!
//! Formats tag their payloads with a compression type; this module maps the
//! tag to a decompressor and drives it. Two shapes exist:
//!
//! * **One-shot** - BFPK and SGA compress each file as a single deflate
//!   stream. Use [`inflate_zlib`] / [`inflate_raw`].
//! * **Grouped** - a CAB folder is an ordered run of blocks sharing one
//!   decompressor state (MS-ZIP dictionary, Quantum models, LZX window).
//!   Create a fresh [`BlockDecoder`] per group and feed it every block in
//!   order, or call [`decompress_group`].
//!
//! A decoder is never shared between groups, and the first failing block
//! fails the whole group.
//!
//! ## Submodules
//!
//! | Module | Algorithm | Needs `compression` feature |
//! |--------|-----------|-----------------------------|
//! | [`deflate`] | zlib / raw deflate (`flate2`) | yes |
//! | [`mszip`]   | MS-ZIP (`flate2`) | yes |
//! | [`lzx`]     | LZX (`lzxd`) | yes |
//! | [`quantum`] | Quantum | no |
//!
//! Without the `compression` feature, MS-ZIP and LZX groups report
//! [`Error::UnsupportedCompression`] and the one-shot inflaters report
//! [`Error::Unsupported`].

#[cfg(feature = "compression")]
pub mod deflate;
#[cfg(feature = "compression")]
pub mod lzx;
#[cfg(feature = "compression")]
pub mod mszip;
pub mod quantum;

use tracing::debug;

use crate::{Error, Result};

/// CAB `typeCompress` values (low nibble).
pub const CAB_COMPRESS_NONE: u16 = 0x0000;
pub const CAB_COMPRESS_MSZIP: u16 = 0x0001;
pub const CAB_COMPRESS_QUANTUM: u16 = 0x0002;
pub const CAB_COMPRESS_LZX: u16 = 0x0003;
const CAB_COMPRESS_MASK: u16 = 0x000F;

/// Compression applied to one group of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// Stored; output equals input.
    None,
    /// MS-ZIP deflate blocks with a shared 32 KiB dictionary.
    MsZip,
    /// Quantum with a `2^window_bits` byte window.
    Quantum { level: u8, window_bits: u8 },
    /// LZX with a `2^window_bits` byte window.
    Lzx { window_bits: u8 },
}

impl CompressionKind {
    /// Decode a CAB folder `typeCompress` field.
    ///
    /// Quantum and LZX carry their window size in bits 8..13; Quantum's
    /// level lives in bits 4..8.
    pub fn from_cab(type_compress: u16) -> Result<Self> {
        let window_bits = ((type_compress >> 8) & 0x1F) as u8;
        match type_compress & CAB_COMPRESS_MASK {
            CAB_COMPRESS_NONE => Ok(Self::None),
            CAB_COMPRESS_MSZIP => Ok(Self::MsZip),
            CAB_COMPRESS_QUANTUM => Ok(Self::Quantum {
                level: ((type_compress >> 4) & 0x0F) as u8,
                window_bits,
            }),
            CAB_COMPRESS_LZX => Ok(Self::Lzx { window_bits }),
            _ => Err(Error::UnsupportedCompression(type_compress)),
        }
    }
}

/// Per-group decompressor state.
pub enum BlockDecoder {
    Store,
    #[cfg(feature = "compression")]
    MsZip(mszip::MsZipDecoder),
    Quantum(Box<quantum::QuantumDecoder>),
    #[cfg(feature = "compression")]
    Lzx(Box<lzx::LzxDecoder>),
}

impl BlockDecoder {
    /// Create fresh state for one compression group.
    pub fn new(kind: CompressionKind) -> Result<Self> {
        debug!(?kind, "new block decoder");
        match kind {
            CompressionKind::None => Ok(Self::Store),
            CompressionKind::Quantum { window_bits, .. } => Ok(Self::Quantum(Box::new(
                quantum::QuantumDecoder::new(window_bits)?,
            ))),
            #[cfg(feature = "compression")]
            CompressionKind::MsZip => Ok(Self::MsZip(mszip::MsZipDecoder::new())),
            #[cfg(feature = "compression")]
            CompressionKind::Lzx { window_bits } => {
                Ok(Self::Lzx(Box::new(lzx::LzxDecoder::new(window_bits)?)))
            }
            #[cfg(not(feature = "compression"))]
            CompressionKind::MsZip => Err(Error::UnsupportedCompression(CAB_COMPRESS_MSZIP)),
            #[cfg(not(feature = "compression"))]
            CompressionKind::Lzx { .. } => Err(Error::UnsupportedCompression(CAB_COMPRESS_LZX)),
        }
    }

    /// Decompress the next block of the group into exactly `out_len` bytes.
    pub fn decompress_block(&mut self, data: &[u8], out_len: usize) -> Result<Vec<u8>> {
        match self {
            Self::Store => {
                if data.len() != out_len {
                    return Err(Error::InvalidRange);
                }
                Ok(data.to_vec())
            }
            #[cfg(feature = "compression")]
            Self::MsZip(d) => d.decompress_block(data, out_len),
            Self::Quantum(d) => d.decompress_block(data, out_len),
            #[cfg(feature = "compression")]
            Self::Lzx(d) => d.decompress_block(data, out_len),
        }
    }
}

/// Decompress an ordered run of `(compressed, uncompressed_len)` blocks that
/// share one decompressor state, concatenating the output.
pub fn decompress_group<'a, I>(kind: CompressionKind, blocks: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a [u8], usize)>,
{
    let mut decoder = BlockDecoder::new(kind)?;
    let mut out = Vec::new();
    for (data, out_len) in blocks {
        out.extend_from_slice(&decoder.decompress_block(data, out_len)?);
    }
    Ok(out)
}

/// Inflate a zlib stream (2-byte header, Adler-32 trailer) into exactly
/// `out_len` bytes.
pub fn inflate_zlib(data: &[u8], out_len: usize) -> Result<Vec<u8>> {
    #[cfg(feature = "compression")]
    {
        deflate::inflate_zlib(data, out_len)
    }
    #[cfg(not(feature = "compression"))]
    {
        let _ = (data, out_len);
        Err(Error::Unsupported("deflate without the compression feature"))
    }
}

/// Inflate a raw deflate stream into exactly `out_len` bytes.
///
/// A stream that turns out to carry a zlib header is accepted as well.
pub fn inflate_raw(data: &[u8], out_len: usize) -> Result<Vec<u8>> {
    #[cfg(feature = "compression")]
    {
        if deflate::has_zlib_header(data) {
            return deflate::inflate_zlib(data, out_len);
        }
        deflate::inflate_raw(data, out_len)
    }
    #[cfg(not(feature = "compression"))]
    {
        let _ = (data, out_len);
        Err(Error::Unsupported("deflate without the compression feature"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cab_type_decoding() {
        assert_eq!(CompressionKind::from_cab(0x0000).unwrap(), CompressionKind::None);
        assert_eq!(CompressionKind::from_cab(0x0001).unwrap(), CompressionKind::MsZip);
        assert_eq!(
            CompressionKind::from_cab(0x1503).unwrap(),
            CompressionKind::Lzx { window_bits: 21 }
        );
        assert_eq!(
            CompressionKind::from_cab(0x1272).unwrap(),
            CompressionKind::Quantum {
                level: 7,
                window_bits: 18
            }
        );
        assert!(matches!(
            CompressionKind::from_cab(0x000F),
            Err(Error::UnsupportedCompression(0x000F))
        ));
        assert!(matches!(
            CompressionKind::from_cab(0xFFFF),
            Err(Error::UnsupportedCompression(0xFFFF))
        ));
    }

    #[test]
    fn store_group_concatenates_in_order() {
        let out = decompress_group(
            CompressionKind::None,
            [(&b"abc"[..], 3), (&b"de"[..], 2)],
        )
        .unwrap();
        assert_eq!(out, b"abcde");
    }

    #[test]
    fn store_block_with_wrong_size_fails_group() {
        assert!(decompress_group(CompressionKind::None, [(&b"abc"[..], 4)]).is_err());
    }
}
