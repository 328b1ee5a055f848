//! LZX decompression (requires the `compression` feature).
//!
//! Thin stateful wrapper over [`lzxd`]. CAB folders encode the window size
//! as a power of two in `typeCompress` bits 8..13; valid values are 15
//! (32 KiB) through 21 (2 MiB).

#![cfg(feature = "compression")]

use lzxd::{Lzxd, WindowSize};

use crate::{Error, Result};

/// Stateful LZX decoder for one CAB folder.
pub struct LzxDecoder {
    inner: Lzxd,
}

impl LzxDecoder {
    /// Create a decoder for a `2^window_bits` byte window.
    pub fn new(window_bits: u8) -> Result<Self> {
        Ok(Self {
            inner: Lzxd::new(window_size(window_bits)?),
        })
    }

    /// Decompress the next CFDATA block into exactly `out_len` bytes.
    pub fn decompress_block(&mut self, data: &[u8], out_len: usize) -> Result<Vec<u8>> {
        let out = self
            .inner
            .decompress_next(data, out_len)
            .map_err(|_| Error::Lzx)?;
        if out.len() != out_len {
            return Err(Error::Lzx);
        }
        Ok(out.to_vec())
    }
}

fn window_size(bits: u8) -> Result<WindowSize> {
    Ok(match bits {
        15 => WindowSize::KB32,
        16 => WindowSize::KB64,
        17 => WindowSize::KB128,
        18 => WindowSize::KB256,
        19 => WindowSize::KB512,
        20 => WindowSize::MB1,
        21 => WindowSize::MB2,
        _ => return Err(Error::UnsupportedCompression(0x0003 | (bits as u16) << 8)),
    })
}
