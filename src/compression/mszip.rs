//! MS-ZIP decompression (requires the `compression` feature).
//!
//! ## Block layout
//! ```text
//! [0x00] Signature "CK"   (2 bytes)
//! [0x02] Deflate data     (ends with a final block)
//! ```
//! Each block inflates to at most 32 KiB. Blocks are independent deflate
//! streams except that back-references may reach into the previous block's
//! output, so the decoder keeps the last 32 KiB as a dictionary.
//!
//! The dictionary is supplied by prefixing the block with non-final stored
//! deflate blocks holding it, inflating the combined stream and dropping the
//! prefix from the output. This needs nothing beyond a plain raw-deflate
//! decoder.

#![cfg(feature = "compression")]

use std::io::Read;

use flate2::read::DeflateDecoder;

use crate::{Error, Result};

/// MS-ZIP window size.
pub const WINDOW_SIZE: usize = 0x8000;

const SIGNATURE: &[u8; 2] = b"CK";

/// Stateful MS-ZIP decoder for one CAB folder.
#[derive(Debug, Default)]
pub struct MsZipDecoder {
    dictionary: Vec<u8>,
}

impl MsZipDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompress the next block of the folder into exactly `out_len` bytes.
    pub fn decompress_block(&mut self, data: &[u8], out_len: usize) -> Result<Vec<u8>> {
        let body = data.strip_prefix(SIGNATURE).ok_or(Error::MsZip)?;

        let mut stream = Vec::with_capacity(self.dictionary.len() + 5 + body.len());
        for chunk in self.dictionary.chunks(u16::MAX as usize) {
            let len = chunk.len() as u16;
            stream.push(0x00);
            stream.extend_from_slice(&len.to_le_bytes());
            stream.extend_from_slice(&(!len).to_le_bytes());
            stream.extend_from_slice(chunk);
        }
        stream.extend_from_slice(body);

        let prefix = self.dictionary.len();
        let mut out = Vec::with_capacity(prefix + out_len);
        DeflateDecoder::new(&stream[..])
            .take((prefix + out_len) as u64)
            .read_to_end(&mut out)
            .map_err(|_| Error::MsZip)?;
        if out.len() != prefix + out_len {
            return Err(Error::MsZip);
        }
        let block = out.split_off(prefix);

        // Keep the trailing window for the next block.
        out.extend_from_slice(&block);
        let keep = out.len().min(WINDOW_SIZE);
        self.dictionary = out.split_off(out.len() - keep);

        Ok(block)
    }
}
