//! One-shot zlib and raw deflate (requires the `compression` feature).
//!
//! BFPK stores zlib streams; SGA stores raw deflate. Both know the
//! decompressed size up front, so the output is bounded to that size and a
//! short stream is an error.

#![cfg(feature = "compression")]

use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder};

use crate::{Error, Result};

/// Inflate a zlib-wrapped stream into exactly `out_len` bytes.
pub fn inflate_zlib(data: &[u8], out_len: usize) -> Result<Vec<u8>> {
    read_bounded(ZlibDecoder::new(data), out_len)
}

/// Inflate a raw deflate stream into exactly `out_len` bytes.
pub fn inflate_raw(data: &[u8], out_len: usize) -> Result<Vec<u8>> {
    read_bounded(DeflateDecoder::new(data), out_len)
}

/// Whether `data` starts with a valid zlib CMF/FLG pair.
pub fn has_zlib_header(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => {
            cmf & 0x0F == 8 && cmf >> 4 <= 7 && ((*cmf as u16) << 8 | *flg as u16) % 31 == 0
        }
        _ => false,
    }
}

fn read_bounded<R: Read>(decoder: R, out_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(out_len);
    decoder
        .take(out_len as u64)
        .read_to_end(&mut out)
        .map_err(|_| Error::Deflate)?;
    if out.len() != out_len {
        return Err(Error::Deflate);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::{DeflateEncoder, ZlibEncoder};

    use super::*;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut e = ZlibEncoder::new(Vec::new(), Compression::default());
        e.write_all(data).unwrap();
        e.finish().unwrap()
    }

    fn raw(data: &[u8]) -> Vec<u8> {
        let mut e = DeflateEncoder::new(Vec::new(), Compression::default());
        e.write_all(data).unwrap();
        e.finish().unwrap()
    }

    #[test]
    fn zlib_round_trip() {
        let plain = b"hello hello hello hello".repeat(8);
        assert_eq!(inflate_zlib(&zlib(&plain), plain.len()).unwrap(), plain);
    }

    #[test]
    fn raw_round_trip() {
        let plain = b"relic relic relic".repeat(5);
        assert_eq!(inflate_raw(&raw(&plain), plain.len()).unwrap(), plain);
    }

    #[test]
    fn short_stream_is_an_error() {
        let plain = b"abcdef";
        assert!(matches!(
            inflate_zlib(&zlib(plain), plain.len() + 1),
            Err(Error::Deflate)
        ));
    }

    #[test]
    fn header_sniffing() {
        assert!(has_zlib_header(&zlib(b"x")));
        assert!(!has_zlib_header(&[0x01, 0x00]));
        assert!(!has_zlib_header(&[0x78]));
    }
}
