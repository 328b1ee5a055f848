//! Little-endian readers and name decoding for the format parsers.
//!
//! A short read surfaces as [`Error::Io`] with `UnexpectedEof`; nothing here
//! returns fewer bytes than asked for.

use std::io::{Read, Seek, SeekFrom};

use crate::{Error, Result};

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

/// Read a little-endian `u16`.
#[inline]
pub(crate) fn le_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

/// Read a little-endian `i16`.
#[inline]
pub(crate) fn le_i16<R: Read>(r: &mut R) -> Result<i16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(i16::from_le_bytes(b))
}

/// Read a little-endian `u32`.
#[inline]
pub(crate) fn le_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Read a little-endian `i32`.
#[inline]
pub(crate) fn le_i32<R: Read>(r: &mut R) -> Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

/// Read a little-endian `u64`.
#[inline]
pub(crate) fn le_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

/// Fill an `[u8; N]` from the reader.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Read a `len`-byte payload into a fresh buffer.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; len];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Consume a signature and fail with [`Error::BadMagic`] unless it equals
/// `expected`.
#[inline]
pub(crate) fn magic<R: Read, const N: usize>(r: &mut R, expected: &[u8; N]) -> Result<()> {
    let got = bytesa::<N>(r)?;
    if &got != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Name stored at `offset` inside a string table, up to its zero byte.
///
/// An `offset` past the table is [`Error::InvalidRange`]; a name with no
/// zero before the table ends is [`Error::UnterminatedName`]. Invalid UTF-8
/// is replaced, not rejected.
#[inline]
pub(crate) fn null_string(buf: &[u8], offset: usize) -> Result<String> {
    let slice = buf.get(offset..).ok_or(Error::InvalidRange)?;
    let end = slice
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::UnterminatedName)?;
    Ok(String::from_utf8_lossy(&slice[..end]).into_owned())
}

/// Decode a fixed-width name field, stopping at the first null byte.
///
/// Unlike [`null_string`] a missing terminator is fine: the field is simply
/// full.
pub(crate) fn fixed_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Pull bytes until a zero; the zero is consumed but not returned.
pub(crate) fn read_null_string<R: Read>(r: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = u8(r)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a null-terminated UTF-16LE string from a reader.
pub(crate) fn read_utf16z<R: Read>(r: &mut R) -> Result<String> {
    let mut units = Vec::new();
    loop {
        let u = le_u16(r)?;
        if u == 0 {
            break;
        }
        units.push(u);
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Read exactly `count` UTF-16LE code units and decode them.
pub(crate) fn read_utf16<R: Read>(r: &mut R, count: usize) -> Result<String> {
    let mut units = Vec::with_capacity(count);
    for _ in 0..count {
        units.push(le_u16(r)?);
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Decode a fixed-width UTF-16LE field, stopping at the first null unit.
pub(crate) fn fixed_utf16(field: &[u8]) -> String {
    let units: Vec<u16> = field
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Advance the stream to the next multiple of `align` bytes, measured from
/// `base`.
pub(crate) fn align<R: Seek>(r: &mut R, base: u64, align: u64) -> Result<()> {
    let pos = r.stream_position()?;
    let rel = pos.saturating_sub(base);
    let rem = rel % align;
    if rem != 0 {
        r.seek(SeekFrom::Start(pos + (align - rem)))?;
    }
    Ok(())
}

/// Convert a `u64` count or offset from the file into a `usize`.
#[inline]
pub(crate) fn to_usize(v: u64) -> Result<usize> {
    usize::try_from(v).map_err(|_| Error::InvalidRange)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn fixed_string_stops_at_nul_or_end() {
        assert_eq!(fixed_string(b"TEST\0\0\0\0"), "TEST");
        assert_eq!(fixed_string(b"FULLNAME"), "FULLNAME");
    }

    #[test]
    fn utf16z_reads_until_terminator() {
        let mut c = Cursor::new(vec![b'h', 0, b'i', 0, 0, 0, b'x', 0]);
        assert_eq!(read_utf16z(&mut c).unwrap(), "hi");
        assert_eq!(c.position(), 6);
    }

    #[test]
    fn align_is_relative_to_base() {
        let mut c = Cursor::new(vec![0u8; 32]);
        c.set_position(7);
        align(&mut c, 2, 4).unwrap();
        assert_eq!(c.position(), 10);
        align(&mut c, 2, 4).unwrap();
        assert_eq!(c.position(), 10);
    }
}
