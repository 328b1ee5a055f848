//! The one error type every parser, codec and sink in salvage returns.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Shorthand for `Result<T, salvage::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a parse, decode or write failed.
///
/// Per-entry failures during extraction are logged and folded into the
/// `bool` outcome; the variant is only visible through `read_entry`.
#[derive(Debug, Error)]
pub enum Error {
    /// The leading signature is not the one this format uses.
    #[error("bad magic value")]
    BadMagic,
    /// The header declares a version this reader has no layout for.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),
    /// Fewer bytes were available than a header, table or chain needs.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// A name ran to the end of its table without a terminating zero.
    #[error("unterminated string")]
    UnterminatedName,
    /// An offset, length or count points outside the archive or table.
    #[error("invalid offset or size")]
    InvalidRange,
    /// The data is internally inconsistent; the message names the rule.
    #[error("parse error: {0}")]
    Parse(&'static str),
    /// The source holds no bytes at all.
    #[error("empty source")]
    EmptySource,
    /// An entry index is outside `[0, entry_count)`.
    #[error("entry index {0} out of range")]
    IndexOutOfRange(usize),
    /// The entry is encrypted and cannot be extracted.
    #[error("entry is encrypted")]
    Encrypted,
    /// The operation is recognised but not implemented for this input.
    #[error("not supported: {0}")]
    Unsupported(&'static str),
    /// A compression type tag has no matching decompressor.
    #[error("unsupported compression type: {0:#06x}")]
    UnsupportedCompression(u16),
    /// A relative output path would leave the output directory.
    #[error("unsafe output path: {0}")]
    UnsafePath(String),
    /// A volume of a multi-file archive could not be found.
    #[error("missing archive volume: {}", .0.display())]
    MissingVolume(PathBuf),
    /// Deflate or zlib decompression failed.
    #[error("deflate decompression failed")]
    Deflate,
    /// MS-ZIP decompression failed.
    #[error("ms-zip decompression failed")]
    MsZip,
    /// LZX decompression failed.
    #[error("lzx decompression failed")]
    Lzx,
    /// Quantum decompression failed.
    #[error("quantum decompression failed")]
    Quantum,
    /// An embedded XML document is malformed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
