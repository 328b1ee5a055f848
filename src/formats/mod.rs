//! Per-format archive extractors.
//!
//! Each submodule targets one container format. All of them follow the same
//! conventions:
//!
//! * **Model + parse** - the module's plain structs describe the on-disk
//!   directory, and a `parse` function builds them from any
//!   [`std::io::Read`] + [`std::io::Seek`]. Payload bytes are never loaded
//!   eagerly.
//! * **Archive handles** - `*Archive<R>` owns a [`Source`](crate::source::Source)
//!   plus the parsed model. `new(reader)`, `from_bytes(data, offset)` and
//!   `open(path)` either return a fully built handle or an error.
//! * **Extraction** - every handle implements [`Extract`]. Per-entry
//!   failures are logged and reported as `false`; one bad entry never stops
//!   [`Extract::extract_all`].
//!
//! ## Format overview
//!
//! | Module    | Format      | Description |
//! |-----------|-------------|-------------|
//! | [`bfpk`]  | BFPK        | Flat archive with optional per-file zlib and length prefixes |
//! | [`bsp`]   | BSP v30     | Half-Life map; lumps plus embedded WAD-style textures |
//! | [`vbsp`]  | VBSP        | Source engine map; 64 lumps, lump 40 is a ZIP |
//! | [`gcf`]   | GCF         | Steam cache file; block-chained file data |
//! | [`cab`]   | MS-CAB      | Microsoft Cabinet; folders of MS-ZIP/Quantum/LZX blocks |
//! | [`pak`]   | PAK         | Quake/Half-Life package |
//! | [`pff`]   | PFF2-4      | NovaLogic archive |
//! | [`quantum`] | `.Q`      | Standalone Quantum archive |
//! | [`sga`]   | SGA v4-7    | Relic archive; sections, folders and deflated files |
//! | [`vpk`]   | VPK v1/v2   | Valve package; directory plus numbered volumes |
//! | [`wad`]   | WAD3        | Half-Life texture package |
//! | [`xzp`]   | XZP         | Xbox Zip package |
//! | [`pe`]    | PE32/PE32+  | Resource, version info and debug directory walker |

/// Generate `new`, `from_bytes` and (unless `no_open`) `open` for an archive
/// handle that provides `from_source(Source<R>) -> Result<Self>`.
macro_rules! archive_constructors {
    ($archive:ident) => {
        $crate::formats::archive_constructors!($archive, no_open);

        impl $archive<::std::io::BufReader<::std::fs::File>> {
            /// Open an archive file on disk.
            pub fn open(path: impl AsRef<::std::path::Path>) -> $crate::Result<Self> {
                Self::from_source($crate::source::Source::open(path)?)
            }
        }
    };
    ($archive:ident, no_open) => {
        impl<R: ::std::io::Read + ::std::io::Seek> $archive<R> {
            /// Parse an archive starting at the reader's current position.
            pub fn new(reader: R) -> $crate::Result<Self> {
                Self::from_source($crate::source::Source::new(reader)?)
            }
        }

        impl $archive<::std::io::Cursor<Vec<u8>>> {
            /// Parse an in-memory archive starting at `offset`.
            pub fn from_bytes(data: Vec<u8>, offset: usize) -> $crate::Result<Self> {
                Self::from_source($crate::source::Source::from_bytes(data, offset)?)
            }
        }
    };
}
pub(crate) use archive_constructors;

pub mod bfpk;
pub mod bsp;
pub mod cab;
pub mod gcf;
pub mod pak;
pub mod pe;
pub mod pff;
pub mod quantum;
pub mod sga;
pub mod vbsp;
pub mod vpk;
pub mod wad;
pub mod xzp;

use std::path::Path;

use tracing::{info, warn};

use crate::{Error, Result, sink};

/// One resolved entry: its output path and its final bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Relative output path, `/` or `\` separated.
    pub path: String,
    /// Decompressed payload.
    pub data: Vec<u8>,
}

impl ExtractedEntry {
    pub fn new(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }
}

/// Extraction interface shared by every archive handle.
pub trait Extract {
    /// Number of extractable entries.
    fn entry_count(&self) -> usize;

    /// Resolve entry `index` to its output path and bytes.
    ///
    /// Returns [`Error::IndexOutOfRange`] for `index >= entry_count()`
    /// without touching the source.
    fn read_entry(&self, index: usize) -> Result<ExtractedEntry>;

    /// Extract entry `index` below `out_dir`.
    ///
    /// Returns `true` only when exactly one file was written. Nothing is
    /// written for an invalid index.
    fn extract_entry(&self, index: usize, out_dir: &Path) -> bool {
        write_extracted(index, out_dir, self.read_entry(index))
    }

    /// Extract every entry below `out_dir`.
    ///
    /// Keeps going after a failed entry; the result is `true` only if every
    /// entry succeeded.
    fn extract_all(&self, out_dir: &Path) -> bool {
        let results: Vec<bool> = (0..self.entry_count())
            .map(|i| self.extract_entry(i, out_dir))
            .collect();
        summarize(&results)
    }
}

/// Write a decoded entry below `out_dir`, logging a decode or write failure.
pub(crate) fn write_extracted(index: usize, out_dir: &Path, entry: Result<ExtractedEntry>) -> bool {
    let written = entry.and_then(|entry| sink::write_entry(out_dir, &entry.path, &entry.data));
    match written {
        Ok(_) => true,
        Err(e) => {
            warn!(index, error = %e, "entry extraction failed");
            false
        }
    }
}

/// AND a batch of per-entry results, logging the tally.
pub(crate) fn summarize(results: &[bool]) -> bool {
    let ok = results.iter().filter(|&&r| r).count();
    info!(extracted = ok, total = results.len(), "batch extraction finished");
    ok == results.len()
}

/// Fail with [`Error::IndexOutOfRange`] unless `index < count`.
#[inline]
pub(crate) fn check_index(index: usize, count: usize) -> Result<()> {
    if index >= count {
        return Err(Error::IndexOutOfRange(index));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Three entries; the middle one always fails.
    struct Flaky {
        reads: Cell<usize>,
    }

    impl Extract for Flaky {
        fn entry_count(&self) -> usize {
            3
        }

        fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
            check_index(index, self.entry_count())?;
            self.reads.set(self.reads.get() + 1);
            if index == 1 {
                return Err(Error::Parse("broken entry"));
            }
            Ok(ExtractedEntry::new(format!("e{index}.bin"), vec![index as u8]))
        }
    }

    #[test]
    fn batch_does_not_stop_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let a = Flaky { reads: Cell::new(0) };
        assert!(!a.extract_all(dir.path()));
        assert_eq!(a.reads.get(), 3);
        assert!(dir.path().join("e0.bin").exists());
        assert!(dir.path().join("e2.bin").exists());
    }

    #[test]
    fn invalid_index_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let a = Flaky { reads: Cell::new(0) };
        assert!(!a.extract_entry(3, dir.path()));
        assert_eq!(a.reads.get(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
