//! **salvage** - extraction engine for legacy game and installer archives.
//!
//! Open an archive handle, then pull entries out through the
//! [`formats::Extract`] trait:
//!
//! ```no_run
//! use std::path::Path;
//! use salvage::formats::{Extract, wad::WadArchive};
//!
//! let wad = WadArchive::open("halflife.wad")?;
//! let ok = wad.extract_all(Path::new("out"));
//! # Ok::<(), salvage::Error>(())
//! ```
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::bfpk`]    | BFPK - flat archive, optional zlib |
//! | [`formats::bsp`]     | BSP v30 - Half-Life map lumps and textures |
//! | [`formats::vbsp`]    | VBSP - Source engine map lumps |
//! | [`formats::gcf`]     | GCF - Steam game cache file |
//! | [`formats::cab`]     | MS-CAB - Microsoft Cabinet (store, MS-ZIP, Quantum, LZX) |
//! | [`formats::pak`]     | PAK - Quake/Half-Life package |
//! | [`formats::pff`]     | PFF - NovaLogic package |
//! | [`formats::quantum`] | Q - standalone Quantum archive |
//! | [`formats::sga`]     | SGA - Relic archive v4-v7 |
//! | [`formats::vpk`]     | VPK - Valve package v1/v2 |
//! | [`formats::wad`]     | WAD3 - Half-Life texture package |
//! | [`formats::xzp`]     | XZP - Xbox Zip package |
//! | [`formats::pe`]      | PE32/PE32+ - resources, version info, debug directory |

pub mod compression;
pub mod error;
pub mod formats;
pub mod sink;
pub mod source;
pub(crate) mod utils;

pub use error::{Error, Result};
pub use formats::{Extract, ExtractedEntry};
pub use source::Source;
