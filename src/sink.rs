//! Output side of extraction: turning an entry path and its bytes into a
//! file below the caller's output directory.
//!
//! Entry names come straight from archive directories, so they are
//! normalised before use:
//!
//! * `\` and `/` are both treated as separators (SGA, GCF and CAB names are
//!   DOS-style);
//! * empty and `.` segments are dropped, which also strips leading
//!   separators;
//! * `..` segments and drive prefixes (`C:`) are rejected with
//!   [`Error::UnsafePath`];
//! * a name that normalises to nothing is rejected the same way.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// Normalise an archive entry name into a relative path.
pub fn relative_path(name: &str) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(Error::UnsafePath(name.to_owned())),
            s if s.contains(':') => return Err(Error::UnsafePath(name.to_owned())),
            s => out.push(s),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(Error::UnsafePath(name.to_owned()));
    }
    Ok(out)
}

/// Write `data` to `out_dir/name`, creating parent directories as needed.
///
/// On a failed write the partially written file is removed before the error
/// is returned. Returns the full path of the written file.
pub fn write_entry(out_dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = out_dir.join(relative_path(name)?);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let written = File::create(&path).and_then(|mut f| {
        f.write_all(data)?;
        f.flush()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&path);
        return Err(e.into());
    }

    debug!(path = %path.display(), bytes = data.len(), "wrote entry");
    Ok(path)
}
