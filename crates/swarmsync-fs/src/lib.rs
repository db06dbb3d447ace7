//! Filesystem primitives behind chunked downloads.
//!
//! - [`PartDir`] - private staging directory holding one file per retrieved chunk
//! - [`assemble`] - ordered concatenation of staged parts into the destination
//! - [`atomic_write`] - write-then-rename placement of a single buffer

mod assemble;
mod error;
mod parts;

pub use assemble::assemble;
pub use error::{Error, Result};
pub use parts::{PartDir, write_part};

use std::fs;
use std::path::Path;

/// Writes `content` next to `path` under a unique name, then renames it into place.
///
/// Readers never observe a half-written file.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .ok_or_else(|| Error::NoParent(path.to_path_buf()))?;

    let tmp_path = parent.join(format!(".tmp.{}.swarmsync", uuid::Uuid::new_v4()));

    fs::write(&tmp_path, content).map_err(|e| Error::Write {
        path:   tmp_path.clone(),
        source: e,
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::Write {
            path:   path.to_path_buf(),
            source: e,
        }
    })
}
