use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Concatenates `parts` in slice order into `destination`.
///
/// The output is staged in the destination's directory and renamed into place
/// only after every part was copied and flushed, so a failed reassembly never
/// leaves a truncated destination behind. Returns the number of bytes written.
pub fn assemble(parts: &[PathBuf], destination: &Path) -> Result<u64> {
    let parent = destination
        .parent()
        .ok_or_else(|| Error::NoParent(destination.to_path_buf()))?;
    let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };

    std::fs::create_dir_all(parent).map_err(|e| Error::Write {
        path:   parent.to_path_buf(),
        source: e,
    })?;

    let staged = tempfile::Builder::new()
        .prefix(".assemble-")
        .tempfile_in(parent)
        .map_err(|e| Error::Write {
            path:   parent.to_path_buf(),
            source: e,
        })?;

    let mut written = 0u64;
    {
        let mut out = BufWriter::new(staged.as_file());
        for part in parts {
            let mut input = File::open(part).map_err(|e| Error::Read {
                path:   part.clone(),
                source: e,
            })?;
            written += io::copy(&mut input, &mut out).map_err(|e| Error::Write {
                path:   destination.to_path_buf(),
                source: e,
            })?;
        }
        out.flush().map_err(|e| Error::Write {
            path:   destination.to_path_buf(),
            source: e,
        })?;
    }

    staged.as_file().sync_all().map_err(|e| Error::Write {
        path:   destination.to_path_buf(),
        source: e,
    })?;

    staged.persist(destination).map_err(|e| Error::Write {
        path:   destination.to_path_buf(),
        source: e.error,
    })?;

    tracing::debug!(
        destination = %destination.display(),
        parts = parts.len(),
        bytes = written,
        "reassembled file"
    );

    Ok(written)
}
