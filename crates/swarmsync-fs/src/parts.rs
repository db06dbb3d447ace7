use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{Error, Result};

/// Private staging directory for the parts of one chunked file.
///
/// The directory is unique per owner and created eagerly. It is removed by
/// [`PartDir::close`], or on drop if it was never closed.
#[derive(Debug)]
pub struct PartDir {
    root: PathBuf,
    dir:  Option<TempDir>,
}

impl PartDir {
    /// Creates a fresh directory under the system temp dir.
    pub fn new() -> Result<Self> { Self::build(None) }

    /// Creates a fresh directory under `root`, creating `root` if needed.
    pub fn new_in(root: impl AsRef<Path>) -> Result<Self> { Self::build(Some(root.as_ref())) }

    fn build(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("swarmsync-parts-");

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| Error::Staging {
                    root:   root.to_path_buf(),
                    source: e,
                })?;
                builder.tempdir_in(root).map_err(|e| Error::Staging {
                    root:   root.to_path_buf(),
                    source: e,
                })?
            }
            None => builder.tempdir().map_err(|e| Error::Staging {
                root:   std::env::temp_dir(),
                source: e,
            })?,
        };

        Ok(Self {
            root: dir.path().to_path_buf(),
            dir:  Some(dir),
        })
    }

    pub fn path(&self) -> &Path { &self.root }

    /// Path that part `index` is staged under.
    pub fn part_path(&self, index: usize) -> PathBuf { part_path(&self.root, index) }

    pub fn is_closed(&self) -> bool { self.dir.is_none() }

    /// Deletes the directory and everything staged in it.
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close().map_err(|e| Error::Write {
                path:   self.root.clone(),
                source: e,
            }),
            None => Ok(()),
        }
    }
}

/// Stages `content` as part `index` under `root` and returns the written path.
///
/// Free-standing so writers only need the root path, not the owning [`PartDir`].
pub fn write_part(root: &Path, index: usize, content: &[u8]) -> Result<PathBuf> {
    let path = part_path(root, index);
    crate::atomic_write(&path, content)?;
    Ok(path)
}

fn part_path(root: &Path, index: usize) -> PathBuf { root.join(format!("part-{index:06}")) }

impl PartDir {
    /// Stages `content` as part `index`.
    pub fn write(&self, index: usize, content: &[u8]) -> Result<PathBuf> {
        write_part(&self.root, index, content)
    }
}
