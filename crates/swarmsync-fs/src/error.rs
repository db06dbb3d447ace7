use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read '{path}': {source}")]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("'{0}' has no parent directory")]
    NoParent(PathBuf),

    #[error("part {index} is outside the staged range 0..{len}")]
    PartOutOfRange { index: usize, len: usize },

    #[error("failed to create staging directory under '{root}': {source}")]
    Staging {
        root:   PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
