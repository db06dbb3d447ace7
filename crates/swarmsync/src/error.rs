use std::path::PathBuf;

use swarmsync_data::DataError;
use swarmsync_download::DownloadError;
use swarmsync_process::{ProcessError, RollbackReason};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read '{path}': {source}")]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("'{0}' does not name a file")]
    NotAFile(PathBuf),

    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Fs(#[from] swarmsync_fs::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("process failed: {0}")]
    Failed(#[source] RollbackReason),
}

pub type Result<T> = std::result::Result<T, Error>;
