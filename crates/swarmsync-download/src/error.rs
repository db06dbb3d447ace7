use swarmsync_data::DataError;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download aborted: {0}")]
    Aborted(String),

    #[error("download signalled completion without finishing or aborting")]
    Interrupted,

    #[error("timed out waiting for download")]
    Timeout,

    #[error("invalid chunk list: {0}")]
    InvalidChunks(String),

    #[error(transparent)]
    Fs(#[from] swarmsync_fs::Error),

    #[error("download pool unavailable: {0}")]
    Pool(String),
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// Why a single chunk could not be retrieved.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ChunkError {
    #[error("chunk {index} ({id}) could not be fetched: {source}")]
    Fetch {
        index:  usize,
        id:     String,
        source: DataError,
    },

    #[error("chunk {index} ({id}) could not be decrypted: {source}")]
    Decrypt {
        index:  usize,
        id:     String,
        source: DataError,
    },

    #[error("chunk {index} ({id}) is {actual} bytes, expected {expected}")]
    Size {
        index:    usize,
        id:       String,
        expected: u64,
        actual:   u64,
    },

    #[error("chunk {index} could not be staged: {source}")]
    Write {
        index:  usize,
        source: swarmsync_fs::Error,
    },

    #[error("chunk {index} discarded after abort")]
    Discarded { index: usize },
}
