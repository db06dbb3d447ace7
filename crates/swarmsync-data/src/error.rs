#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("no entry at {0}")]
    NotFound(String),

    #[error("protection key rejected for {0}")]
    Denied(String),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
