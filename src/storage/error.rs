use thiserror::Error;

/// Session-store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object does not exist: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("encode/decode error: {0}")]
    Encoding(String),

    #[error("store i/o error: {0}")]
    Io(String),

    #[error("lock on {0} not acquired")]
    LockTimeout(String),
}

impl From<rmp_serde::encode::Error> for StorageError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StorageError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}
