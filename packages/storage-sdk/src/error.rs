use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The storage API answered with a non-success status.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid storage URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),
}

impl StorageError {
    /// HTTP status reported by the storage API, if the failure came from it.
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::Api { status, .. } => Some(*status),
            StorageError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
