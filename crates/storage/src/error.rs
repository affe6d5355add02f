use crate::CheckpointId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing medium cannot be reached (poisoned lock, closed pool).
    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),

    /// Unknown id, or the checkpoint was already consumed.
    #[error("checkpoint not found: {0}")]
    NotFound(CheckpointId),
}

impl Error {
    /// Whether this error means the checkpoint does not exist (or no longer does).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
