//! Approval error types.

use thiserror::Error;

/// Approval errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The approval service could not be reached.
    #[error("approval gateway unavailable: {0}")]
    Unavailable(String),

    /// The approval service answered with an error.
    #[error("approval gateway rejected the request: {0}")]
    Api(String),

    /// No request with this id was ever submitted.
    #[error("approval request not found: {0}")]
    NotFound(String),

    /// A decision was already recorded for this request.
    #[error("approval request {0} already decided")]
    AlreadyDecided(String),

    /// Failed to parse a policy file.
    #[error("failed to parse policy: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred while reading policy.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
