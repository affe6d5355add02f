use crate::model::ModelError;
use crate::tools::ToolError;
use approval::ApprovalRequestId;
use storage::CheckpointId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A tool error that aborts the step rather than being shown to the model.
    #[error(transparent)]
    Tool(ToolError),

    /// The checkpoint store could not be written or read.
    #[error("checkpoint store unavailable: {0}")]
    StoreUnavailable(String),

    /// No unconsumed checkpoint for this id; the decision cannot be applied.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(CheckpointId),

    /// The decision does not say which checkpoint it answers.
    #[error("decision for {0} carries no checkpoint id")]
    MissingCorrelation(ApprovalRequestId),

    #[error("run did not finish within {0} turns")]
    TurnLimit(usize),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Approval(#[from] approval::Error),
}

impl From<ToolError> for Error {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::StoreUnavailable(reason) => Self::StoreUnavailable(reason),
            other => Self::Tool(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
