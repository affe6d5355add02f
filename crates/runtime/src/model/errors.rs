use thiserror::Error;

/// Errors from a model backend call.
///
/// None of these leave a checkpoint behind: the backend is only called
/// between tool dispatches, never while a call is parked.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request never reached the provider.
    #[error("network: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// Backend-local state could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A scripted backend ran out of replies.
    #[error("script exhausted after {0} replies")]
    ScriptExhausted(usize),
}
