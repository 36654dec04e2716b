//! Error taxonomy for edits and engine synchronization.

use thiserror::Error;

/// Failure reported by the external pattern engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError(s.to_string())
    }
}

/// Errors surfaced by table edits and engine synchronization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeqError {
    /// Out-of-range index. The edit was rejected with no partial mutation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A capacity limit would be exceeded. The table is unchanged.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Engine state after a mutation does not match what was requested.
    #[error("engine inconsistency: {0}")]
    EngineInconsistency(String),

    /// The engine rejected a call outright.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

pub type SeqResult<T = ()> = Result<T, SeqError>;

impl SeqError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SeqError::InvalidArgument(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        SeqError::ResourceExhausted(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        SeqError::EngineInconsistency(msg.into())
    }

    /// True for errors caused by the request itself rather than the engine.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SeqError::InvalidArgument(_) | SeqError::ResourceExhausted(_)
        )
    }
}
