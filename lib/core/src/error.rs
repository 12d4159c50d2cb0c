use thiserror::Error;

use crate::state::FieldState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Taxonomy proposal failed: {0}")]
    ProposalFailure(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Network or HTTP failure talking to a remote collaborator
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid field state transition: {from} -> {to}")]
    InvalidTransition { from: FieldState, to: FieldState },
}

impl Error {
    /// Whether a collaborator call that failed with this error may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingUnavailable(_) | Error::Transport(_) | Error::Store(_) | Error::Io(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::EmbeddingUnavailable("timeout".into()).is_retryable());
        assert!(Error::Store("connection reset".into()).is_retryable());
        assert!(Error::Transport("HTTP 429".into()).is_retryable());
        assert!(!Error::InvalidInput("empty taxonomy".into()).is_retryable());
        assert!(!Error::DimensionMismatch { expected: 3, actual: 4 }.is_retryable());
        assert!(!Error::ProposalFailure("no categories".into()).is_retryable());
    }
}
