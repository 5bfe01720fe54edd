//! Error types shared by every keeper collaborator.

use thiserror::Error;

/// Result type alias for collaborator operations.
pub type KeeperResult<T> = Result<T, KeeperError>;

/// Errors surfaced by the rule store, metric reader, fleet API and
/// identity resolution.
///
/// The enum is `Clone` so one resolution outcome can be handed to every
/// caller that waited on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KeeperError {
    /// Rejected locally before anything went over the wire.
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote envelope carried a non-success code.
    #[error("http code:{code} | msg:{message}")]
    Api { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("rule store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),
}

impl KeeperError {
    /// Whether the failure was raised locally by argument validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, KeeperError::Validation(_))
    }
}
