//! Error types for minicoord

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Construction Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // === Barrier State Machine ===
    #[error("Invalid state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Could not create barrier entry: {0}")]
    EntryFailed(String),

    #[error("Wait cancelled")]
    Cancelled,

    // === Store Errors ===
    #[error("Node already exists: {0}")]
    AlreadyExists(String),

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Node has children: {0}")]
    NotEmpty(String),

    #[error("Ephemeral nodes cannot have children: {0}")]
    NoChildrenForEphemerals(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    // === Watch Errors ===
    #[error("Unexpected watch event: {0}")]
    UnexpectedEvent(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// Store-level "the node was already there" — callers doing idempotent
    /// creation treat this as success.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    /// Store-level "the node was already gone" — callers doing idempotent
    /// deletion treat this as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
