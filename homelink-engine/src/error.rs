//! Error handling for the HomeLink engine
//!
//! One error type covers the whole engine. Callers use the classification
//! helpers to decide between silent retry, a non-blocking banner, and an
//! explicit user-facing message: local and remote I/O failures are recoverable,
//! an exhausted credit quota requires the user to act, and everything else is
//! an internal condition that is logged and tolerated.

use thiserror::Error;

/// Result type for all engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// The interaction credit quota is used up; `consume()` refused to charge
    #[error("interaction credits exhausted")]
    CreditsExhausted,

    /// Local durable-store failure (read or write)
    #[error("local storage error: {0}")]
    Storage(String),

    /// Remote conversation-store or listing-API failure
    #[error("remote service error: {0}")]
    Remote(String),

    /// Observed state contradicts an invariant (e.g. an unlock flag written
    /// without a durable credit spend); logged and tolerated, never fatal
    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    /// Identity resolution exhausted every tier for a counterparty
    #[error("identity not resolvable: {0}")]
    NotResolvable(String),

    /// Persisted or remote-shaped data failed to encode/decode
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid engine configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl EngineError {
    /// Whether the operation can be retried without user involvement
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Storage(_) | EngineError::Remote(_))
    }

    /// Whether the user must act before the operation can succeed
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            EngineError::CreditsExhausted | EngineError::Configuration(_)
        )
    }
}
