use std::fmt;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    LockPoisoned(&'static str),
    Serde(String),
    /// The store gave up on the transaction; retrying may succeed.
    Aborted(String),
    Storage(String),
    /// A stored document failed its collection's validator.
    Invalid { path: String, reason: String },
    Engine(EngineError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::LockPoisoned(operation) => {
                write!(f, "store lock poisoned during {}", operation)
            }
            StoreError::Serde(msg) => write!(f, "document serialization error: {}", msg),
            StoreError::Aborted(msg) => write!(f, "transaction aborted: {}", msg),
            StoreError::Storage(msg) => write!(f, "storage error: {}", msg),
            StoreError::Invalid { path, reason } => {
                write!(f, "invalid document at {}: {}", path, reason)
            }
            StoreError::Engine(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err.to_string())
    }
}

impl From<EngineError> for StoreError {
    fn from(err: EngineError) -> Self {
        StoreError::Engine(err)
    }
}
