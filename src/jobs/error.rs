use std::fmt;

use crate::error::EngineError;
use crate::key::Key;
use crate::store::StoreError;

/// Structural failures that halt a batch job. Value mismatches found by a
/// forwards check are not errors; they are reported on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    Store(StoreError),
    Engine(EngineError),
    InvalidCursor(String),
    /// A stored row that the expected collection does not produce.
    UnexpectedKey {
        group: String,
        key: Key,
    },
}

impl JobError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            JobError::InvalidCursor(_) => 400,
            JobError::UnexpectedKey { .. } => 409,
            JobError::Store(_) | JobError::Engine(_) => 500,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Store(err) => write!(f, "{}", err),
            JobError::Engine(err) => write!(f, "{}", err),
            JobError::InvalidCursor(msg) => write!(f, "invalid cursor: {}", msg),
            JobError::UnexpectedKey { group, key } => {
                write!(f, "unexpected key {} in {}", key, group)
            }
        }
    }
}

impl std::error::Error for JobError {}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::Store(err)
    }
}

impl From<EngineError> for JobError {
    fn from(err: EngineError) -> Self {
        JobError::Engine(err)
    }
}
