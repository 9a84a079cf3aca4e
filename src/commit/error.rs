use std::fmt;

use crate::action::ActionError;
use crate::error::EngineError;
use crate::store::StoreError;

/// Failures of the commit protocol itself. A stale read set is not an
/// error; it comes back as [`CommitOutcome::Conflict`](super::CommitOutcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    Store(StoreError),
    Engine(EngineError),
    Action(ActionError),
    /// The commit is malformed, e.g. it writes a facet it never read.
    InvalidCommit(String),
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitError::Store(err) => write!(f, "commit store error: {}", err),
            CommitError::Engine(err) => write!(f, "commit engine error: {}", err),
            CommitError::Action(err) => write!(f, "commit action error: {}", err),
            CommitError::InvalidCommit(msg) => write!(f, "invalid commit: {}", msg),
        }
    }
}

impl std::error::Error for CommitError {}

impl From<StoreError> for CommitError {
    fn from(err: StoreError) -> Self {
        CommitError::Store(err)
    }
}

impl From<EngineError> for CommitError {
    fn from(err: EngineError) -> Self {
        CommitError::Engine(err)
    }
}

impl From<ActionError> for CommitError {
    fn from(err: ActionError) -> Self {
        CommitError::Action(err)
    }
}
