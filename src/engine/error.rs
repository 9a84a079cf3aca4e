use std::fmt;

use crate::commit::CommitError;
use crate::error::EngineError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrateError {
    /// The consumer's integration function refused the action.
    Integrator(String),
    Commit(CommitError),
    Engine(EngineError),
    Store(StoreError),
    /// Every attempt lost to a concurrent writer.
    RetriesExhausted {
        attempts: usize,
    },
}

impl IntegrateError {
    pub fn integrator(reason: impl Into<String>) -> Self {
        IntegrateError::Integrator(reason.into())
    }
}

impl fmt::Display for IntegrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrateError::Integrator(reason) => write!(f, "action rejected: {}", reason),
            IntegrateError::Commit(err) => write!(f, "{}", err),
            IntegrateError::Engine(err) => write!(f, "{}", err),
            IntegrateError::Store(err) => write!(f, "{}", err),
            IntegrateError::RetriesExhausted { attempts } => {
                write!(f, "gave up after {} conflicting attempts", attempts)
            }
        }
    }
}

impl std::error::Error for IntegrateError {}

impl From<CommitError> for IntegrateError {
    fn from(err: CommitError) -> Self {
        IntegrateError::Commit(err)
    }
}

impl From<EngineError> for IntegrateError {
    fn from(err: EngineError) -> Self {
        IntegrateError::Engine(err)
    }
}

impl From<StoreError> for IntegrateError {
    fn from(err: StoreError) -> Self {
        IntegrateError::Store(err)
    }
}
