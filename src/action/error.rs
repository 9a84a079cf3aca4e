use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No timestamp could be decoded from the id.
    InvalidActionId(String),
    /// The clock reading has no fixed-width timestamp.
    Timestamp(String),
    Serde(String),
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::InvalidActionId(id) => write!(f, "invalid action id: {}", id),
            ActionError::Timestamp(msg) => write!(f, "timestamp error: {}", msg),
            ActionError::Serde(msg) => write!(f, "action serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ActionError {}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        ActionError::Serde(err.to_string())
    }
}
