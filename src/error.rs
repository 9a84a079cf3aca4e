use std::fmt;

/// Invariant violations raised by the key, diff and operator layers.
///
/// None of these are recoverable by retrying: they indicate a bug in an
/// operator, a mapper or a schema definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    SchemaMismatch {
        expected: usize,
        actual: usize,
    },
    EmptySegment {
        key: Vec<String>,
    },
    /// A requested range was not fully contained in the first returned slice.
    SliceSpansRange {
        requested: String,
        slice: String,
    },
    /// More than one old/new pair was produced for a single output key.
    DuplicateKey {
        key: Vec<String>,
    },
    NonInjectiveMapper {
        key: Vec<String>,
    },
    MisalignedSlice {
        range: String,
        dropped: usize,
    },
    InvalidPermutation(Vec<usize>),
    UnknownCollection(String),
    Serde(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::SchemaMismatch { expected, actual } => write!(
                f,
                "schema mismatch (expected key length {}, got {})",
                expected, actual
            ),
            EngineError::EmptySegment { key } => {
                write!(f, "empty segment in key {:?}", key)
            }
            EngineError::SliceSpansRange { requested, slice } => write!(
                f,
                "range {} is not contained in a single slice (first slice {})",
                requested, slice
            ),
            EngineError::DuplicateKey { key } => {
                write!(f, "duplicate output key {:?}", key)
            }
            EngineError::NonInjectiveMapper { key } => {
                write!(f, "mapper produced key {:?} more than once", key)
            }
            EngineError::MisalignedSlice { range, dropped } => write!(
                f,
                "slice {} is not aligned on a group prefix (dropping {} levels)",
                range, dropped
            ),
            EngineError::InvalidPermutation(p) => write!(f, "invalid permutation {:?}", p),
            EngineError::UnknownCollection(name) => write!(f, "unknown collection: {}", name),
            EngineError::Serde(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serde(err.to_string())
    }
}
