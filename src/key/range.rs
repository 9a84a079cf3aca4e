use std::fmt;

use serde::{Deserialize, Serialize};

use super::{check_width, Key};
use crate::error::EngineError;

/// A half-open `[start, end)` or open-ended `[start, inf)` range of keys.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Range {
    Bounded { start: Key, end: Key },
    Unbounded { start: Key },
}

impl Range {
    pub fn bounded(start: Key, end: Key) -> Self {
        Range::Bounded { start, end }
    }

    pub fn unbounded(start: Key) -> Self {
        Range::Unbounded { start }
    }

    pub fn start(&self) -> &Key {
        match self {
            Range::Bounded { start, .. } | Range::Unbounded { start } => start,
        }
    }

    pub fn end(&self) -> Option<&Key> {
        match self {
            Range::Bounded { end, .. } => Some(end),
            Range::Unbounded { .. } => None,
        }
    }

    pub fn width(&self) -> usize {
        self.start().len()
    }

    pub fn contains(&self, key: &Key) -> Result<bool, EngineError> {
        check_width(self.width(), key)?;
        Ok(self.contains_unchecked(key))
    }

    /// Containment without the width check, for hot loops over keys already
    /// validated against the schema.
    pub(crate) fn contains_unchecked(&self, key: &Key) -> bool {
        key >= self.start() && self.end().map_or(true, |end| key < end)
    }

    /// True when no key of the range's width lies beyond `key`'s position,
    /// i.e. `key` is at or past the end bound.
    pub(crate) fn is_past(&self, key: &Key) -> bool {
        self.end().map_or(false, |end| key >= end)
    }

    /// True when every key in `self` is also in `outer`.
    pub fn within(&self, outer: &Range) -> Result<bool, EngineError> {
        check_width(outer.width(), self.start())?;
        if self.start() < outer.start() {
            return Ok(false);
        }
        Ok(match (self.end(), outer.end()) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(inner), Some(outer)) => inner <= outer,
        })
    }

    /// Apply `f` to both bounds.
    pub(crate) fn map_bounds<F>(&self, mut f: F) -> Result<Range, EngineError>
    where
        F: FnMut(&Key) -> Result<Key, EngineError>,
    {
        Ok(match self {
            Range::Bounded { start, end } => Range::bounded(f(start)?, f(end)?),
            Range::Unbounded { start } => Range::unbounded(f(start)?),
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Range::Bounded { start, end } => {
                write!(f, "[{:?}, {:?})", start.segments(), end.segments())
            }
            Range::Unbounded { start } => write!(f, "[{:?}, inf)", start.segments()),
        }
    }
}
