//! Keys, schemas and half-open ranges over ordered string tuples.
//!
//! A [`Key`] is a fixed-width tuple of string segments whose width is given
//! by a [`Schema`]. Keys order lexicographically, segment by segment, using
//! byte-wise string order. Empty segments never occur in stored keys; they
//! are reserved as "start of range" sentinels in range bounds.
//!
//! ```ignore
//! let k = Key::new(["g1", "p1"])?;
//! let r = single_value(&k)?;
//! assert!(r.contains(&k)?);
//! ```

mod range;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub use range::Range;

/// An ordered tuple of string segments.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Vec<String>);

impl Key {
    /// Build a real key. Fails on empty segments.
    pub fn new<I, S>(segments: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = Key(segments.into_iter().map(Into::into).collect());
        if !key.is_real() {
            return Err(EngineError::EmptySegment { key: key.0 });
        }
        Ok(key)
    }

    /// Build a range bound. Empty segments are allowed.
    pub fn bound(segments: Vec<String>) -> Self {
        Key(segments)
    }

    /// The smallest bound of the given width (all sentinel segments).
    pub fn origin(width: usize) -> Self {
        Key(vec![String::new(); width])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn into_segments(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when no segment is the empty sentinel.
    pub fn is_real(&self) -> bool {
        self.0.iter().all(|s| !s.is_empty())
    }

    pub fn concat(&self, suffix: &[String]) -> Key {
        let mut segments = Vec::with_capacity(self.0.len() + suffix.len());
        segments.extend_from_slice(&self.0);
        segments.extend_from_slice(suffix);
        Key(segments)
    }

    /// Append `n` sentinel segments.
    pub fn padded(&self, n: usize) -> Key {
        let mut segments = self.0.clone();
        segments.resize(self.0.len() + n, String::new());
        Key(segments)
    }

    /// Drop the last `n` segments.
    pub fn truncated(&self, n: usize) -> Result<Key, EngineError> {
        if n > self.0.len() {
            return Err(EngineError::SchemaMismatch {
                expected: n,
                actual: self.0.len(),
            });
        }
        Ok(Key(self.0[..self.0.len() - n].to_vec()))
    }

    /// Split into the first `at` segments and the rest.
    pub fn split(&self, at: usize) -> Result<(Key, Key), EngineError> {
        if at > self.0.len() {
            return Err(EngineError::SchemaMismatch {
                expected: at,
                actual: self.0.len(),
            });
        }
        let (head, tail) = self.0.split_at(at);
        Ok((Key(head.to_vec()), Key(tail.to_vec())))
    }

    /// Reorder segments so that `out[i] = self[permutation[i]]`.
    pub fn permuted(&self, permutation: &[usize]) -> Result<Key, EngineError> {
        if permutation.len() != self.0.len() {
            return Err(EngineError::SchemaMismatch {
                expected: permutation.len(),
                actual: self.0.len(),
            });
        }
        permutation
            .iter()
            .map(|&i| {
                self.0
                    .get(i)
                    .cloned()
                    .ok_or_else(|| EngineError::InvalidPermutation(permutation.to_vec()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl<const N: usize> From<[&str; N]> for Key {
    /// Unchecked conversion; use [`Key::new`] to reject empty segments.
    fn from(segments: [&str; N]) -> Self {
        Key(segments.iter().map(|s| s.to_string()).collect())
    }
}

/// Ordered level names for the keys of one collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Vec<String>);

impl Schema {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema(levels.into_iter().map(Into::into).collect())
    }

    pub fn levels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extended(&self, sub_schema: &Schema) -> Schema {
        let mut levels = self.0.clone();
        levels.extend_from_slice(&sub_schema.0);
        Schema(levels)
    }

    pub fn truncated(&self, n: usize) -> Result<Schema, EngineError> {
        if n > self.0.len() {
            return Err(EngineError::SchemaMismatch {
                expected: n,
                actual: self.0.len(),
            });
        }
        Ok(Schema(self.0[..self.0.len() - n].to_vec()))
    }

    pub fn permuted(&self, permutation: &[usize]) -> Result<Schema, EngineError> {
        Key(self.0.clone()).permuted(permutation).map(|k| Schema(k.0))
    }

    /// Fail unless `key` has this schema's width.
    pub fn check(&self, key: &Key) -> Result<(), EngineError> {
        check_width(self.0.len(), key)
    }
}

pub(crate) fn check_width(width: usize, key: &Key) -> Result<(), EngineError> {
    if key.len() != width {
        return Err(EngineError::SchemaMismatch {
            expected: width,
            actual: key.len(),
        });
    }
    Ok(())
}

/// Lexicographic comparison of two keys of equal width.
pub fn compare_keys(a: &Key, b: &Key) -> Result<Ordering, EngineError> {
    check_width(a.len(), b)?;
    Ok(a.cmp(b))
}

/// The smallest key of the same width strictly greater than `key`.
pub fn key_successor(key: &Key) -> Result<Key, EngineError> {
    let mut segments = key.0.clone();
    match segments.last_mut() {
        Some(last) => {
            last.push('\0');
            Ok(Key(segments))
        }
        None => Err(EngineError::SchemaMismatch {
            expected: 1,
            actual: 0,
        }),
    }
}

/// `[key, key_successor(key))`, the range holding exactly `key`.
pub fn single_value(key: &Key) -> Result<Range, EngineError> {
    Ok(Range::bounded(key.clone(), key_successor(key)?))
}
