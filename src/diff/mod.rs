//! Diff & change algebra.
//!
//! A [`Diff`] records how one key changed, keeping the old value around so
//! that downstream operators can compute their own diffs. A [`Change`] is the
//! write-side projection used when persisting.

mod mapper;
mod merge;

use serde::{Deserialize, Serialize};

use crate::key::Key;

pub use mapper::{map_diff, Mapper};
pub use merge::{batch_to_diff, diff_sorted, Age, TaggedBatches, TaggedItem};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diff<T> {
    Add { key: Key, value: T },
    Delete { key: Key, value: T },
    Replace { key: Key, old_value: T, new_value: T },
}

impl<T> Diff<T> {
    pub fn add(key: Key, value: T) -> Self {
        Diff::Add { key, value }
    }

    pub fn delete(key: Key, value: T) -> Self {
        Diff::Delete { key, value }
    }

    pub fn replace(key: Key, old_value: T, new_value: T) -> Self {
        Diff::Replace {
            key,
            old_value,
            new_value,
        }
    }

    pub fn key(&self) -> &Key {
        match self {
            Diff::Add { key, .. } | Diff::Delete { key, .. } | Diff::Replace { key, .. } => key,
        }
    }

    /// The value before the diff, if the key existed.
    pub fn old_value(&self) -> Option<&T> {
        match self {
            Diff::Add { .. } => None,
            Diff::Delete { value, .. } => Some(value),
            Diff::Replace { old_value, .. } => Some(old_value),
        }
    }

    /// The value after the diff, if the key still exists.
    pub fn new_value(&self) -> Option<&T> {
        match self {
            Diff::Add { value, .. } => Some(value),
            Diff::Delete { .. } => None,
            Diff::Replace { new_value, .. } => Some(new_value),
        }
    }
}

/// A write against a keyed collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change<T> {
    Set { key: Key, value: T },
    Delete { key: Key },
}

impl<T> Change<T> {
    pub fn key(&self) -> &Key {
        match self {
            Change::Set { key, .. } | Change::Delete { key } => key,
        }
    }
}

/// Collapse a diff into the write it implies.
pub fn diff_to_change<T>(diff: Diff<T>) -> Change<T> {
    match diff {
        Diff::Add { key, value } => Change::Set { key, value },
        Diff::Replace { key, new_value, .. } => Change::Set {
            key,
            value: new_value,
        },
        Diff::Delete { key, .. } => Change::Delete { key },
    }
}
