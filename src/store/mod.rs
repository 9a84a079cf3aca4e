//! Abstract transactional document store.
//!
//! Documents are JSON values addressed by a [`DocPath`]. Collections live
//! under a root path with key segments interleaved with schema level names,
//! so path order within a collection is key order:
//!
//! | document | path |
//! |---|---|
//! | facet | `facets/<collection>/<level>/<segment>/...` |
//! | pointer | `pointers/<collection>/<segment>/...` |
//! | saved action | `actions/<action id>` |
//! | kollection | `kollections/<kollection id>` |
//! | export row | `exports/<name>/<level>/<segment>/...` |
//! | sorted row | `sorted/<name>/<level>/<segment>/...` |

mod error;
mod in_memory;

use std::fmt;
use std::ops::Bound;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::key::{check_width, Key, Schema};

pub use error::StoreError;
pub use in_memory::InMemoryDocumentStore;

/// Slash-free path of a document.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DocPath(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, segment: impl Into<String>) -> DocPath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        DocPath(segments)
    }

    pub fn join(&self, tail: &[String]) -> DocPath {
        let mut segments = self.0.clone();
        segments.extend_from_slice(tail);
        DocPath(segments)
    }

    /// True when `self` lies strictly below `prefix`.
    pub fn is_under(&self, prefix: &DocPath) -> bool {
        self.0.len() > prefix.0.len() && self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

pub fn pointer_root(collection: &str) -> DocPath {
    DocPath::new(["pointers", collection])
}

pub fn pointer_path(collection: &str, key: &Key) -> DocPath {
    pointer_root(collection).join(key.segments())
}

pub fn action_path(id: &str) -> DocPath {
    DocPath::new(["actions", id])
}

pub fn kollection_path(id: &str) -> DocPath {
    DocPath::new(["kollections", id])
}

/// Where a keyed collection is stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPath {
    pub root: DocPath,
    pub schema: Schema,
}

impl CollectionPath {
    pub fn new(root: DocPath, schema: Schema) -> Self {
        CollectionPath { root, schema }
    }

    pub fn facets(collection: &str, schema: Schema) -> Self {
        Self::new(DocPath::new(["facets", collection]), schema)
    }

    pub fn exports(name: &str, schema: Schema) -> Self {
        Self::new(DocPath::new(["exports", name]), schema)
    }

    /// Rows of a persisted sort.
    pub fn sorted(name: &str, schema: Schema) -> Self {
        Self::new(DocPath::new(["sorted", name]), schema)
    }

    /// Path of the document at `key`. `key` may be a bound with sentinel
    /// segments, for use as a scan start.
    pub fn doc_path(&self, key: &Key) -> Result<DocPath, EngineError> {
        check_width(self.schema.len(), key)?;
        let tail: Vec<String> = self
            .schema
            .levels()
            .iter()
            .zip(key.segments())
            .flat_map(|(level, segment)| [level.clone(), segment.clone()])
            .collect();
        Ok(self.root.join(&tail))
    }

    /// Inverse of [`doc_path`](Self::doc_path) for real keys. `None` for
    /// paths that do not belong to this collection.
    pub fn key_of(&self, path: &DocPath) -> Option<Key> {
        let tail = path.segments().strip_prefix(self.root.segments())?;
        if tail.len() != 2 * self.schema.len() {
            return None;
        }
        let mut segments = Vec::with_capacity(self.schema.len());
        for (pair, level) in tail.chunks(2).zip(self.schema.levels()) {
            if &pair[0] != level {
                return None;
            }
            segments.push(pair[1].clone());
        }
        Key::new(segments).ok()
    }
}

/// Reads and writes inside one atomic unit. Reads observe the
/// transaction's own earlier writes.
pub trait Transaction {
    fn get(&mut self, path: &DocPath) -> Result<Option<Value>, StoreError>;

    fn set(&mut self, path: DocPath, value: Value) -> Result<(), StoreError>;

    fn delete(&mut self, path: DocPath) -> Result<(), StoreError>;

    /// Up to `limit` documents strictly below `prefix` starting at `start`,
    /// ascending by path.
    fn scan(
        &mut self,
        prefix: &DocPath,
        start: Bound<DocPath>,
        limit: usize,
    ) -> Result<Vec<(DocPath, Value)>, StoreError>;
}

/// An ordered, transactional document store.
pub trait DocumentStore: Send + Sync {
    /// Snapshot read of one document.
    fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError>;

    /// Snapshot read of up to `limit` documents strictly below `prefix`
    /// starting at `start`, ascending by path.
    fn scan(
        &self,
        prefix: &DocPath,
        start: Bound<DocPath>,
        limit: usize,
    ) -> Result<Vec<(DocPath, Value)>, StoreError>;

    /// Run `f` atomically. Its writes become visible together if it returns
    /// `Ok`, and are discarded otherwise.
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<R, E>,
        E: From<StoreError>;
}

/// Decode a stored document.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(value)?)
}

/// Encode a document for storage.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}
