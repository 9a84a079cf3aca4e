//! Cursor-paginated batch jobs over derived collections.
//!
//! Each job walks a list of [`CollectionGroup`]s, pairing what the export
//! graph computes from stored inputs (`expected`) with what is persisted
//! (`actual`). One call processes at most one page of one group, so every
//! page fits in a bounded transaction and a job resumes from its [`Cursor`].
//!
//! - [`backwards_check_page`]: every stored key must be produced by the graph.
//! - [`forwards_check_page`]: every produced value must be stored unchanged.
//! - [`backfill_page`]: write produced rows that are missing. Never deletes
//!   or overwrites.

mod backfill;
mod check;
mod diff;
mod error;
#[cfg(feature = "http")]
pub mod http;
mod runner;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::collections::BTreeMap;

use crate::commit::ReadTracker;
use crate::engine::{inputs_of, spaces_of, Engine};
use crate::error::EngineError;
use crate::key::{key_successor, Key, Range};
use crate::op::Collection;
use crate::space::{Item, ScrambledSpace, Slice};
use crate::store::{CollectionPath, DocumentStore};

pub use backfill::backfill_page;
pub use check::{backwards_check_page, forwards_check_page};
pub use diff::{json_diff, Difference};
pub use error::JobError;
pub use runner::{run_job, run_page, JobKind, JobSummary};

/// An expected collection and where its rows are persisted.
#[derive(Clone, Debug)]
pub struct CollectionGroup {
    pub name: String,
    pub expected: Collection<Value>,
    pub actual: CollectionPath,
}

impl CollectionGroup {
    pub fn new(
        name: impl Into<String>,
        expected: Collection<Value>,
        actual: CollectionPath,
    ) -> Self {
        CollectionGroup {
            name: name.into(),
            expected,
            actual,
        }
    }
}

impl<S: DocumentStore> Engine<S> {
    /// One group per persisted sort, then one per registered export.
    ///
    /// Sorts come first so a backfill repairs them before the exports
    /// that read them are checked.
    pub fn collection_groups(&self) -> Result<Vec<CollectionGroup>, JobError> {
        let mut groups = Vec::new();
        for (name, node) in self.directory().sorts() {
            groups.push(CollectionGroup::new(
                name,
                node.clone(),
                self.sorted_path(name)?,
            ));
        }
        for (name, collection) in self.directory().outputs() {
            groups.push(CollectionGroup::new(
                name,
                collection.clone(),
                self.export_path(name)?,
            ));
        }
        Ok(groups)
    }
}

/// Position of a paginated job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Cursor {
    /// Index of the group being processed.
    pub group: usize,
    /// Last key processed in that group.
    pub after: Option<Key>,
    pub done: bool,
}

impl Cursor {
    pub fn start() -> Self {
        Self::default()
    }

    /// Opaque, URL-safe form.
    pub fn to_token(&self) -> Result<String, JobError> {
        let bytes = bitcode::serialize(self)
            .map_err(|err| JobError::InvalidCursor(err.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_token(token: &str) -> Result<Self, JobError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|err| JobError::InvalidCursor(err.to_string()))?;
        bitcode::deserialize(&bytes).map_err(|err| JobError::InvalidCursor(err.to_string()))
    }

    fn group<'g>(&self, groups: &'g [CollectionGroup]) -> Result<&'g CollectionGroup, JobError> {
        groups.get(self.group).ok_or_else(|| {
            JobError::InvalidCursor(format!(
                "group {} out of {} groups",
                self.group,
                groups.len()
            ))
        })
    }

    /// First key of the next page in a collection of `width` levels.
    fn page_start(&self, width: usize) -> Result<Key, JobError> {
        Ok(match &self.after {
            Some(after) => key_successor(after)?,
            None => Key::origin(width),
        })
    }

    /// Cursor after a page that ended at `last`. A short page moves on to
    /// the next group.
    fn advance(&self, groups: usize, last: Option<Key>, full_page: bool) -> Cursor {
        match last {
            Some(last) if full_page => Cursor {
                group: self.group,
                after: Some(last),
                done: false,
            },
            _ => Cursor {
                group: self.group + 1,
                after: None,
                done: self.group + 1 >= groups,
            },
        }
    }
}

/// A stored value that disagrees with the expected one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub group: String,
    pub key: Key,
    pub expected: Value,
    pub actual: Option<Value>,
    pub differences: Vec<Difference>,
}

/// Outcome of one page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    /// Where the next page starts.
    pub cursor: Cursor,
    /// Keys examined.
    pub processed: usize,
    pub inconsistencies: Vec<Inconsistency>,
    /// Rows written by a backfill.
    pub written: usize,
}

impl PageReport {
    fn finished(cursor: &Cursor) -> Self {
        PageReport {
            cursor: cursor.clone(),
            ..Self::default()
        }
    }
}

/// Evaluate `group.expected` over the engine's stored inputs and hand the
/// result to `f`. Persisted sorts are read as stored, except the one the
/// group checks, which is rebuilt from its inputs. Store errors hit while
/// reading surface after `f` returns.
fn with_expected<S, R, F>(engine: &Engine<S>, group: &CollectionGroup, f: F) -> Result<R, JobError>
where
    S: DocumentStore,
    F: FnOnce(&dyn ScrambledSpace<Value>) -> Result<R, JobError>,
{
    let width = group.expected.schema(&engine.input_schemas())?.len();
    if width != group.actual.schema.len() {
        return Err(EngineError::SchemaMismatch {
            expected: group.actual.schema.len(),
            actual: width,
        }
        .into());
    }
    let tracker = ReadTracker::new();
    let readables = engine.readables(&tracker);
    let mut sorted_readables = engine.sorted_readables(&tracker)?;
    sorted_readables.retain(|_, readable| readable.collection_path() != &group.actual);
    let spaces = spaces_of(&readables);
    let sorted_spaces = spaces_of(&sorted_readables);
    let inputs = inputs_of(&spaces);
    let sorted = inputs_of(&sorted_spaces);
    let space = group.expected.evaluate_over(&inputs, &sorted)?;
    let result = f(&*space);
    if let Some(err) = tracker.take_error()? {
        return Err(err.into());
    }
    result
}

/// Up to `limit` expected items from the cursor, in key order, and whether
/// the page is full.
fn expected_page(
    space: &dyn ScrambledSpace<Value>,
    cursor: &Cursor,
    width: usize,
    limit: usize,
) -> Result<(Vec<Item<Value>>, bool), JobError> {
    let start = cursor.page_start(width)?;
    let mut slices = space.seek_to(&start).peekable();

    // A single slice over the rest of the space is already in key order.
    let ordered = matches!(
        slices.peek(),
        Some(Ok(Slice { range: Range::Unbounded { start: from }, .. })) if *from <= start
    );
    let mut items = if ordered {
        match slices.next() {
            Some(slice) => slice?
                .iter
                .skip_while(|item| matches!(item, Ok(item) if item.key < start))
                .take(limit + 1)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        }
    } else {
        // Scrambled slices: keep the smallest `limit + 1` keys seen.
        let mut smallest = BTreeMap::new();
        for slice in slices {
            let slice = slice?;
            for item in slice.iter {
                let item = item?;
                if item.key < start || !slice.range.contains_unchecked(&item.key) {
                    continue;
                }
                smallest.insert(item.key, item.value);
                if smallest.len() > limit + 1 {
                    smallest.pop_last();
                }
            }
        }
        smallest
            .into_iter()
            .map(|(key, value)| Item::new(key, value))
            .collect()
    };
    let full = items.len() > limit;
    items.truncate(limit);
    Ok((items, full))
}
