//! Optimistic transactional commits.
//!
//! A [`Commit`] carries the read set its integration observed. Inside one
//! store transaction, [`execute_commit`] re-reads every observed pointer and
//! kollection, and every derived row the commit rewrites, and writes only if
//! all of them are unchanged. There are no locks: concurrent writers find
//! each other here and the loser retries.
//!
//! ```ignore
//! let commit = CommitBuilder::new(action)
//!     .read_set(tracker.read_set()?)
//!     .membership(membership)
//!     .diff(facet, schema, &diff)
//!     .build()?;
//! match execute_commit(&store, &ids, commit)? {
//!     CommitOutcome::Committed { action_id } => ..,
//!     CommitOutcome::Conflict { conflicts } => retry(),
//! }
//! ```

mod builder;
mod error;
mod tracked;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::{ActionId, ActionIdGenerator, SavedAction};
use crate::diff::Change;
use crate::error::EngineError;
use crate::key::{Key, Schema};
use crate::store::{
    action_path, decode, encode, kollection_path, pointer_path, CollectionPath, DocPath,
    DocumentStore, Transaction,
};

pub use builder::{CommitBuilder, Membership};
pub use error::CommitError;
pub use tracked::{ReadSet, ReadTracker, TrackedReadable, Validator};

/// A single addressable document: a key in a named input collection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FacetId {
    pub collection: String,
    pub key: Key,
}

impl FacetId {
    pub fn new(collection: impl Into<String>, key: Key) -> Self {
        FacetId {
            collection: collection.into(),
            key,
        }
    }

    pub fn pointer_path(&self) -> DocPath {
        pointer_path(&self.collection, &self.key)
    }
}

impl fmt::Display for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.key)
    }
}

/// The action that last wrote a facet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pointer {
    pub action_id: ActionId,
}

/// Members of a derived membership set, kept sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kollection {
    pub members: Vec<FacetId>,
}

impl Kollection {
    fn join(&mut self, facet: &FacetId) {
        if let Err(pos) = self.members.binary_search(facet) {
            self.members.insert(pos, facet.clone());
        }
    }

    fn leave(&mut self, facet: &FacetId) {
        if let Ok(pos) = self.members.binary_search(facet) {
            self.members.remove(pos);
        }
    }
}

/// One facet write plus the membership changes it causes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacetWrite {
    pub facet: FacetId,
    pub schema: Schema,
    pub change: Change<Value>,
    pub joined_collections: BTreeSet<String>,
    pub left_collections: BTreeSet<String>,
}

/// A derived row written alongside the facets.
///
/// Derived rows have no pointer. `expected` is the row the write was
/// computed from (`None` for a new row); a stored row that differs means a
/// concurrent commit already moved it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportWrite {
    pub collection: CollectionPath,
    pub expected: Option<Value>,
    pub change: Change<Value>,
}

impl ExportWrite {
    pub fn path(&self) -> Result<DocPath, EngineError> {
        self.collection.doc_path(self.change.key())
    }
}

/// One optimistic transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    /// Pointer seen for every facet read; `None` if the facet had none.
    pub previous_doc_versions: BTreeMap<FacetId, Option<ActionId>>,
    /// Members seen for every kollection read; absent reads as empty.
    pub previous_collection_members: BTreeMap<String, Vec<FacetId>>,
    pub action: Value,
    pub writes: Vec<FacetWrite>,
    pub exports: Vec<ExportWrite>,
}

impl Commit {
    /// Every observed, non-absent action id: the saved action's parents.
    pub fn parents(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.previous_doc_versions.values().flatten().cloned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    Facet {
        facet: FacetId,
        expected: Option<ActionId>,
        actual: Option<ActionId>,
    },
    Kollection {
        id: String,
        expected: Vec<FacetId>,
        actual: Vec<FacetId>,
    },
    Export {
        path: DocPath,
        expected: Option<Value>,
        actual: Option<Value>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed { action_id: ActionId },
    Conflict { conflicts: Vec<Conflict> },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

fn check_shape(commit: &Commit) -> Result<(), CommitError> {
    for write in &commit.writes {
        if !commit.previous_doc_versions.contains_key(&write.facet) {
            return Err(CommitError::InvalidCommit(format!(
                "facet {} is written but was never read",
                write.facet
            )));
        }
        let touched = write.joined_collections.iter().chain(&write.left_collections);
        for id in touched {
            if !commit.previous_collection_members.contains_key(id) {
                return Err(CommitError::InvalidCommit(format!(
                    "kollection {} is updated but was never read",
                    id
                )));
            }
        }
    }
    Ok(())
}

fn read_pointer(
    tx: &mut dyn Transaction,
    facet: &FacetId,
) -> Result<Option<ActionId>, CommitError> {
    Ok(match tx.get(&facet.pointer_path())? {
        Some(doc) => Some(decode::<Pointer>(doc)?.action_id),
        None => None,
    })
}

fn read_kollection(tx: &mut dyn Transaction, id: &str) -> Result<Kollection, CommitError> {
    Ok(match tx.get(&kollection_path(id))? {
        Some(doc) => decode(doc)?,
        None => Kollection::default(),
    })
}

fn validate(tx: &mut dyn Transaction, commit: &Commit) -> Result<Vec<Conflict>, CommitError> {
    let mut conflicts = Vec::new();
    for (facet, expected) in &commit.previous_doc_versions {
        let actual = read_pointer(tx, facet)?;
        if &actual != expected {
            conflicts.push(Conflict::Facet {
                facet: facet.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }
    for (id, expected) in &commit.previous_collection_members {
        let actual = read_kollection(tx, id)?.members;
        if &actual != expected {
            conflicts.push(Conflict::Kollection {
                id: id.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }
    for export in &commit.exports {
        let path = export.path()?;
        let actual = tx.get(&path)?;
        if actual != export.expected {
            conflicts.push(Conflict::Export {
                path,
                expected: export.expected.clone(),
                actual,
            });
        }
    }
    Ok(conflicts)
}

fn apply_change(
    tx: &mut dyn Transaction,
    collection: &CollectionPath,
    change: &Change<Value>,
) -> Result<(), CommitError> {
    let path = collection.doc_path(change.key())?;
    match change {
        Change::Set { value, .. } => tx.set(path, value.clone())?,
        Change::Delete { .. } => tx.delete(path)?,
    }
    Ok(())
}

/// Validate and apply `commit` in one store transaction.
///
/// Returns [`CommitOutcome::Conflict`] with nothing written when any
/// observed pointer or kollection, or any rewritten derived row, has moved
/// on.
pub fn execute_commit<S: DocumentStore>(
    store: &S,
    ids: &ActionIdGenerator,
    commit: Commit,
) -> Result<CommitOutcome, CommitError> {
    check_shape(&commit)?;
    store.transaction(|tx| -> Result<CommitOutcome, CommitError> {
        let conflicts = validate(tx, &commit)?;
        if !conflicts.is_empty() {
            warn!(conflicts = conflicts.len(), "commit rejected: stale read set");
            return Ok(CommitOutcome::Conflict { conflicts });
        }

        let saved = SavedAction::new(commit.parents(), commit.action.clone());
        let action_id = ids.generate(&saved)?;
        tx.set(action_path(action_id.as_str()), encode(&saved)?)?;

        let pointer = encode(&Pointer {
            action_id: action_id.clone(),
        })?;
        let mut kollections: BTreeMap<&str, Kollection> = BTreeMap::new();
        for write in &commit.writes {
            let facets = CollectionPath::facets(&write.facet.collection, write.schema.clone());
            apply_change(tx, &facets, &write.change)?;
            tx.set(write.facet.pointer_path(), pointer.clone())?;

            for id in &write.joined_collections {
                if !kollections.contains_key(id.as_str()) {
                    kollections.insert(id, read_kollection(tx, id)?);
                }
                if let Some(k) = kollections.get_mut(id.as_str()) {
                    k.join(&write.facet);
                }
            }
            for id in &write.left_collections {
                if !kollections.contains_key(id.as_str()) {
                    kollections.insert(id, read_kollection(tx, id)?);
                }
                if let Some(k) = kollections.get_mut(id.as_str()) {
                    k.leave(&write.facet);
                }
            }
        }
        for (id, kollection) in &kollections {
            tx.set(kollection_path(id), encode(kollection)?)?;
        }
        for export in &commit.exports {
            apply_change(tx, &export.collection, &export.change)?;
        }

        debug!(
            %action_id,
            facets = commit.writes.len(),
            exports = commit.exports.len(),
            kollections = kollections.len(),
            "committed"
        );
        Ok(CommitOutcome::Committed { action_id })
    })
}
