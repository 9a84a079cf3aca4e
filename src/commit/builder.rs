use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{
    check_shape, execute_commit, Commit, CommitError, CommitOutcome, ExportWrite, FacetId,
    FacetWrite, ReadSet,
};
use crate::action::ActionIdGenerator;
use crate::diff::{diff_to_change, Diff};
use crate::key::Schema;
use crate::store::{CollectionPath, DocumentStore};

/// Kollections a facet value belongs to.
pub type Membership = Arc<dyn Fn(&FacetId, &Value) -> BTreeSet<String> + Send + Sync>;

/// Builder for chaining facet diffs and export diffs into a single
/// optimistic commit.
///
/// ```ignore
/// CommitBuilder::new(json!({"type": "join"}))
///     .membership(membership)
///     .diff("game", &schema, &diff)
///     .export(counts, &count_diff)
///     .read_set(tracker.read_set()?)
///     .commit(&store, &ids)?;
/// ```
pub struct CommitBuilder {
    action: Value,
    read_set: ReadSet,
    membership: Option<Membership>,
    writes: Vec<FacetWrite>,
    exports: Vec<ExportWrite>,
}

impl fmt::Debug for CommitBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitBuilder")
            .field("action", &self.action)
            .field("writes", &self.writes.len())
            .field("exports", &self.exports.len())
            .finish_non_exhaustive()
    }
}

impl CommitBuilder {
    pub fn new(action: Value) -> Self {
        Self {
            action,
            read_set: ReadSet::default(),
            membership: None,
            writes: vec![],
            exports: vec![],
        }
    }

    /// Versions the commit was derived from.
    pub fn read_set(mut self, read_set: ReadSet) -> Self {
        self.read_set = read_set;
        self
    }

    /// Membership function used to turn facet diffs into kollection
    /// joins and leaves. Set it before adding diffs.
    pub fn membership(mut self, membership: Membership) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Add a write to the facet at `diff.key()` in `collection`.
    pub fn diff(mut self, collection: &str, schema: &Schema, diff: &Diff<Value>) -> Self {
        let facet = FacetId::new(collection, diff.key().clone());
        let (before, after) = match &self.membership {
            Some(membership) => (
                diff.old_value()
                    .map(|v| membership(&facet, v))
                    .unwrap_or_default(),
                diff.new_value()
                    .map(|v| membership(&facet, v))
                    .unwrap_or_default(),
            ),
            None => (BTreeSet::new(), BTreeSet::new()),
        };
        self.writes.push(FacetWrite {
            joined_collections: after.difference(&before).cloned().collect(),
            left_collections: before.difference(&after).cloned().collect(),
            change: diff_to_change(diff.clone()),
            schema: schema.clone(),
            facet,
        });
        self
    }

    /// Add a derived row change. The diff's old value is what the stored
    /// row must still hold at commit time.
    pub fn export(mut self, collection: CollectionPath, diff: &Diff<Value>) -> Self {
        self.exports.push(ExportWrite {
            collection,
            expected: diff.old_value().cloned(),
            change: diff_to_change(diff.clone()),
        });
        self
    }

    pub fn writes(&self) -> &[FacetWrite] {
        &self.writes
    }

    /// Written facets whose pointer is not in the read set yet.
    pub fn unobserved_facets(&self) -> Vec<FacetId> {
        let mut facets: Vec<FacetId> = self
            .writes
            .iter()
            .map(|w| &w.facet)
            .filter(|f| !self.read_set.facets.contains_key(*f))
            .cloned()
            .collect();
        facets.sort();
        facets.dedup();
        facets
    }

    /// Kollections changed by a membership delta but not in the read set yet.
    pub fn touched_kollections(&self) -> BTreeSet<String> {
        self.writes
            .iter()
            .flat_map(|w| w.joined_collections.iter().chain(&w.left_collections))
            .filter(|id| !self.read_set.kollections.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn build(self) -> Result<Commit, CommitError> {
        let mut seen = BTreeSet::new();
        for write in &self.writes {
            if !seen.insert(&write.facet) {
                return Err(CommitError::InvalidCommit(format!(
                    "facet {} is written twice",
                    write.facet
                )));
            }
        }
        let commit = Commit {
            previous_doc_versions: self.read_set.facets,
            previous_collection_members: self.read_set.kollections,
            action: self.action,
            writes: self.writes,
            exports: self.exports,
        };
        check_shape(&commit)?;
        Ok(commit)
    }

    /// Build and execute in one step.
    pub fn commit<S: DocumentStore>(
        self,
        store: &S,
        ids: &ActionIdGenerator,
    ) -> Result<CommitOutcome, CommitError> {
        execute_commit(store, ids, self.build()?)
    }
}
