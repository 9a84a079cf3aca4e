use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::{FacetId, Kollection, Pointer};
use crate::action::ActionId;
use crate::key::{Key, Schema};
use crate::space::{Item, ItemIter, Readable};
use crate::store::{decode, kollection_path, CollectionPath, DocPath, DocumentStore, StoreError};

/// Checks a stored document before it is handed to an integrator.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Versions observed during one integration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadSet {
    pub facets: BTreeMap<FacetId, Option<ActionId>>,
    pub kollections: BTreeMap<String, Vec<FacetId>>,
}

impl ReadSet {
    /// Keeps the first version seen. A later, different version means the
    /// facet moved mid-integration, and validation will catch it.
    pub fn record_facet(&mut self, facet: FacetId, version: Option<ActionId>) {
        self.facets.entry(facet).or_insert(version);
    }

    pub fn record_kollection(&mut self, id: String, members: Vec<FacetId>) {
        self.kollections.entry(id).or_insert(members);
    }
}

/// Shared recorder for every read made through [`TrackedReadable`]s.
///
/// [`Readable`] streams cannot fail, so a store error hit mid-stream ends
/// the stream and is kept here; [`read_set`](Self::read_set) reports it.
#[derive(Debug, Default)]
pub struct ReadTracker {
    read_set: Mutex<ReadSet>,
    error: Mutex<Option<StoreError>>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&self, err: StoreError) {
        if let Ok(mut slot) = self.error.lock() {
            slot.get_or_insert(err);
        }
    }

    fn record_facet(&self, facet: FacetId, version: Option<ActionId>) -> Result<(), StoreError> {
        self.read_set
            .lock()
            .map_err(|_| StoreError::LockPoisoned("read set"))?
            .record_facet(facet, version);
        Ok(())
    }

    /// The first error hit by any tracked stream, if any.
    pub fn take_error(&self) -> Result<Option<StoreError>, StoreError> {
        Ok(self
            .error
            .lock()
            .map_err(|_| StoreError::LockPoisoned("read tracker"))?
            .take())
    }

    /// Everything observed so far, or the first stream error.
    pub fn read_set(&self) -> Result<ReadSet, StoreError> {
        if let Some(err) = self.take_error()? {
            return Err(err);
        }
        Ok(self
            .read_set
            .lock()
            .map_err(|_| StoreError::LockPoisoned("read set"))?
            .clone())
    }

    /// Read and record a facet's pointer.
    pub fn observe_facet<S: DocumentStore>(
        &self,
        store: &S,
        facet: &FacetId,
    ) -> Result<Option<ActionId>, StoreError> {
        let version = match store.get(&facet.pointer_path())? {
            Some(doc) => Some(decode::<Pointer>(doc)?.action_id),
            None => None,
        };
        self.record_facet(facet.clone(), version.clone())?;
        Ok(version)
    }

    /// Read and record a kollection's members.
    pub fn observe_kollection<S: DocumentStore>(
        &self,
        store: &S,
        id: &str,
    ) -> Result<Vec<FacetId>, StoreError> {
        let members = match store.get(&kollection_path(id))? {
            Some(doc) => decode::<Kollection>(doc)?.members,
            None => Vec::new(),
        };
        self.read_set
            .lock()
            .map_err(|_| StoreError::LockPoisoned("read set"))?
            .record_kollection(id.to_string(), members.clone());
        Ok(members)
    }
}

/// A stored collection read through the store, page by page.
///
/// Over an input collection, the pointer of every facet handed out is
/// recorded. Derived collections have no pointers; their reads are checked
/// at commit through the expected values of the rows written.
pub struct TrackedReadable<'a, S> {
    store: &'a S,
    tracker: &'a ReadTracker,
    /// Input collection name; `None` for a derived collection.
    collection: Option<String>,
    path: CollectionPath,
    page_size: usize,
    validator: Option<Validator>,
}

impl<'a, S: DocumentStore> TrackedReadable<'a, S> {
    pub fn new(
        store: &'a S,
        tracker: &'a ReadTracker,
        collection: impl Into<String>,
        schema: Schema,
        page_size: usize,
    ) -> Self {
        let collection = collection.into();
        TrackedReadable {
            store,
            tracker,
            path: CollectionPath::facets(&collection, schema),
            collection: Some(collection),
            page_size: page_size.max(1),
            validator: None,
        }
    }

    /// Reads of a derived collection stored at `path`. Store errors still
    /// go to `tracker`.
    pub fn derived(
        store: &'a S,
        tracker: &'a ReadTracker,
        path: CollectionPath,
        page_size: usize,
    ) -> Self {
        TrackedReadable {
            store,
            tracker,
            collection: None,
            path,
            page_size: page_size.max(1),
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn collection_path(&self) -> &CollectionPath {
        &self.path
    }

    fn check(&self, path: &DocPath, value: &Value) -> Result<(), StoreError> {
        match &self.validator {
            Some(validator) => validator(value).map_err(|reason| StoreError::Invalid {
                path: path.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Record the pointer, then re-read the document. Reading in this order
    /// means a write landing in between shows up as a conflict at commit.
    fn observe(&self, key: Key, path: &DocPath) -> Result<Option<Item<Value>>, StoreError> {
        if let Some(collection) = &self.collection {
            self.tracker
                .observe_facet(self.store, &FacetId::new(collection.as_str(), key.clone()))?;
        }
        match self.store.get(path)? {
            Some(value) => {
                self.check(path, &value)?;
                Ok(Some(Item::new(key, value)))
            }
            None => Ok(None),
        }
    }

    /// Point read. Absence is recorded too, so a concurrent insert conflicts.
    pub fn get(&self, key: &Key) -> Result<Option<Value>, StoreError> {
        let path = self.path.doc_path(key)?;
        Ok(self.observe(key.clone(), &path)?.map(|item| item.value))
    }
}

impl<'a, S: DocumentStore> Readable<Value> for TrackedReadable<'a, S> {
    fn seek_to<'b>(&'b self, start: &Key) -> ItemIter<'b, Value>
    where
        Value: 'b,
    {
        let next = match self.path.doc_path(start) {
            Ok(path) => Some(Bound::Included(path)),
            Err(err) => {
                self.tracker.fail(err.into());
                None
            }
        };
        Box::new(Pages {
            readable: self,
            next,
            buffer: Vec::new().into_iter(),
        })
    }
}

struct Pages<'b, 'a, S> {
    readable: &'b TrackedReadable<'a, S>,
    next: Option<Bound<DocPath>>,
    buffer: std::vec::IntoIter<(DocPath, Value)>,
}

impl<'b, 'a, S: DocumentStore> Iterator for Pages<'b, 'a, S> {
    type Item = Item<Value>;

    fn next(&mut self) -> Option<Item<Value>> {
        let readable = self.readable;
        loop {
            if let Some((path, value)) = self.buffer.next() {
                let Some(key) = readable.path.key_of(&path) else {
                    continue;
                };
                if readable.collection.is_none() {
                    return Some(Item::new(key, value));
                }
                match readable.observe(key, &path) {
                    Ok(Some(item)) => return Some(item),
                    Ok(None) => continue,
                    Err(err) => {
                        readable.tracker.fail(err);
                        self.next = None;
                        return None;
                    }
                }
            }
            let start = self.next.take()?;
            match readable
                .store
                .scan(&readable.path.root, start, readable.page_size)
            {
                Ok(page) => {
                    if page.len() == readable.page_size {
                        self.next = page.last().map(|(last, _)| Bound::Excluded(last.clone()));
                    }
                    if page.is_empty() {
                        return None;
                    }
                    self.buffer = page.into_iter();
                }
                Err(err) => {
                    readable.tracker.fail(err);
                    return None;
                }
            }
        }
    }
}
