use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::{DocPath, DocumentStore, StoreError, Transaction};

type Documents = BTreeMap<DocPath, Value>;

/// Documents in a shared `BTreeMap`.
///
/// A transaction holds the write lock until it finishes, so transactions
/// are serialized against each other and against snapshot reads.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<Documents>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> Result<usize, StoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(documents.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Copy of every document, for inspection.
    pub fn dump(&self) -> Result<Vec<(DocPath, Value)>, StoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(documents
            .iter()
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect())
    }
}

fn lower_bound(prefix: &DocPath, start: Bound<DocPath>) -> Bound<DocPath> {
    match start {
        Bound::Unbounded => Bound::Excluded(prefix.clone()),
        Bound::Included(path) if path <= *prefix => Bound::Excluded(prefix.clone()),
        Bound::Excluded(path) if path < *prefix => Bound::Excluded(prefix.clone()),
        bound => bound,
    }
}

fn under<'m, V>(
    map: &'m BTreeMap<DocPath, V>,
    prefix: &'m DocPath,
    start: Bound<DocPath>,
) -> impl Iterator<Item = (&'m DocPath, &'m V)> + 'm {
    map.range((lower_bound(prefix, start), Bound::Unbounded))
        .take_while(move |(path, _)| path.is_under(prefix))
}

fn scan_documents(
    documents: &Documents,
    prefix: &DocPath,
    start: Bound<DocPath>,
    limit: usize,
) -> Vec<(DocPath, Value)> {
    under(documents, prefix, start)
        .take(limit)
        .map(|(path, value)| (path.clone(), value.clone()))
        .collect()
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(documents.get(path).cloned())
    }

    fn scan(
        &self,
        prefix: &DocPath,
        start: Bound<DocPath>,
        limit: usize,
    ) -> Result<Vec<(DocPath, Value)>, StoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::LockPoisoned("scan"))?;
        Ok(scan_documents(&documents, prefix, start, limit))
    }

    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| StoreError::LockPoisoned("transaction"))?;
        let mut tx = InMemoryTransaction {
            base: &*documents,
            pending: BTreeMap::new(),
        };
        let result = f(&mut tx)?;
        let pending = tx.pending;
        for (path, value) in pending {
            match value {
                Some(value) => {
                    documents.insert(path, value);
                }
                None => {
                    documents.remove(&path);
                }
            }
        }
        Ok(result)
    }
}

struct InMemoryTransaction<'a> {
    base: &'a Documents,
    pending: BTreeMap<DocPath, Option<Value>>,
}

impl Transaction for InMemoryTransaction<'_> {
    fn get(&mut self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        Ok(match self.pending.get(path) {
            Some(value) => value.clone(),
            None => self.base.get(path).cloned(),
        })
    }

    fn set(&mut self, path: DocPath, value: Value) -> Result<(), StoreError> {
        self.pending.insert(path, Some(value));
        Ok(())
    }

    fn delete(&mut self, path: DocPath) -> Result<(), StoreError> {
        self.pending.insert(path, None);
        Ok(())
    }

    fn scan(
        &mut self,
        prefix: &DocPath,
        start: Bound<DocPath>,
        limit: usize,
    ) -> Result<Vec<(DocPath, Value)>, StoreError> {
        if self.pending.is_empty() {
            return Ok(scan_documents(self.base, prefix, start, limit));
        }
        let mut base = under(self.base, prefix, start.clone()).peekable();
        let mut pending = under(&self.pending, prefix, start).peekable();
        let mut out = Vec::new();
        while out.len() < limit {
            let order = match (base.peek(), pending.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((b, _)), Some((p, _))) => b.cmp(p),
            };
            if order == Ordering::Less {
                if let Some((path, value)) = base.next() {
                    out.push((path.clone(), value.clone()));
                }
                continue;
            }
            if order == Ordering::Equal {
                base.next();
            }
            if let Some((path, Some(value))) = pending.next() {
                out.push((path.clone(), value.clone()));
            }
        }
        Ok(out)
    }
}
