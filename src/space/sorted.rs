use std::collections::BTreeMap;

use super::{Item, ItemIter, Readable, ScrambledSpace, Slice, SliceItems, SliceIter};
use crate::diff::Change;
use crate::error::EngineError;
use crate::key::{check_width, Key, Range};

/// In-memory sorted collection of a fixed key width.
#[derive(Clone, Debug, PartialEq)]
pub struct SortedItems<T> {
    width: usize,
    items: BTreeMap<Key, T>,
}

impl<T> SortedItems<T> {
    pub fn new(width: usize) -> Self {
        SortedItems {
            width,
            items: BTreeMap::new(),
        }
    }

    /// Build from items. Duplicate keys and width mismatches are errors.
    pub fn from_items<I>(width: usize, items: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = Item<T>>,
    {
        let mut out = SortedItems::new(width);
        for item in items {
            out.insert_new(item)?;
        }
        Ok(out)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&T> {
        self.items.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.items.keys()
    }

    /// Insert an item whose key must not be present yet.
    pub fn insert_new(&mut self, item: Item<T>) -> Result<(), EngineError> {
        check_width(self.width, &item.key)?;
        if self.items.contains_key(&item.key) {
            return Err(EngineError::DuplicateKey {
                key: item.key.into_segments(),
            });
        }
        self.items.insert(item.key, item.value);
        Ok(())
    }

    /// Apply a write, replacing or removing whatever was there.
    pub fn apply(&mut self, change: Change<T>) -> Result<(), EngineError> {
        check_width(self.width, change.key())?;
        match change {
            Change::Set { key, value } => {
                self.items.insert(key, value);
            }
            Change::Delete { key } => {
                self.items.remove(&key);
            }
        }
        Ok(())
    }

    pub fn into_items(self) -> Vec<Item<T>> {
        self.items
            .into_iter()
            .map(|(key, value)| Item::new(key, value))
            .collect()
    }
}

impl<T: Clone> SortedItems<T> {
    pub fn items(&self) -> Vec<Item<T>> {
        self.items
            .iter()
            .map(|(key, value)| Item::new(key.clone(), value.clone()))
            .collect()
    }
}

impl<T: Clone> Readable<T> for SortedItems<T> {
    fn seek_to<'a>(&'a self, start: &Key) -> ItemIter<'a, T>
    where
        T: 'a,
    {
        Box::new(
            self.items
                .range(start.clone()..)
                .map(|(key, value)| Item::new(key.clone(), value.clone())),
        )
    }
}

/// Presents a [`Readable`] as a space with one unbounded slice per seek.
pub struct ReadableSpace<R> {
    inner: R,
}

impl<R> ReadableSpace<R> {
    pub fn new(inner: R) -> Self {
        ReadableSpace { inner }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<T, R: Readable<T>> ScrambledSpace<T> for ReadableSpace<R> {
    fn seek_to<'a>(&'a self, start: &Key) -> SliceIter<'a, T>
    where
        T: 'a,
    {
        let items: SliceItems<'a, T> = Box::new(self.inner.seek_to(start).map(Ok));
        let slice = Slice::new(Range::unbounded(start.clone()), items);
        Box::new(std::iter::once(Ok(slice)))
    }
}
