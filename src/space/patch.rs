//! Overlay a batch of changes onto an ordered source.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::iter::Peekable;

use super::{Item, ItemIter, Readable, ScrambledSpace, Slice, SliceItems, SliceIter};
use crate::diff::{diff_to_change, Change, Diff};
use crate::error::EngineError;
use crate::key::{Key, Range};

type Overlay<T> = BTreeMap<Key, Option<T>>;

fn overlay_from<T, I>(changes: I) -> Overlay<T>
where
    I: IntoIterator<Item = Change<T>>,
{
    changes
        .into_iter()
        .map(|change| match change {
            Change::Set { key, value } => (key, Some(value)),
            Change::Delete { key } => (key, None),
        })
        .collect()
}

fn overlay_in<T: Clone>(overlay: &Overlay<T>, range: &Range) -> Vec<(Key, Option<T>)> {
    overlay
        .range(range.start().clone()..)
        .take_while(|(key, _)| !range.is_past(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Sorted merge of a base stream with sorted overrides.
///
/// `Some(value)` replaces or inserts, `None` removes. Errors from the base
/// stream pass through untouched.
pub struct PatchIter<'a, T> {
    base: Peekable<SliceItems<'a, T>>,
    changes: Peekable<std::vec::IntoIter<(Key, Option<T>)>>,
}

impl<'a, T> PatchIter<'a, T> {
    pub fn new(base: SliceItems<'a, T>, changes: Vec<(Key, Option<T>)>) -> Self {
        PatchIter {
            base: base.peekable(),
            changes: changes.into_iter().peekable(),
        }
    }
}

impl<'a, T> Iterator for PatchIter<'a, T> {
    type Item = Result<Item<T>, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let order = match (self.base.peek(), self.changes.peek()) {
                (None, None) => return None,
                (Some(Err(_)), _) => return self.base.next(),
                (Some(Ok(_)), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(Ok(item)), Some((key, _))) => item.key.cmp(key),
            };
            if order == Ordering::Less {
                return self.base.next();
            }
            if order == Ordering::Equal {
                self.base.next();
            }
            if let Some((key, Some(value))) = self.changes.next() {
                return Some(Ok(Item::new(key, value)));
            }
        }
    }
}

/// A [`Readable`] with changes laid over it.
pub struct PatchedReadable<R, T> {
    inner: R,
    overlay: Overlay<T>,
}

impl<R, T> PatchedReadable<R, T> {
    pub fn new<I>(inner: R, changes: I) -> Self
    where
        I: IntoIterator<Item = Change<T>>,
    {
        PatchedReadable {
            inner,
            overlay: overlay_from(changes),
        }
    }
}

impl<T: Clone, R: Readable<T>> Readable<T> for PatchedReadable<R, T> {
    fn seek_to<'a>(&'a self, start: &Key) -> ItemIter<'a, T>
    where
        T: 'a,
    {
        let changes = self
            .overlay
            .range(start.clone()..)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let base: SliceItems<'a, T> = Box::new(self.inner.seek_to(start).map(Ok));
        // The base never fails, so neither does the merge.
        Box::new(PatchIter::new(base, changes).filter_map(Result::ok))
    }
}

/// A [`ScrambledSpace`] with changes laid over each slice.
///
/// Inserted keys that fall outside every slice of the inner space come back
/// as single-value slices after the inner slices run out.
pub struct PatchedSpace<S, T> {
    inner: S,
    overlay: Overlay<T>,
}

impl<S, T> PatchedSpace<S, T> {
    pub fn new<I>(inner: S, changes: I) -> Self
    where
        I: IntoIterator<Item = Change<T>>,
    {
        PatchedSpace {
            inner,
            overlay: overlay_from(changes),
        }
    }

    /// Patch with the write side of each diff.
    pub fn from_diffs(inner: S, diffs: &[Diff<T>]) -> Self
    where
        T: Clone,
    {
        Self::new(inner, diffs.iter().cloned().map(diff_to_change))
    }
}

impl<T: Clone, S: ScrambledSpace<T>> ScrambledSpace<T> for PatchedSpace<S, T> {
    fn seek_to<'a>(&'a self, start: &Key) -> SliceIter<'a, T>
    where
        T: 'a,
    {
        Box::new(PatchedSlices {
            inner: self.inner.seek_to(start),
            overlay: &self.overlay,
            start: start.clone(),
            covered: Vec::new(),
            leftovers: None,
        })
    }
}

struct PatchedSlices<'a, T> {
    inner: SliceIter<'a, T>,
    overlay: &'a Overlay<T>,
    start: Key,
    covered: Vec<Range>,
    leftovers: Option<std::vec::IntoIter<(Key, T)>>,
}

impl<'a, T: Clone + 'a> Iterator for PatchedSlices<'a, T> {
    type Item = Result<Slice<'a, T>, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.leftovers.is_none() {
            match self.inner.next() {
                Some(Ok(slice)) => {
                    let changes = overlay_in(self.overlay, &slice.range);
                    self.covered.push(slice.range.clone());
                    let iter: SliceItems<'a, T> = Box::new(PatchIter::new(slice.iter, changes));
                    return Some(Ok(Slice::new(slice.range, iter)));
                }
                Some(Err(err)) => return Some(Err(err)),
                None => {
                    let covered = &self.covered;
                    let uncovered: Vec<(Key, T)> = self
                        .overlay
                        .range(self.start.clone()..)
                        .filter(|(key, _)| !covered.iter().any(|r| r.contains_unchecked(key)))
                        .filter_map(|(key, value)| value.clone().map(|v| (key.clone(), v)))
                        .collect();
                    self.leftovers = Some(uncovered.into_iter());
                }
            }
        }
        let (key, value) = self.leftovers.as_mut()?.next()?;
        Some(Slice::single(Item::new(key, value)))
    }
}
