//! Pull-based ordered sources.
//!
//! A [`Readable`] hands back one ascending stream of items from a seek key.
//! A [`ScrambledSpace`] hands back a stream of [`Slice`]s: each slice is
//! sorted and only holds items inside its range, but slices may come back in
//! any order. Operator outputs are scrambled spaces; they are read either a
//! range at a time through [`read_range_from_single_slice`] or completely
//! through [`materialize`].

mod patch;
mod sorted;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::key::{Key, Range};

pub use patch::{PatchIter, PatchedReadable, PatchedSpace};
pub use sorted::{ReadableSpace, SortedItems};

/// A keyed value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item<T> {
    pub key: Key,
    pub value: T,
}

impl<T> Item<T> {
    pub fn new(key: Key, value: T) -> Self {
        Item { key, value }
    }
}

pub type ItemIter<'a, T> = Box<dyn Iterator<Item = Item<T>> + 'a>;

/// Items of one slice. Operators evaluate lazily, so an item may be an error.
pub type SliceItems<'a, T> = Box<dyn Iterator<Item = Result<Item<T>, EngineError>> + 'a>;

pub type SliceIter<'a, T> = Box<dyn Iterator<Item = Result<Slice<'a, T>, EngineError>> + 'a>;

/// An ordered, restartable, finite source.
pub trait Readable<T> {
    /// Every item with key `>= start`, ascending.
    fn seek_to<'a>(&'a self, start: &Key) -> ItemIter<'a, T>
    where
        T: 'a;
}

/// A sorted run of items, all inside `range`.
pub struct Slice<'a, T> {
    pub range: Range,
    pub iter: SliceItems<'a, T>,
}

impl<'a, T> Slice<'a, T> {
    pub fn new(range: Range, iter: SliceItems<'a, T>) -> Self {
        Slice { range, iter }
    }

    /// A slice holding exactly one item.
    pub fn single(item: Item<T>) -> Result<Self, EngineError>
    where
        T: 'a,
    {
        let range = crate::key::single_value(&item.key)?;
        Ok(Slice {
            range,
            iter: Box::new(std::iter::once(Ok(item))),
        })
    }

    pub fn empty(range: Range) -> Self
    where
        T: 'a,
    {
        Slice {
            range,
            iter: Box::new(std::iter::empty()),
        }
    }
}

/// An ordered-but-partitioned view of a collection.
pub trait ScrambledSpace<T> {
    /// Slices covering every key `>= start`. The first slice contains `start`.
    fn seek_to<'a>(&'a self, start: &Key) -> SliceIter<'a, T>
    where
        T: 'a;
}

impl<T, R: Readable<T> + ?Sized> Readable<T> for &R {
    fn seek_to<'a>(&'a self, start: &Key) -> ItemIter<'a, T>
    where
        T: 'a,
    {
        (**self).seek_to(start)
    }
}

impl<T, S: ScrambledSpace<T> + ?Sized> ScrambledSpace<T> for &S {
    fn seek_to<'a>(&'a self, start: &Key) -> SliceIter<'a, T>
    where
        T: 'a,
    {
        (**self).seek_to(start)
    }
}

impl<T, S: ScrambledSpace<T> + ?Sized> ScrambledSpace<T> for Box<S> {
    fn seek_to<'a>(&'a self, start: &Key) -> SliceIter<'a, T>
    where
        T: 'a,
    {
        (**self).seek_to(start)
    }
}

/// Read `range` from the first slice returned for its start.
///
/// Fails with [`EngineError::SliceSpansRange`] if that slice does not fully
/// contain `range`; that is an operator bug, not a recoverable condition.
pub fn read_range_from_single_slice<T, S>(
    space: &S,
    range: &Range,
) -> Result<Vec<Item<T>>, EngineError>
where
    S: ScrambledSpace<T> + ?Sized,
{
    let mut slices = space.seek_to(range.start());
    let slice = match slices.next() {
        Some(slice) => slice?,
        None => return Ok(Vec::new()),
    };
    if !range.within(&slice.range)? {
        return Err(EngineError::SliceSpansRange {
            requested: range.to_string(),
            slice: slice.range.to_string(),
        });
    }
    let mut items = Vec::new();
    for item in slice.iter {
        let item = item?;
        if &item.key < range.start() {
            continue;
        }
        if range.is_past(&item.key) {
            break;
        }
        items.push(item);
    }
    Ok(items)
}

/// Read an entire space into sorted storage.
pub fn materialize<T, S>(space: &S, width: usize) -> Result<SortedItems<T>, EngineError>
where
    S: ScrambledSpace<T> + ?Sized,
{
    let mut out = SortedItems::new(width);
    for slice in space.seek_to(&Key::origin(width)) {
        let slice = slice?;
        for item in slice.iter {
            let item = item?;
            if !slice.range.contains_unchecked(&item.key) {
                continue;
            }
            out.insert_new(item)?;
        }
    }
    Ok(out)
}
