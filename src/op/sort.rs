use std::cell::OnceCell;

use super::{MonoOp, SpaceBox};
use crate::error::EngineError;
use crate::key::{single_value, Key, Range, Schema};
use crate::space::{
    materialize, Readable, ScrambledSpace, Slice, SliceItems, SliceIter, SortedItems,
};

/// Materializes its input into one sorted run.
///
/// Content is unchanged, so the output is a valid input to operators that
/// need aligned slices (for example [`AggregateOp`](super::AggregateOp)
/// after a transpose).
///
/// Applied directly, the sort is rebuilt in memory on first read. The
/// engine persists every sort under its name and reads that copy instead
/// when propagating (see [`Collection::evaluate_over`](super::Collection::evaluate_over)).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortOp {
    name: String,
}

impl SortOp {
    pub fn new(name: impl Into<String>) -> Self {
        SortOp { name: name.into() }
    }

    /// Name of the persisted sorted collection.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Clone> MonoOp<T, T> for SortOp {
    fn output_schema(&self, input: &Schema) -> Result<Schema, EngineError> {
        Ok(input.clone())
    }

    fn apply<'a>(&'a self, input: SpaceBox<'a, T>) -> SpaceBox<'a, T>
    where
        T: 'a,
    {
        Box::new(SortedSpace {
            input,
            sorted: OnceCell::new(),
        })
    }

    fn impacted_output_range(&self, input_key: &Key) -> Result<Range, EngineError> {
        single_value(input_key)
    }
}

struct SortedSpace<'a, T> {
    input: SpaceBox<'a, T>,
    sorted: OnceCell<Result<SortedItems<T>, EngineError>>,
}

impl<'a, T: Clone> ScrambledSpace<T> for SortedSpace<'a, T> {
    fn seek_to<'b>(&'b self, start: &Key) -> SliceIter<'b, T>
    where
        T: 'b,
    {
        let sorted = self
            .sorted
            .get_or_init(|| materialize(&self.input, start.len()));
        match sorted {
            Ok(sorted) => {
                let items: SliceItems<'b, T> = Box::new(sorted.seek_to(start).map(Ok));
                Box::new(std::iter::once(Ok(Slice::new(
                    Range::unbounded(start.clone()),
                    items,
                ))))
            }
            Err(err) => Box::new(std::iter::once(Err(err.clone()))),
        }
    }
}
