use std::fmt;
use std::iter::Peekable;
use std::sync::Arc;

use super::{MonoOp, SpaceBox};
use crate::error::EngineError;
use crate::key::{single_value, Key, Range, Schema};
use crate::space::{Item, ScrambledSpace, Slice, SliceItems, SliceIter};

/// Folds one group into a single output value.
///
/// Called with the group prefix and the group's items, keyed by the dropped
/// suffix only, in ascending order. Never called for an empty group.
pub type Reducer<I, O> = Arc<dyn Fn(&Key, &[Item<I>]) -> O + Send + Sync>;

/// Drops the last `dropped` schema levels, reducing each group of items that
/// share the remaining prefix to one output item.
pub struct AggregateOp<I, O> {
    dropped: usize,
    reducer: Reducer<I, O>,
}

impl<I, O> Clone for AggregateOp<I, O> {
    fn clone(&self) -> Self {
        AggregateOp {
            dropped: self.dropped,
            reducer: Arc::clone(&self.reducer),
        }
    }
}

impl<I, O> fmt::Debug for AggregateOp<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateOp")
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

impl<I, O> AggregateOp<I, O> {
    pub fn new<F>(dropped: usize, reducer: F) -> Self
    where
        F: Fn(&Key, &[Item<I>]) -> O + Send + Sync + 'static,
    {
        AggregateOp {
            dropped,
            reducer: Arc::new(reducer),
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// A slice is aligned when both bounds end in `dropped` sentinel
    /// segments, so no group straddles its edge.
    fn check_aligned(&self, range: &Range) -> Result<(), EngineError> {
        let aligned = |key: &Key| {
            key.len() >= self.dropped
                && key.segments()[key.len() - self.dropped..]
                    .iter()
                    .all(String::is_empty)
        };
        if aligned(range.start()) && range.end().map_or(true, aligned) {
            Ok(())
        } else {
            Err(EngineError::MisalignedSlice {
                range: range.to_string(),
                dropped: self.dropped,
            })
        }
    }
}

impl<I, O> MonoOp<I, O> for AggregateOp<I, O> {
    fn output_schema(&self, input: &Schema) -> Result<Schema, EngineError> {
        if self.dropped == 0 {
            return Err(EngineError::SchemaMismatch {
                expected: input.len() + 1,
                actual: input.len(),
            });
        }
        input.truncated(self.dropped)
    }

    fn apply<'a>(&'a self, input: SpaceBox<'a, I>) -> SpaceBox<'a, O>
    where
        I: 'a,
        O: 'a,
    {
        Box::new(AggregateSpace { op: self, input })
    }

    fn impacted_output_range(&self, input_key: &Key) -> Result<Range, EngineError> {
        single_value(&input_key.truncated(self.dropped)?)
    }
}

struct AggregateSpace<'a, I, O> {
    op: &'a AggregateOp<I, O>,
    input: SpaceBox<'a, I>,
}

impl<'a, I, O> ScrambledSpace<O> for AggregateSpace<'a, I, O> {
    fn seek_to<'b>(&'b self, start: &Key) -> SliceIter<'b, O>
    where
        O: 'b,
    {
        let op = self.op;
        Box::new(
            self.input
                .seek_to(&start.padded(op.dropped))
                .map(move |slice| {
                    let slice = slice?;
                    op.check_aligned(&slice.range)?;
                    let range = slice.range.map_bounds(|bound| bound.truncated(op.dropped))?;
                    let groups: SliceItems<'b, O> = Box::new(Groups {
                        items: slice.iter.peekable(),
                        op,
                    });
                    Ok(Slice::new(range, groups))
                }),
        )
    }
}

/// Runs of items sharing a prefix, reduced as they are read.
struct Groups<'b, I, O> {
    items: Peekable<SliceItems<'b, I>>,
    op: &'b AggregateOp<I, O>,
}

impl<'b, I, O> Groups<'b, I, O> {
    fn split(&self, key: &Key) -> Result<(Key, Key), EngineError> {
        match key.len().checked_sub(self.op.dropped) {
            Some(at) => key.split(at),
            None => Err(EngineError::SchemaMismatch {
                expected: self.op.dropped,
                actual: key.len(),
            }),
        }
    }
}

impl<'b, I, O> Iterator for Groups<'b, I, O> {
    type Item = Result<Item<O>, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.items.next()? {
            Ok(item) => item,
            Err(err) => return Some(Err(err)),
        };
        let (prefix, suffix) = match self.split(&first.key) {
            Ok(parts) => parts,
            Err(err) => return Some(Err(err)),
        };
        let mut group = vec![Item::new(suffix, first.value)];
        while let Some(Ok(next)) = self.items.peek() {
            if !next.key.segments().starts_with(prefix.segments()) {
                break;
            }
            let next = match self.items.next() {
                Some(Ok(item)) => item,
                _ => break,
            };
            match self.split(&next.key) {
                Ok((_, suffix)) => group.push(Item::new(suffix, next.value)),
                Err(err) => return Some(Err(err)),
            }
        }
        let value = (self.op.reducer)(&prefix, &group);
        Some(Ok(Item::new(prefix, value)))
    }
}
