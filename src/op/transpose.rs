use std::iter;

use super::{MonoOp, SpaceBox};
use crate::error::EngineError;
use crate::key::{single_value, Key, Range, Schema};
use crate::space::{read_range_from_single_slice, Item, ScrambledSpace, Slice, SliceIter};

/// Reorders key segments: output segment `i` is input segment `permutation[i]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransposeOp {
    permutation: Vec<usize>,
    inverse: Vec<usize>,
}

impl TransposeOp {
    /// Fails unless `permutation` holds every index in `0..len` exactly once.
    pub fn new(permutation: Vec<usize>) -> Result<Self, EngineError> {
        let mut inverse = vec![usize::MAX; permutation.len()];
        for (out_pos, &in_pos) in permutation.iter().enumerate() {
            match inverse.get_mut(in_pos) {
                Some(slot) if *slot == usize::MAX => *slot = out_pos,
                _ => return Err(EngineError::InvalidPermutation(permutation)),
            }
        }
        Ok(TransposeOp {
            permutation,
            inverse,
        })
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// The transpose that undoes this one.
    pub fn inverse(&self) -> TransposeOp {
        TransposeOp {
            permutation: self.inverse.clone(),
            inverse: self.permutation.clone(),
        }
    }
}

impl<T: Clone> MonoOp<T, T> for TransposeOp {
    fn output_schema(&self, input: &Schema) -> Result<Schema, EngineError> {
        input.permuted(&self.permutation)
    }

    fn apply<'a>(&'a self, input: SpaceBox<'a, T>) -> SpaceBox<'a, T>
    where
        T: 'a,
    {
        Box::new(TransposeSpace { op: self, input })
    }

    fn impacted_output_range(&self, input_key: &Key) -> Result<Range, EngineError> {
        single_value(&input_key.permuted(&self.permutation)?)
    }
}

struct TransposeSpace<'a, T> {
    op: &'a TransposeOp,
    input: SpaceBox<'a, T>,
}

impl<'a, T> TransposeSpace<'a, T> {
    /// The slice `[start, succ(start))`, filled by a point lookup.
    fn point_slice<'b>(&'b self, start: &Key) -> Result<Slice<'b, T>, EngineError>
    where
        T: 'b,
    {
        let range = single_value(start)?;
        let input_range = single_value(&start.permuted(&self.op.inverse)?)?;
        let permutation = &self.op.permutation;
        let items = read_range_from_single_slice(&self.input, &input_range)?
            .into_iter()
            .map(|item| -> Result<Item<T>, EngineError> {
                Ok(Item::new(item.key.permuted(permutation)?, item.value))
            })
            .collect::<Vec<_>>();
        Ok(Slice::new(range, Box::new(items.into_iter())))
    }
}

impl<'a, T> ScrambledSpace<T> for TransposeSpace<'a, T> {
    /// A point slice for `start`, then every later output key as its own
    /// single-value slice, in input order.
    fn seek_to<'b>(&'b self, start: &Key) -> SliceIter<'b, T>
    where
        T: 'b,
    {
        let first = self.point_slice(start);
        if first.is_err() {
            return Box::new(iter::once(first));
        }
        let permutation = &self.op.permutation;
        let start = start.clone();
        let rest = self
            .input
            .seek_to(&Key::origin(permutation.len()))
            .flat_map(move |slice| -> SliceIter<'b, T> {
                let slice = match slice {
                    Ok(slice) => slice,
                    Err(err) => return Box::new(iter::once(Err(err))),
                };
                let range = slice.range;
                let start = start.clone();
                Box::new(slice.iter.filter_map(move |item| {
                    let item = match item {
                        Ok(item) => item,
                        Err(err) => return Some(Err(err)),
                    };
                    if !range.contains_unchecked(&item.key) {
                        return None;
                    }
                    match item.key.permuted(permutation) {
                        Ok(key) if key > start => Some(Slice::single(Item::new(key, item.value))),
                        Ok(_) => None,
                        Err(err) => Some(Err(err)),
                    }
                }))
            });
        Box::new(iter::once(first).chain(rest))
    }
}
