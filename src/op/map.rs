use std::fmt;

use super::{MonoOp, SpaceBox};
use crate::diff::Mapper;
use crate::error::EngineError;
use crate::key::{key_successor, Key, Range, Schema};
use crate::space::{Item, ScrambledSpace, Slice, SliceItems, SliceIter};

/// Extends the schema by `sub_schema`, fanning each input item out to zero
/// or more output items keyed by input key + produced suffix.
pub struct MapOp<I, O> {
    sub_schema: Schema,
    mapper: Mapper<I, O>,
}

impl<I, O> Clone for MapOp<I, O> {
    fn clone(&self) -> Self {
        MapOp {
            sub_schema: self.sub_schema.clone(),
            mapper: self.mapper.clone(),
        }
    }
}

impl<I, O> fmt::Debug for MapOp<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapOp")
            .field("sub_schema", &self.sub_schema)
            .finish_non_exhaustive()
    }
}

impl<I, O> MapOp<I, O> {
    pub fn new(sub_schema: Schema, mapper: Mapper<I, O>) -> Self {
        MapOp { sub_schema, mapper }
    }

    pub fn sub_schema(&self) -> &Schema {
        &self.sub_schema
    }

    pub fn mapper(&self) -> &Mapper<I, O> {
        &self.mapper
    }

    fn produce(&self, item: &Item<I>) -> Result<Vec<Item<O>>, EngineError> {
        let produced = self.mapper.produce(&item.key, &item.value)?;
        let width = item.key.len() + self.sub_schema.len();
        if let Some(bad) = produced.iter().find(|out| out.key.len() != width) {
            return Err(EngineError::SchemaMismatch {
                expected: width,
                actual: bad.key.len(),
            });
        }
        Ok(produced)
    }
}

impl<I, O> MonoOp<I, O> for MapOp<I, O> {
    fn output_schema(&self, input: &Schema) -> Result<Schema, EngineError> {
        Ok(input.extended(&self.sub_schema))
    }

    fn apply<'a>(&'a self, input: SpaceBox<'a, I>) -> SpaceBox<'a, O>
    where
        I: 'a,
        O: 'a,
    {
        Box::new(MapSpace { op: self, input })
    }

    fn impacted_output_range(&self, input_key: &Key) -> Result<Range, EngineError> {
        let pad = self.sub_schema.len();
        Ok(Range::bounded(
            input_key.padded(pad),
            key_successor(input_key)?.padded(pad),
        ))
    }
}

struct MapSpace<'a, I, O> {
    op: &'a MapOp<I, O>,
    input: SpaceBox<'a, I>,
}

impl<'a, I, O> ScrambledSpace<O> for MapSpace<'a, I, O> {
    fn seek_to<'b>(&'b self, start: &Key) -> SliceIter<'b, O>
    where
        O: 'b,
    {
        let pad = self.op.sub_schema.len();
        let input_start = match start.truncated(pad) {
            Ok(key) => key,
            Err(err) => return Box::new(std::iter::once(Err(err))),
        };
        let op = self.op;
        Box::new(self.input.seek_to(&input_start).map(move |slice| {
            let slice = slice?;
            let range = slice.range.map_bounds(|bound| Ok(bound.padded(pad)))?;
            let items: SliceItems<'b, O> = Box::new(slice.iter.flat_map(move |item| {
                let produced = item.and_then(|item| op.produce(&item));
                match produced {
                    Ok(items) => items.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(err) => vec![Err(err)],
                }
            }));
            Ok(Slice::new(range, items))
        }))
    }
}
