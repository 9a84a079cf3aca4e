//! Operator graphs over named input collections.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{propagate, AggregateOp, MapOp, MonoOp, SortOp, SpaceBox, TransposeOp};
use crate::diff::{Diff, Mapper};
use crate::error::EngineError;
use crate::key::{Key, Range, Schema};
use crate::space::{materialize, Item, ScrambledSpace, SortedItems};

/// Named input spaces a graph is evaluated against.
pub type Inputs<'a, T> = BTreeMap<String, &'a dyn ScrambledSpace<T>>;

/// One node of a [`Collection`] graph.
#[derive(Clone, Debug)]
pub enum OpKind<T> {
    Map(MapOp<T, T>),
    Transpose(TransposeOp),
    Aggregate(AggregateOp<T, T>),
    Sort(SortOp),
}

impl<T: Clone> MonoOp<T, T> for OpKind<T> {
    fn output_schema(&self, input: &Schema) -> Result<Schema, EngineError> {
        match self {
            OpKind::Map(op) => op.output_schema(input),
            OpKind::Transpose(op) => MonoOp::<T, T>::output_schema(op, input),
            OpKind::Aggregate(op) => op.output_schema(input),
            OpKind::Sort(op) => MonoOp::<T, T>::output_schema(op, input),
        }
    }

    fn apply<'a>(&'a self, input: SpaceBox<'a, T>) -> SpaceBox<'a, T>
    where
        T: 'a,
    {
        match self {
            OpKind::Map(op) => op.apply(input),
            OpKind::Transpose(op) => MonoOp::<T, T>::apply(op, input),
            OpKind::Aggregate(op) => op.apply(input),
            OpKind::Sort(op) => MonoOp::<T, T>::apply(op, input),
        }
    }

    fn impacted_output_range(&self, input_key: &Key) -> Result<Range, EngineError> {
        match self {
            OpKind::Map(op) => op.impacted_output_range(input_key),
            OpKind::Transpose(op) => MonoOp::<T, T>::impacted_output_range(op, input_key),
            OpKind::Aggregate(op) => op.impacted_output_range(input_key),
            OpKind::Sort(op) => MonoOp::<T, T>::impacted_output_range(op, input_key),
        }
    }
}

/// A derived collection: a chain of operators rooted at a loaded input.
#[derive(Clone, Debug)]
pub enum Collection<T> {
    Load(String),
    Op {
        op: OpKind<T>,
        input: Box<Collection<T>>,
    },
}

impl<T> Collection<T> {
    pub fn load(name: impl Into<String>) -> Self {
        Collection::Load(name.into())
    }

    fn then(self, op: OpKind<T>) -> Self {
        Collection::Op {
            op,
            input: Box::new(self),
        }
    }

    pub fn map(self, sub_schema: Schema, mapper: Mapper<T, T>) -> Self {
        self.then(OpKind::Map(MapOp::new(sub_schema, mapper)))
    }

    pub fn transpose(self, permutation: Vec<usize>) -> Result<Self, EngineError> {
        Ok(self.then(OpKind::Transpose(TransposeOp::new(permutation)?)))
    }

    pub fn aggregate<F>(self, dropped: usize, reducer: F) -> Self
    where
        F: Fn(&Key, &[Item<T>]) -> T + Send + Sync + 'static,
    {
        self.then(OpKind::Aggregate(AggregateOp::new(dropped, reducer)))
    }

    /// Sort into the persisted collection `name`. Sorts sharing a name
    /// must sort the same collection.
    pub fn sort(self, name: impl Into<String>) -> Self {
        self.then(OpKind::Sort(SortOp::new(name)))
    }

    /// Names of every input this collection reads.
    pub fn sources(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        let mut node = self;
        loop {
            match node {
                Collection::Load(name) => {
                    names.insert(name.as_str());
                    return names;
                }
                Collection::Op { input, .. } => node = input.as_ref(),
            }
        }
    }

    /// Every sort node of the chain with its name, outermost first.
    pub fn sorts(&self) -> Vec<(&str, &Collection<T>)> {
        let mut sorts = Vec::new();
        let mut node = self;
        while let Collection::Op { op, input } = node {
            if let OpKind::Sort(sort) = op {
                sorts.push((sort.name(), node));
            }
            node = input.as_ref();
        }
        sorts
    }
}

impl<T: Clone> Collection<T> {
    pub fn schema(&self, inputs: &BTreeMap<String, Schema>) -> Result<Schema, EngineError> {
        match self {
            Collection::Load(name) => inputs
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::UnknownCollection(name.clone())),
            Collection::Op { op, input } => op.output_schema(&input.schema(inputs)?),
        }
    }

    /// Full recompute over `inputs`, read lazily.
    pub fn evaluate<'a>(&'a self, inputs: &Inputs<'a, T>) -> Result<SpaceBox<'a, T>, EngineError>
    where
        T: 'a,
    {
        self.evaluate_over(inputs, &Inputs::new())
    }

    /// Like [`evaluate`](Self::evaluate), but a sort whose name is in
    /// `sorted` is read from there instead of being rebuilt.
    pub fn evaluate_over<'a>(
        &'a self,
        inputs: &Inputs<'a, T>,
        sorted: &Inputs<'a, T>,
    ) -> Result<SpaceBox<'a, T>, EngineError>
    where
        T: 'a,
    {
        match self {
            Collection::Load(name) => match inputs.get(name) {
                Some(space) => Ok(Box::new(*space)),
                None => Err(EngineError::UnknownCollection(name.clone())),
            },
            Collection::Op { op, input } => {
                if let OpKind::Sort(sort) = op {
                    if let Some(space) = sorted.get(sort.name()) {
                        return Ok(Box::new(*space));
                    }
                }
                Ok(op.apply(input.evaluate_over(inputs, sorted)?))
            }
        }
    }

    /// Evaluate and read every item.
    pub fn materialize<'a>(
        &'a self,
        inputs: &Inputs<'a, T>,
        width: usize,
    ) -> Result<SortedItems<T>, EngineError>
    where
        T: 'a,
    {
        materialize(&self.evaluate(inputs)?, width)
    }
}

impl<T: Clone + PartialEq> Collection<T> {
    /// Output diffs for a batch of input diffs, keyed by input name.
    ///
    /// `inputs` must hold the state before the batch.
    pub fn propagate<'a>(
        &'a self,
        inputs: &Inputs<'a, T>,
        diffs: &BTreeMap<String, Vec<Diff<T>>>,
    ) -> Result<Vec<Diff<T>>, EngineError>
    where
        T: 'a,
    {
        self.propagate_over(inputs, &Inputs::new(), diffs, &mut BTreeMap::new())
    }

    /// Like [`propagate`](Self::propagate), reading sorts found in `sorted`
    /// from there. The diffs of every sort on the way are added to
    /// `sort_diffs` under its name.
    pub fn propagate_over<'a>(
        &'a self,
        inputs: &Inputs<'a, T>,
        sorted: &Inputs<'a, T>,
        diffs: &BTreeMap<String, Vec<Diff<T>>>,
        sort_diffs: &mut BTreeMap<String, Vec<Diff<T>>>,
    ) -> Result<Vec<Diff<T>>, EngineError>
    where
        T: 'a,
    {
        match self {
            Collection::Load(name) => normalized(diffs.get(name).cloned().unwrap_or_default()),
            Collection::Op { op, input } => {
                let input_diffs = input.propagate_over(inputs, sorted, diffs, sort_diffs)?;
                if input_diffs.is_empty() {
                    return Ok(input_diffs);
                }
                // Sorting keeps content, so its diffs are its input's diffs.
                if let OpKind::Sort(sort) = op {
                    sort_diffs
                        .entry(sort.name().to_string())
                        .or_insert_with(|| input_diffs.clone());
                    return Ok(input_diffs);
                }
                let space = input.evaluate_over(inputs, sorted)?;
                propagate(op, &*space, &input_diffs)
            }
        }
    }
}

/// Diffs of one batch, per output and per sort feeding the outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Propagation<T> {
    pub outputs: BTreeMap<String, Vec<Diff<T>>>,
    pub sorted: BTreeMap<String, Vec<Diff<T>>>,
}

impl<T> Default for Propagation<T> {
    fn default() -> Self {
        Propagation {
            outputs: BTreeMap::new(),
            sorted: BTreeMap::new(),
        }
    }
}

/// Sort a caller-supplied batch by key, rejecting repeated keys.
fn normalized<T>(mut diffs: Vec<Diff<T>>) -> Result<Vec<Diff<T>>, EngineError> {
    diffs.sort_by(|a, b| a.key().cmp(b.key()));
    if let Some(pair) = diffs.windows(2).find(|pair| pair[0].key() == pair[1].key()) {
        return Err(EngineError::DuplicateKey {
            key: pair[0].key().segments().to_vec(),
        });
    }
    Ok(diffs)
}

/// A set of named output collections maintained together.
#[derive(Clone, Debug)]
pub struct DirectoryOp<T> {
    outputs: BTreeMap<String, Collection<T>>,
}

impl<T> Default for DirectoryOp<T> {
    fn default() -> Self {
        DirectoryOp {
            outputs: BTreeMap::new(),
        }
    }
}

impl<T> DirectoryOp<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(mut self, name: impl Into<String>, collection: Collection<T>) -> Self {
        self.outputs.insert(name.into(), collection);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Collection<T>> {
        self.outputs.get(name)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Collection<T>)> {
        self.outputs.iter().map(|(name, c)| (name.as_str(), c))
    }

    /// Every input read by any output.
    pub fn sources(&self) -> BTreeSet<&str> {
        self.outputs.values().flat_map(Collection::sources).collect()
    }

    /// Every named sort of any output. The first node found for a name
    /// stands for all of them.
    pub fn sorts(&self) -> BTreeMap<&str, &Collection<T>> {
        let mut sorts = BTreeMap::new();
        for collection in self.outputs.values() {
            for (name, node) in collection.sorts() {
                sorts.entry(name).or_insert(node);
            }
        }
        sorts
    }
}

impl<T: Clone> DirectoryOp<T> {
    /// Full recompute of every output.
    pub fn evaluate_all<'a>(
        &'a self,
        inputs: &Inputs<'a, T>,
    ) -> Result<BTreeMap<String, SpaceBox<'a, T>>, EngineError>
    where
        T: 'a,
    {
        self.outputs
            .iter()
            .map(|(name, c)| Ok((name.clone(), c.evaluate(inputs)?)))
            .collect()
    }

    pub fn schemas(
        &self,
        inputs: &BTreeMap<String, Schema>,
    ) -> Result<BTreeMap<String, Schema>, EngineError> {
        self.outputs
            .iter()
            .map(|(name, c)| Ok((name.clone(), c.schema(inputs)?)))
            .collect()
    }
}

impl<T: Clone + PartialEq> DirectoryOp<T> {
    /// Diffs for every output a batch touches. Untouched outputs are absent.
    pub fn propagate_all<'a>(
        &'a self,
        inputs: &Inputs<'a, T>,
        diffs: &BTreeMap<String, Vec<Diff<T>>>,
    ) -> Result<BTreeMap<String, Vec<Diff<T>>>, EngineError>
    where
        T: 'a,
    {
        Ok(self.propagate_over(inputs, &Inputs::new(), diffs)?.outputs)
    }

    /// Diffs for every output and every sort a batch touches, reading
    /// persisted sorts from `sorted`.
    pub fn propagate_over<'a>(
        &'a self,
        inputs: &Inputs<'a, T>,
        sorted: &Inputs<'a, T>,
        diffs: &BTreeMap<String, Vec<Diff<T>>>,
    ) -> Result<Propagation<T>, EngineError>
    where
        T: 'a,
    {
        let mut out = Propagation::default();
        for (name, collection) in &self.outputs {
            let output_diffs = collection.propagate_over(inputs, sorted, diffs, &mut out.sorted)?;
            if !output_diffs.is_empty() {
                debug!(output = %name, diffs = output_diffs.len(), "propagated");
                out.outputs.insert(name.clone(), output_diffs);
            }
        }
        Ok(out)
    }
}
