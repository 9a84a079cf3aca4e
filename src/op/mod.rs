//! Dataflow operators.
//!
//! Every operator is a pure transform from one scrambled space to another
//! plus a change-impact function. The impact function must over-approximate:
//! a change at input key `k` may only alter output keys inside
//! `impacted_output_range(k)`. [`propagate`] relies on that to recompute
//! only the affected output ranges.
//!
//! ```ignore
//! let by_player = Collection::load("games")
//!     .map(Schema::new(["player"]), players_of_game)
//!     .transpose(vec![1, 0])?
//!     .sort("seats")
//!     .aggregate(1, count_games);
//! ```

mod aggregate;
mod graph;
mod map;
mod propagate;
mod sort;
mod transpose;

use crate::error::EngineError;
use crate::key::{Key, Range, Schema};
use crate::space::ScrambledSpace;

pub use aggregate::{AggregateOp, Reducer};
pub use graph::{Collection, DirectoryOp, Inputs, OpKind, Propagation};
pub use map::MapOp;
pub use propagate::propagate;
pub use sort::SortOp;
pub use transpose::TransposeOp;

pub type SpaceBox<'a, T> = Box<dyn ScrambledSpace<T> + 'a>;

/// A single-input, single-output operator.
pub trait MonoOp<I, O> {
    fn output_schema(&self, input: &Schema) -> Result<Schema, EngineError>;

    /// Full recompute, evaluated lazily as the output space is read.
    fn apply<'a>(&'a self, input: SpaceBox<'a, I>) -> SpaceBox<'a, O>
    where
        I: 'a,
        O: 'a;

    /// Output keys that a change at `input_key` may touch.
    fn impacted_output_range(&self, input_key: &Key) -> Result<Range, EngineError>;
}
