use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::trace;

use super::MonoOp;
use crate::diff::{diff_sorted, Diff};
use crate::error::EngineError;
use crate::key::{Key, Range};
use crate::space::{read_range_from_single_slice, PatchedSpace, ScrambledSpace};

/// Output diffs of `op` for a batch of input diffs.
///
/// `input` is the collection before the batch. Every impacted output range is
/// read twice, once over `input` and once over `input` patched with
/// `diffs`, and the two reads are merged into diffs. The result is sorted by
/// key. Two ranges reporting different diffs for one output key is an
/// operator bug and fails with [`EngineError::DuplicateKey`].
pub fn propagate<I, O, Op>(
    op: &Op,
    input: &dyn ScrambledSpace<I>,
    diffs: &[Diff<I>],
) -> Result<Vec<Diff<O>>, EngineError>
where
    I: Clone,
    O: PartialEq,
    Op: MonoOp<I, O> + ?Sized,
{
    if diffs.is_empty() {
        return Ok(Vec::new());
    }

    let mut ranges = diffs
        .iter()
        .map(|diff| op.impacted_output_range(diff.key()))
        .collect::<Result<Vec<Range>, _>>()?;
    ranges.sort();
    ranges.dedup();

    let patched = PatchedSpace::from_diffs(input, diffs);
    let old_space = op.apply(Box::new(input));
    let new_space = op.apply(Box::new(&patched));

    let mut out: BTreeMap<Key, Diff<O>> = BTreeMap::new();
    for range in &ranges {
        let old = read_range_from_single_slice(&old_space, range)?;
        let new = read_range_from_single_slice(&new_space, range)?;
        trace!(%range, old = old.len(), new = new.len(), "recomputed impacted range");
        for diff in diff_sorted(old, new)? {
            match out.entry(diff.key().clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(diff);
                }
                Entry::Occupied(slot) => {
                    if slot.get() != &diff {
                        return Err(EngineError::DuplicateKey {
                            key: diff.key().clone().into_segments(),
                        });
                    }
                }
            }
        }
    }
    Ok(out.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Mapper;
    use crate::key::Schema;
    use crate::op::MapOp;
    use crate::space::{Item, ReadableSpace, SortedItems};

    fn doubled() -> MapOp<i32, i32> {
        MapOp::new(
            Schema::new(["copy"]),
            Mapper::new(|_key, v: &i32| vec![(vec!["x".to_string()], v * 2)]),
        )
    }

    fn input() -> ReadableSpace<SortedItems<i32>> {
        ReadableSpace::new(
            SortedItems::from_items(1, vec![Item::new(Key::from(["a"]), 1)]).unwrap(),
        )
    }

    #[test]
    fn empty_batch_is_empty() {
        let out: Vec<Diff<i32>> = propagate(&doubled(), &input(), &[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn unchanged_output_produces_nothing() {
        let op: MapOp<i32, i32> = MapOp::new(
            Schema::new(["copy"]),
            Mapper::new(|_key, _v: &i32| vec![(vec!["x".to_string()], 0)]),
        );
        let diffs = vec![Diff::replace(Key::from(["a"]), 1, 2)];
        assert!(propagate(&op, &input(), &diffs).unwrap().is_empty());
    }

    #[test]
    fn output_is_sorted_by_key() {
        let diffs = vec![
            Diff::add(Key::from(["c"]), 3),
            Diff::add(Key::from(["b"]), 2),
            Diff::delete(Key::from(["a"]), 1),
        ];
        let out = propagate(&doubled(), &input(), &diffs).unwrap();
        let keys: Vec<String> = out.iter().map(|d| d.key().to_string()).collect();
        assert_eq!(keys, vec!["a/x", "b/x", "c/x"]);
        assert_eq!(out[0], Diff::delete(Key::from(["a", "x"]), 2));
    }
}
