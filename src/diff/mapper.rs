use std::fmt;
use std::sync::Arc;

use super::{diff_sorted, Diff};
use crate::error::EngineError;
use crate::key::Key;
use crate::space::Item;

type MapFn<I, O> = dyn Fn(&Key, &I) -> Vec<(Vec<String>, O)> + Send + Sync;

/// A fan-out function from one keyed value to zero or more keyed values.
///
/// Each produced item is keyed by the input key extended with the returned
/// suffix. Two produced items must never share a suffix; a mapper that
/// breaks this is a bug and is reported as [`EngineError::NonInjectiveMapper`].
pub struct Mapper<I, O> {
    f: Arc<MapFn<I, O>>,
}

impl<I, O> Clone for Mapper<I, O> {
    fn clone(&self) -> Self {
        Mapper { f: self.f.clone() }
    }
}

impl<I, O> fmt::Debug for Mapper<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mapper")
    }
}

impl<I, O> Mapper<I, O> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Key, &I) -> Vec<(Vec<String>, O)> + Send + Sync + 'static,
    {
        Mapper { f: Arc::new(f) }
    }

    /// Apply the mapper, returning output items in ascending key order.
    pub fn produce(&self, key: &Key, value: &I) -> Result<Vec<Item<O>>, EngineError> {
        let mut items: Vec<Item<O>> = (self.f)(key, value)
            .into_iter()
            .map(|(suffix, value)| Item::new(key.concat(&suffix), value))
            .collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some(pair) = items.windows(2).find(|pair| pair[0].key == pair[1].key) {
            return Err(EngineError::NonInjectiveMapper {
                key: pair[0].key.segments().to_vec(),
            });
        }
        if let Some(item) = items.iter().find(|item| !item.key.is_real()) {
            return Err(EngineError::EmptySegment {
                key: item.key.segments().to_vec(),
            });
        }
        Ok(items)
    }
}

/// Push one input diff through a mapper.
pub fn map_diff<I, O: PartialEq>(
    diff: &Diff<I>,
    mapper: &Mapper<I, O>,
) -> Result<Vec<Diff<O>>, EngineError> {
    match diff {
        Diff::Add { key, value } => Ok(mapper
            .produce(key, value)?
            .into_iter()
            .map(|item| Diff::add(item.key, item.value))
            .collect()),
        Diff::Delete { key, value } => Ok(mapper
            .produce(key, value)?
            .into_iter()
            .map(|item| Diff::delete(item.key, item.value))
            .collect()),
        Diff::Replace {
            key,
            old_value,
            new_value,
        } => {
            let old = mapper.produce(key, old_value)?;
            let new = mapper.produce(key, new_value)?;
            diff_sorted(old, new)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn players() -> Mapper<Value, Value> {
        Mapper::new(|_key, game: &Value| {
            game["players"]
                .as_array()
                .map(|players| {
                    players
                        .iter()
                        .filter_map(|p| p.as_str())
                        .map(|p| (vec![p.to_string()], json!({})))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    #[test]
    fn add_fans_out() {
        let diff = Diff::add(Key::from(["g1"]), json!({"players": ["p2", "p1"]}));
        let out = map_diff(&diff, &players()).unwrap();
        assert_eq!(
            out,
            vec![
                Diff::add(Key::from(["g1", "p1"]), json!({})),
                Diff::add(Key::from(["g1", "p2"]), json!({})),
            ]
        );
    }

    #[test]
    fn replace_emits_only_changes() {
        let diff = Diff::replace(
            Key::from(["g1"]),
            json!({"players": ["p1"]}),
            json!({"players": ["p1", "p2"]}),
        );
        let out = map_diff(&diff, &players()).unwrap();
        assert_eq!(out, vec![Diff::add(Key::from(["g1", "p2"]), json!({}))]);
    }

    #[test]
    fn delete_fans_out() {
        let diff = Diff::delete(Key::from(["g1"]), json!({"players": ["p1"]}));
        let out = map_diff(&diff, &players()).unwrap();
        assert_eq!(out, vec![Diff::delete(Key::from(["g1", "p1"]), json!({}))]);
    }

    #[test]
    fn colliding_suffixes_are_fatal() {
        let diff = Diff::add(Key::from(["g1"]), json!({"players": ["p1", "p1"]}));
        let err = map_diff(&diff, &players()).unwrap_err();
        assert!(matches!(err, EngineError::NonInjectiveMapper { .. }));
    }

    #[test]
    fn empty_suffix_segment_is_fatal() {
        let diff = Diff::add(Key::from(["g1"]), json!({"players": [""]}));
        assert!(matches!(
            map_diff(&diff, &players()),
            Err(EngineError::EmptySegment { .. })
        ));
    }
}
