//! Tagged sorted-merge of an "old" and a "new" item stream.

use std::iter::Peekable;

use super::Diff;
use crate::error::EngineError;
use crate::space::Item;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Age {
    Old,
    New,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaggedItem<T> {
    pub age: Age,
    pub item: Item<T>,
}

/// Merges two ascending item streams and yields runs of equal keys.
///
/// Within a run, old items precede new items.
pub struct TaggedBatches<A: Iterator, B: Iterator> {
    old: Peekable<A>,
    new: Peekable<B>,
}

impl<T, A, B> TaggedBatches<A, B>
where
    A: Iterator<Item = Item<T>>,
    B: Iterator<Item = Item<T>>,
{
    pub fn new<IA, IB>(old: IA, new: IB) -> Self
    where
        IA: IntoIterator<Item = Item<T>, IntoIter = A>,
        IB: IntoIterator<Item = Item<T>, IntoIter = B>,
    {
        TaggedBatches {
            old: old.into_iter().peekable(),
            new: new.into_iter().peekable(),
        }
    }

    fn next_tagged(&mut self) -> Option<TaggedItem<T>> {
        let take_old = match (self.old.peek(), self.new.peek()) {
            (None, None) => return None,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(o), Some(n)) => o.key <= n.key,
        };
        if take_old {
            self.old.next().map(|item| TaggedItem {
                age: Age::Old,
                item,
            })
        } else {
            self.new.next().map(|item| TaggedItem {
                age: Age::New,
                item,
            })
        }
    }

    fn peek_key_equals(&mut self, key: &crate::key::Key) -> bool {
        self.old.peek().map_or(false, |i| &i.key == key)
            || self.new.peek().map_or(false, |i| &i.key == key)
    }
}

impl<T, A, B> Iterator for TaggedBatches<A, B>
where
    A: Iterator<Item = Item<T>>,
    B: Iterator<Item = Item<T>>,
{
    type Item = Vec<TaggedItem<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.next_tagged()?;
        let key = first.item.key.clone();
        let mut batch = vec![first];
        while self.peek_key_equals(&key) {
            match self.next_tagged() {
                Some(tagged) => batch.push(tagged),
                None => break,
            }
        }
        Some(batch)
    }
}

/// Turn one run of equal keys into at most one diff.
pub fn batch_to_diff<T: PartialEq>(
    mut batch: Vec<TaggedItem<T>>,
) -> Result<Option<Diff<T>>, EngineError> {
    match batch.len() {
        1 => {
            let Some(TaggedItem { age, item }) = batch.pop() else {
                return Ok(None);
            };
            Ok(Some(match age {
                Age::New => Diff::add(item.key, item.value),
                Age::Old => Diff::delete(item.key, item.value),
            }))
        }
        2 => {
            let (Some(new), Some(old)) = (batch.pop(), batch.pop()) else {
                return Ok(None);
            };
            if old.age != Age::Old || new.age != Age::New {
                return Err(EngineError::DuplicateKey {
                    key: new.item.key.into_segments(),
                });
            }
            if old.item.value == new.item.value {
                Ok(None)
            } else {
                Ok(Some(Diff::replace(
                    new.item.key,
                    old.item.value,
                    new.item.value,
                )))
            }
        }
        _ => Err(EngineError::DuplicateKey {
            key: batch
                .into_iter()
                .next()
                .map(|t| t.item.key.into_segments())
                .unwrap_or_default(),
        }),
    }
}

/// Diff two ascending item streams.
pub fn diff_sorted<T, IA, IB>(old: IA, new: IB) -> Result<Vec<Diff<T>>, EngineError>
where
    T: PartialEq,
    IA: IntoIterator<Item = Item<T>>,
    IB: IntoIterator<Item = Item<T>>,
{
    let mut diffs = Vec::new();
    for batch in TaggedBatches::new(old, new) {
        if let Some(diff) = batch_to_diff(batch)? {
            diffs.push(diff);
        }
    }
    Ok(diffs)
}
