//! Propagated diffs must equal the diff of two full recomputes.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use serde_json::{json, Value};
use sourced_views::diff::diff_sorted;
use sourced_views::op::Inputs;
use sourced_views::space::ReadableSpace;
use sourced_views::{Collection, Diff, Item, Key, Schema, SortedItems};

use crate::support::{games_by_player, player_game_count, players_per_game};

type Lobby = BTreeMap<String, BTreeSet<String>>;

fn players() -> impl Strategy<Value = BTreeSet<String>> {
    proptest::collection::btree_set("p[0-3]", 0..4)
}

fn lobby() -> impl Strategy<Value = Lobby> {
    proptest::collection::btree_map("g[0-4]", players(), 0..5)
}

/// `None` deletes the game, `Some` sets its players.
fn edits() -> impl Strategy<Value = BTreeMap<String, Option<BTreeSet<String>>>> {
    proptest::collection::btree_map("g[0-4]", proptest::option::of(players()), 0..5)
}

fn doc(players: &BTreeSet<String>) -> Value {
    json!({ "players": players.iter().collect::<Vec<_>>() })
}

fn items(lobby: &Lobby) -> SortedItems<Value> {
    SortedItems::from_items(
        1,
        lobby
            .iter()
            .map(|(id, players)| Item::new(Key::from([id.as_str()]), doc(players))),
    )
    .unwrap()
}

type Edits = BTreeMap<String, Option<BTreeSet<String>>>;

fn apply(lobby: &Lobby, edits: &Edits) -> (Lobby, Vec<Diff<Value>>) {
    let mut next = lobby.clone();
    let mut diffs = Vec::new();
    for (id, edit) in edits {
        let key = Key::from([id.as_str()]);
        match (lobby.get(id), edit) {
            (Some(old), None) => {
                next.remove(id);
                diffs.push(Diff::delete(key, doc(old)));
            }
            (None, Some(new)) => {
                next.insert(id.clone(), new.clone());
                diffs.push(Diff::add(key, doc(new)));
            }
            (Some(old), Some(new)) if old != new => {
                next.insert(id.clone(), new.clone());
                diffs.push(Diff::replace(key, doc(old), doc(new)));
            }
            _ => {}
        }
    }
    (next, diffs)
}

fn check(collection: &Collection<Value>, before: &Lobby, edits: &Edits) {
    let (after, diffs) = apply(before, edits);
    let schemas = BTreeMap::from([("game".to_string(), Schema::new(["game"]))]);
    let width = collection.schema(&schemas).unwrap().len();

    let old_space = ReadableSpace::new(items(before));
    let new_space = ReadableSpace::new(items(&after));
    let old_inputs: Inputs<Value> = BTreeMap::from([("game".to_string(), &old_space as _)]);
    let new_inputs: Inputs<Value> = BTreeMap::from([("game".to_string(), &new_space as _)]);

    let incremental = collection
        .propagate(&old_inputs, &BTreeMap::from([("game".to_string(), diffs)]))
        .unwrap();
    let recomputed = diff_sorted(
        collection.materialize(&old_inputs, width).unwrap().into_items(),
        collection.materialize(&new_inputs, width).unwrap().into_items(),
    )
    .unwrap();
    assert_eq!(incremental, recomputed);
}

proptest! {
    #[test]
    fn map_is_differentially_consistent(before in lobby(), edits in edits()) {
        check(&players_per_game(), &before, &edits);
    }

    #[test]
    fn transpose_is_differentially_consistent(before in lobby(), edits in edits()) {
        check(&games_by_player(), &before, &edits);
    }

    #[test]
    fn aggregate_is_differentially_consistent(before in lobby(), edits in edits()) {
        check(&player_game_count(), &before, &edits);
    }
}
