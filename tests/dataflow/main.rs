//! Operator graph integration tests.
//!
//! Incremental propagation is checked against recomputing from scratch,
//! on fixed scenarios and on generated states and edits.

#[path = "../support/mod.rs"]
mod support;

mod differential;

use std::collections::BTreeMap;

use serde_json::{json, Value};
use sourced_views::op::{Inputs, MonoOp, TransposeOp};
use sourced_views::space::{materialize, ReadableSpace};
use sourced_views::{Diff, Item, Key, Schema, SortedItems};

use support::{games_by_player, player_game_count, players_per_game};

fn lobby() -> SortedItems<Value> {
    SortedItems::from_items(
        1,
        vec![
            Item::new(Key::from(["g1"]), json!({"players": ["p1", "p2"]})),
            Item::new(Key::from(["g2"]), json!({"players": ["p2"]})),
        ],
    )
    .unwrap()
}

#[test]
fn map_fans_out_one_item_per_player() {
    let space = ReadableSpace::new(lobby());
    let inputs: Inputs<Value> = BTreeMap::from([("game".to_string(), &space as _)]);
    let seats = players_per_game().materialize(&inputs, 2).unwrap();
    assert_eq!(
        seats.into_items(),
        vec![
            Item::new(Key::from(["g1", "p1"]), json!({})),
            Item::new(Key::from(["g1", "p2"]), json!({})),
            Item::new(Key::from(["g2", "p2"]), json!({})),
        ]
    );
}

#[test]
fn replace_yields_a_single_add() {
    let space = ReadableSpace::new(
        SortedItems::from_items(1, vec![Item::new(Key::from(["g1"]), json!({"players": ["p1"]}))])
            .unwrap(),
    );
    let inputs: Inputs<Value> = BTreeMap::from([("game".to_string(), &space as _)]);
    let diffs = BTreeMap::from([(
        "game".to_string(),
        vec![Diff::replace(
            Key::from(["g1"]),
            json!({"players": ["p1"]}),
            json!({"players": ["p1", "p2"]}),
        )],
    )]);
    let out = players_per_game().propagate(&inputs, &diffs).unwrap();
    assert_eq!(out, vec![Diff::add(Key::from(["g1", "p2"]), json!({}))]);
}

#[test]
fn transpose_swaps_and_restores() {
    let seats = SortedItems::from_items(
        2,
        vec![Item::new(Key::from(["g1", "p1"]), 1), Item::new(Key::from(["g2", "p1"]), 2)],
    )
    .unwrap();
    let forward = TransposeOp::new(vec![1, 0]).unwrap();
    let back = forward.inverse();

    let swapped = materialize(
        &MonoOp::<i32, i32>::apply(&forward, Box::new(ReadableSpace::new(&seats))),
        2,
    )
    .unwrap();
    assert_eq!(
        swapped.keys().cloned().collect::<Vec<_>>(),
        vec![Key::from(["p1", "g1"]), Key::from(["p1", "g2"])]
    );

    let restored = materialize(
        &MonoOp::<i32, i32>::apply(&back, Box::new(ReadableSpace::new(&swapped))),
        2,
    )
    .unwrap();
    assert_eq!(restored.into_items(), seats.into_items());
}

#[test]
fn export_schemas() {
    let inputs = BTreeMap::from([("game".to_string(), Schema::new(["game"]))]);
    assert_eq!(
        games_by_player().schema(&inputs).unwrap(),
        Schema::new(["player", "game"])
    );
    assert_eq!(player_game_count().schema(&inputs).unwrap(), Schema::new(["player"]));
}

#[test]
fn counts_follow_deletes() {
    let space = ReadableSpace::new(lobby());
    let inputs: Inputs<Value> = BTreeMap::from([("game".to_string(), &space as _)]);
    let diffs = BTreeMap::from([(
        "game".to_string(),
        vec![Diff::delete(Key::from(["g1"]), json!({"players": ["p1", "p2"]}))],
    )]);
    let out = player_game_count().propagate(&inputs, &diffs).unwrap();
    assert_eq!(
        out,
        vec![
            Diff::delete(Key::from(["p1"]), json!(1)),
            Diff::replace(Key::from(["p2"]), json!(2), json!(1)),
        ]
    );
}
