//! A small game lobby used across the integration tests.
//!
//! Input `game` (schema `[game]`) holds `{"players": [..], "status": ..}`.
//! Exports:
//! - `gamesByPlayer` (`[player, game]`): one row per seat.
//! - `playerGameCount` (`[player]`): number of games per player.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};
use sourced_views::{
    Collection, Diff, Engine, FacetId, InMemoryDocumentStore, InputDiffs, IntegrateError, Key,
    ManualClock, Mapper, Membership, Schema,
};

pub fn players_per_game() -> Collection<Value> {
    Collection::load("game").map(
        Schema::new(["player"]),
        Mapper::new(|_key, game: &Value| {
            game["players"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(|p| (vec![p.to_string()], json!({})))
                .collect()
        }),
    )
}

pub fn games_by_player() -> Collection<Value> {
    players_per_game()
        .transpose(vec![1, 0])
        .expect("valid permutation")
        .sort("seats")
}

pub fn player_game_count() -> Collection<Value> {
    games_by_player().aggregate(1, |_player, games| json!(games.len()))
}

pub fn open_games() -> Membership {
    Arc::new(|_: &FacetId, game: &Value| {
        if game["status"] == "open" {
            BTreeSet::from(["open".to_string()])
        } else {
            BTreeSet::new()
        }
    })
}

pub fn engine() -> Engine<InMemoryDocumentStore> {
    engine_on(InMemoryDocumentStore::new())
}

pub fn engine_on(store: InMemoryDocumentStore) -> Engine<InMemoryDocumentStore> {
    Engine::new(store)
        .with_clock(Arc::new(ManualClock::new(1_700_000_000_000)))
        .input("game", Schema::new(["game"]))
        .export("gamesByPlayer", games_by_player())
        .export("playerGameCount", player_game_count())
        .membership(open_games())
}

pub fn game(players: &[&str]) -> Value {
    json!({ "players": players, "status": "open" })
}

/// Seat `player` in `game`, creating the game if needed.
pub fn join(
    engine: &Engine<InMemoryDocumentStore>,
    game_id: &str,
    player: &str,
) -> Result<sourced_views::ActionId, IntegrateError> {
    let key = Key::from([game_id]);
    engine.integrate(json!({ "type": "join", "game": game_id, "player": player }), |ctx| {
        let diff = match ctx.get("game", &key)? {
            Some(old) => {
                let mut new = old.clone();
                new["players"]
                    .as_array_mut()
                    .ok_or_else(|| IntegrateError::integrator("game without players"))?
                    .push(json!(player));
                Diff::replace(key.clone(), old, new)
            }
            None => Diff::add(key.clone(), game(&[player])),
        };
        Ok(InputDiffs::from([("game".to_string(), vec![diff])]))
    })
}

/// Close `game`, dropping it from the `open` kollection.
pub fn close(
    engine: &Engine<InMemoryDocumentStore>,
    game_id: &str,
) -> Result<sourced_views::ActionId, IntegrateError> {
    let key = Key::from([game_id]);
    engine.integrate(json!({ "type": "close", "game": game_id }), |ctx| {
        let old = ctx
            .get("game", &key)?
            .ok_or_else(|| IntegrateError::integrator("no such game"))?;
        let mut new = old.clone();
        new["status"] = json!("closed");
        Ok(InputDiffs::from([(
            "game".to_string(),
            vec![Diff::replace(key.clone(), old, new)],
        )]))
    })
}
